//! Field reading: frame region → preprocessed bitmap → text → structured value.

pub mod engine;
pub mod extract;
pub mod preprocess;
pub mod region;
pub mod shape;

pub use engine::{PageMode, RecognizeOptions, Recognizer, RecognizerConfig, TesseractRecognizer};
pub use extract::{interpret, parse_exp, parse_level, ExpFields};
pub use preprocess::{BracketTextParams, DigitTileParams, Preprocessor};
pub use region::{FieldRegion, RegionRect, RelativeRect};

use anyhow::Result;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::progress::Reading;
use engine::{EXP_WHITELIST, LEVEL_WHITELIST};
use shape::{classify_digit_one, Verdict};

/// Where the two fields sit in a frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldRegions {
    /// Level number tile
    pub level: FieldRegion,
    /// Bracketed experience string, e.g. `12,345[67.89%]`
    pub exp: FieldRegion,
}

impl Default for FieldRegions {
    fn default() -> Self {
        Self {
            level: FieldRegion::Relative(RelativeRect {
                x: 0.02,
                y: 0.02,
                width: 0.04,
                height: 0.05,
            }),
            exp: FieldRegion::Relative(RelativeRect {
                x: 0.07,
                y: 0.03,
                width: 0.20,
                height: 0.03,
            }),
        }
    }
}

/// Reads the level number.
///
/// Single-line recognition first, single-word as a retry. When both come
/// back empty the shape classifier may still recognize a lone "1"; any
/// other verdict leaves the level unknown.
pub fn read_level(
    preprocessor: &mut Preprocessor,
    recognizer: &mut dyn Recognizer,
    frame: &RgbaImage,
    region: &RegionRect,
) -> Result<Option<u32>> {
    let Some(bitmap) = preprocessor.digit_tile(frame, region) else {
        log::debug!("level region outside frame");
        return Ok(None);
    };

    for mode in [PageMode::SingleLine, PageMode::SingleWord] {
        let text = recognizer.recognize(
            &bitmap,
            RecognizeOptions {
                mode,
                whitelist: Some(LEVEL_WHITELIST),
            },
        )?;
        if let Some(level) = parse_level(&text) {
            return Ok(Some(level));
        }
        log::debug!("level read {:?} with {:?} gave nothing", text.trim(), mode);
    }

    match classify_digit_one(&bitmap) {
        Verdict::Yes => {
            log::debug!("level recovered as 1 from glyph shape");
            Ok(Some(1))
        }
        Verdict::No | Verdict::Unknown => Ok(None),
    }
}

/// Reads the experience field. Either part may come back missing.
pub fn read_exp(
    preprocessor: &mut Preprocessor,
    recognizer: &mut dyn Recognizer,
    frame: &RgbaImage,
    region: &RegionRect,
) -> Result<ExpFields> {
    let Some(bitmap) = preprocessor.bracket_text(frame, region) else {
        log::debug!("exp region outside frame");
        return Ok(ExpFields::default());
    };

    let text = recognizer.recognize(
        &bitmap,
        RecognizeOptions {
            mode: PageMode::SingleLine,
            whitelist: Some(EXP_WHITELIST),
        },
    )?;
    let fields = parse_exp(&text);
    if fields.exp_value.is_none() || fields.exp_percent.is_none() {
        log::debug!("exp read {:?} incomplete: {:?}", text.trim(), fields);
    }
    Ok(fields)
}

/// Reads both fields from one frame.
///
/// Regions that fall outside the frame read as missing; only recognizer
/// failures are errors.
pub fn read_frame(
    preprocessor: &mut Preprocessor,
    recognizer: &mut dyn Recognizer,
    frame: &RgbaImage,
    regions: &FieldRegions,
) -> Result<Reading> {
    let size = frame.dimensions();

    let level = match regions.level.resolve(size) {
        Some(r) => read_level(preprocessor, recognizer, frame, &r)?,
        None => None,
    };
    let exp = match regions.exp.resolve(size) {
        Some(r) => read_exp(preprocessor, recognizer, frame, &r)?,
        None => ExpFields::default(),
    };

    Ok(Reading {
        level,
        exp_percent: exp.exp_percent,
        exp_value: exp.exp_value,
    })
}
