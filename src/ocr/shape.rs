//! Last-resort shape check for a lone "1" on the level tile.
//!
//! The recognizer routinely drops a single thin "1" glyph. This classifier
//! only ever answers "this is a 1" for a tall, slim, low-area blob; every
//! other shape is `No` or `Unknown`, and neither may be turned into a digit.

use image::GrayImage;

/// Tri-state verdict of a narrowly scoped classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Yes,
    No,
    Unknown,
}

/// Minimum height/width ratio of a "1" blob
const MIN_ASPECT: f32 = 2.5;
/// Blob must span at least this share of the glyph area height
const MIN_HEIGHT_SHARE: f32 = 0.5;
/// Foreground pixels as share of the whole bitmap
const MAX_AREA_SHARE: f32 = 0.15;
/// Below this aspect the blob is clearly not a "1"
const WIDE_ASPECT: f32 = 1.2;

/// Classifies a preprocessed (black-on-white) level bitmap as the digit "1".
///
/// The blob must be one contiguous run of columns (a single stroke, no
/// second glyph), tall relative to its width, tall relative to the bitmap,
/// and small in area.
pub fn classify_digit_one(img: &GrayImage) -> Verdict {
    let (w, h) = img.dimensions();
    let mut col_has_ink = vec![false; w as usize];
    let (mut x0, mut y0, mut x1, mut y1) = (u32::MAX, u32::MAX, 0u32, 0u32);
    let mut ink = 0u32;

    for (x, y, p) in img.enumerate_pixels() {
        if p[0] >= 128 {
            continue;
        }
        ink += 1;
        col_has_ink[x as usize] = true;
        x0 = x0.min(x);
        y0 = y0.min(y);
        x1 = x1.max(x);
        y1 = y1.max(y);
    }

    if ink == 0 {
        return Verdict::No;
    }

    let blob_w = (x1 - x0 + 1) as f32;
    let blob_h = (y1 - y0 + 1) as f32;
    let aspect = blob_h / blob_w;

    if aspect < WIDE_ASPECT {
        return Verdict::No;
    }

    let contiguous = col_has_ink[x0 as usize..=x1 as usize].iter().all(|&c| c);
    let area_share = ink as f32 / (w * h) as f32;
    let height_share = blob_h / h as f32;

    if contiguous && aspect >= MIN_ASPECT && height_share >= MIN_HEIGHT_SHARE && area_share <= MAX_AREA_SHARE {
        Verdict::Yes
    } else {
        Verdict::Unknown
    }
}
