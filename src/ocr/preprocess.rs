//! Region preprocessing: captured frame region → OCR-ready bitmap.
//!
//! Two pipelines, one per field layout:
//! - digit tile (level): bright digits on a colored tile, isolated by a
//!   low-chroma/high-brightness test
//! - bracketed text (experience): `12,345[67.89%]`, binarized with Otsu's
//!   threshold so it holds up across in-game brightness changes
//!
//! Both render text black on white and finish with a tight crop plus a
//! uniform white border. Intermediate buffers live in a `Preprocessor` and
//! are reused across ticks.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbaImage};
use serde::{Deserialize, Serialize};

use super::region::RegionRect;

const BLACK: u8 = 0;
const WHITE: u8 = 255;

/// Tuning for the level digit tile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigitTileParams {
    /// Integer nearest-neighbor upscale factor (at least 3)
    pub scale: u32,
    /// Max per-channel spread (max - min) for a glyph pixel
    pub chroma_threshold: u8,
    /// Min mean channel brightness for a glyph pixel
    pub brightness_threshold: u8,
    /// Margin kept around the glyph bounding box before rescaling
    pub crop_margin: u32,
    /// Height of the glyph crop after rescaling
    pub target_height: u32,
    /// White border added on every side
    pub padding: u32,
}

impl Default for DigitTileParams {
    fn default() -> Self {
        Self {
            scale: 4,
            chroma_threshold: 48,
            brightness_threshold: 160,
            crop_margin: 4,
            target_height: 48,
            padding: 16,
        }
    }
}

/// Tuning for the bracketed experience string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BracketTextParams {
    /// Smallest acceptable height after upscaling
    pub min_height: u32,
    /// Blank near-uniform rows in the top/bottom margin band
    pub trim_edge_rows: bool,
    /// Fraction of the height (from each edge) that counts as margin
    pub edge_band: f32,
    /// A margin row whose background or foreground share reaches this is blanked
    pub edge_row_uniformity: f32,
    /// Margin kept around the text bounding box
    pub crop_margin: u32,
    /// White border added on every side
    pub padding: u32,
}

impl Default for BracketTextParams {
    fn default() -> Self {
        Self {
            min_height: 64,
            trim_edge_rows: true,
            edge_band: 0.15,
            edge_row_uniformity: 0.9,
            crop_margin: 4,
            padding: 16,
        }
    }
}

/// Reusable working buffers. One per pipeline stage.
#[derive(Default)]
struct Scratch {
    upscaled: Vec<u8>,
    luma: Vec<u8>,
    mask: Vec<u8>,
    dilated: Vec<u8>,
}

/// Owns the preprocessing parameters and the buffers reused between ticks.
pub struct Preprocessor {
    pub digit: DigitTileParams,
    pub bracket: BracketTextParams,
    scratch: Scratch,
}

impl Preprocessor {
    pub fn new(digit: DigitTileParams, bracket: BracketTextParams) -> Self {
        Self {
            digit,
            bracket,
            scratch: Scratch::default(),
        }
    }

    /// Digit-tile pipeline for the level field.
    ///
    /// Returns `None` only when the region lies outside the frame. If no
    /// glyph pixels are found the upscaled region is returned as plain
    /// grayscale, without thresholding or cropping.
    pub fn digit_tile(&mut self, frame: &RgbaImage, region: &RegionRect) -> Option<GrayImage> {
        let p = &self.digit;
        let region = region.clamp_to(frame.width(), frame.height())?;
        let scale = p.scale.max(3);

        let (w, h) = upscale_nearest(frame, &region, scale, &mut self.scratch.upscaled);

        let mask = &mut self.scratch.mask;
        mask.clear();
        mask.extend(self.scratch.upscaled.chunks_exact(4).map(|px| {
            let max = px[0].max(px[1]).max(px[2]);
            let min = px[0].min(px[1]).min(px[2]);
            let mean = (px[0] as u16 + px[1] as u16 + px[2] as u16) / 3;
            u8::from(max - min < p.chroma_threshold && mean > p.brightness_threshold as u16)
        }));

        dilate_3x3(&self.scratch.mask, w, h, &mut self.scratch.dilated);

        let Some(bbox) = bounding_box(&self.scratch.dilated, w, h) else {
            log::debug!("digit tile: no glyph pixels in {}x{} region", region.w, region.h);
            let gray = self.scratch.upscaled.chunks_exact(4).map(|px| luminance(px[0], px[1], px[2]));
            return GrayImage::from_vec(w, h, gray.collect());
        };

        Some(crop_and_pad(
            &self.scratch.dilated,
            w,
            h,
            bbox,
            p.crop_margin,
            Some(p.target_height),
            p.padding,
        ))
    }

    /// Bracketed-text pipeline for the experience field.
    ///
    /// Returns `None` only when the region lies outside the frame.
    pub fn bracket_text(&mut self, frame: &RgbaImage, region: &RegionRect) -> Option<GrayImage> {
        let p = &self.bracket;
        let region = region.clamp_to(frame.width(), frame.height())?;
        let scale = scale_for_min_height(region.h, p.min_height);

        let (w, h) = upscale_nearest(frame, &region, scale, &mut self.scratch.upscaled);

        let luma = &mut self.scratch.luma;
        luma.clear();
        luma.extend(self.scratch.upscaled.chunks_exact(4).map(|px| luminance(px[0], px[1], px[2])));

        let mut hist = [0u32; 256];
        for &v in luma.iter() {
            hist[v as usize] += 1;
        }
        let t = otsu_threshold(&hist);

        // Text is the minority class; background polarity varies by scene.
        // This goes past plain Otsu binarization, which assumes bright text.
        let bright = hist[t as usize + 1..].iter().map(|&c| c as usize).sum::<usize>();
        let text_is_bright = bright * 2 <= luma.len();

        let mask = &mut self.scratch.mask;
        mask.clear();
        mask.extend(luma.iter().map(|&v| u8::from((v > t) == text_is_bright)));

        if p.trim_edge_rows {
            trim_edge_rows(mask, w, h, p.edge_band, p.edge_row_uniformity);
        }

        let Some(bbox) = bounding_box(mask, w, h) else {
            log::debug!("bracket text: no text pixels after threshold {}", t);
            return Some(render_mask(mask, w, h));
        };

        Some(crop_and_pad(mask, w, h, bbox, p.crop_margin, None, p.padding))
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(DigitTileParams::default(), BracketTextParams::default())
    }
}

/// Smallest integer scale that lifts `height` to at least `min_height`.
pub fn scale_for_min_height(height: u32, min_height: u32) -> u32 {
    if height == 0 {
        return 1;
    }
    min_height.div_ceil(height).max(1)
}

/// ITU-R BT.601 luma.
fn luminance(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

/// Nearest-neighbor upscale of a frame region into `out` (RGBA, row-major).
/// Returns the upscaled dimensions.
fn upscale_nearest(frame: &RgbaImage, region: &RegionRect, scale: u32, out: &mut Vec<u8>) -> (u32, u32) {
    let w = region.w * scale;
    let h = region.h * scale;
    out.clear();
    out.reserve((w * h * 4) as usize);

    for y in 0..h {
        let sy = region.y + y / scale;
        for x in 0..w {
            let sx = region.x + x / scale;
            out.extend_from_slice(&frame.get_pixel(sx, sy).0);
        }
    }

    (w, h)
}

/// Otsu's global threshold over a 256-bin histogram.
///
/// Returns the bin `t` maximizing between-class variance, where the
/// background class is `[0, t]` and the foreground class `(t, 255]`.
pub fn otsu_threshold(hist: &[u32; 256]) -> u8 {
    let total: f64 = hist.iter().map(|&c| c as f64).sum();
    if total == 0.0 {
        return 127;
    }
    let sum_all: f64 = hist.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();

    let mut w_b = 0.0;
    let mut sum_b = 0.0;
    let mut best_t = 0u8;
    let mut best_var = -1.0;

    for (t, &count) in hist.iter().enumerate() {
        w_b += count as f64;
        if w_b == 0.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f == 0.0 {
            break;
        }
        sum_b += t as f64 * count as f64;

        let m_b = sum_b / w_b;
        let m_f = (sum_all - sum_b) / w_f;
        let var = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var > best_var {
            best_var = var;
            best_t = t as u8;
        }
    }

    best_t
}

/// One pass of 3x3 binary dilation.
fn dilate_3x3(src: &[u8], w: u32, h: u32, dst: &mut Vec<u8>) {
    let (w, h) = (w as usize, h as usize);
    dst.clear();
    dst.resize(w * h, 0);

    for y in 0..h {
        for x in 0..w {
            if src[y * w + x] == 0 {
                continue;
            }
            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    dst[ny * w + nx] = 1;
                }
            }
        }
    }
}

/// Blanks near-uniform rows in the top and bottom margin bands.
///
/// Letterbox bars (mostly foreground) and padding rows carrying a few stray
/// specks (mostly background) would otherwise stretch the bounding box.
/// Mostly-foreground rows are blanked in addition to mostly-background ones.
fn trim_edge_rows(mask: &mut [u8], w: u32, h: u32, band: f32, uniformity: f32) {
    let (w, h) = (w as usize, h as usize);
    if w == 0 {
        return;
    }
    let band_rows = ((h as f32 * band.clamp(0.0, 0.5)).ceil() as usize).min(h);

    let rows = (0..band_rows).chain(h - band_rows..h);
    for y in rows {
        let row = &mut mask[y * w..(y + 1) * w];
        let fg = row.iter().filter(|&&m| m != 0).count() as f32 / w as f32;
        if fg >= uniformity || 1.0 - fg >= uniformity {
            row.fill(0);
        }
    }
}

/// Inclusive bounding box `(x0, y0, x1, y1)` of set mask pixels.
fn bounding_box(mask: &[u8], w: u32, h: u32) -> Option<(u32, u32, u32, u32)> {
    let mut bbox: Option<(u32, u32, u32, u32)> = None;
    for y in 0..h {
        for x in 0..w {
            if mask[(y * w + x) as usize] == 0 {
                continue;
            }
            bbox = Some(match bbox {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }
    bbox
}

/// Renders a mask as black glyphs on white.
fn render_mask(mask: &[u8], w: u32, h: u32) -> GrayImage {
    GrayImage::from_fn(w, h, |x, y| {
        if mask[(y * w + x) as usize] != 0 {
            Luma([BLACK])
        } else {
            Luma([WHITE])
        }
    })
}

/// Crops a mask to `bbox` plus `margin`, optionally rescales to
/// `target_height` (nearest, aspect kept), renders it and adds a white border.
fn crop_and_pad(
    mask: &[u8],
    w: u32,
    h: u32,
    bbox: (u32, u32, u32, u32),
    margin: u32,
    target_height: Option<u32>,
    padding: u32,
) -> GrayImage {
    let (bx0, by0, bx1, by1) = bbox;
    let x0 = bx0.saturating_sub(margin);
    let y0 = by0.saturating_sub(margin);
    let x1 = (bx1 + margin).min(w - 1);
    let y1 = (by1 + margin).min(h - 1);
    let cw = x1 - x0 + 1;
    let ch = y1 - y0 + 1;

    let mut glyphs = GrayImage::from_fn(cw, ch, |x, y| {
        if mask[((y0 + y) * w + x0 + x) as usize] != 0 {
            Luma([BLACK])
        } else {
            Luma([WHITE])
        }
    });

    if let Some(th) = target_height.filter(|&th| th > 0 && th != ch) {
        let tw = ((cw as f64 * th as f64 / ch as f64).round() as u32).max(1);
        glyphs = imageops::resize(&glyphs, tw, th, FilterType::Nearest);
    }

    let mut out = GrayImage::from_pixel(glyphs.width() + 2 * padding, glyphs.height() + 2 * padding, Luma([WHITE]));
    imageops::replace(&mut out, &glyphs, padding as i64, padding as i64);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    /// Orange tile with a white vertical bar (a crude "1") in the middle.
    fn digit_tile_frame() -> RgbaImage {
        RgbaImage::from_fn(20, 12, |x, y| {
            if (9..=10).contains(&x) && (2..=9).contains(&y) {
                Rgba([245, 245, 240, 255])
            } else {
                Rgba([230, 120, 30, 255])
            }
        })
    }

    fn count_black(img: &GrayImage) -> usize {
        img.pixels().filter(|p| p[0] == BLACK).count()
    }

    #[test]
    fn test_otsu_bimodal() {
        let mut hist = [0u32; 256];
        hist[40] = 500;
        hist[200] = 100;
        let t = otsu_threshold(&hist);
        assert!((40..200).contains(&t), "threshold {} should split the modes", t);
    }

    #[test]
    fn test_otsu_empty_histogram() {
        assert_eq!(otsu_threshold(&[0u32; 256]), 127);
    }

    #[test]
    fn test_scale_for_min_height() {
        assert_eq!(scale_for_min_height(20, 64), 4);
        assert_eq!(scale_for_min_height(32, 64), 2);
        assert_eq!(scale_for_min_height(100, 64), 1);
        assert_eq!(scale_for_min_height(0, 64), 1);
    }

    #[test]
    fn test_dilate_grows_single_pixel() {
        let mut src = vec![0u8; 25];
        src[12] = 1; // center of 5x5
        let mut dst = Vec::new();
        dilate_3x3(&src, 5, 5, &mut dst);
        assert_eq!(dst.iter().filter(|&&v| v == 1).count(), 9);
        assert_eq!(dst[0], 0);
    }

    #[test]
    fn test_dilate_clips_at_border() {
        let mut src = vec![0u8; 9];
        src[0] = 1;
        let mut dst = Vec::new();
        dilate_3x3(&src, 3, 3, &mut dst);
        assert_eq!(dst, vec![1, 1, 0, 1, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_digit_tile_isolates_white_glyph() {
        let frame = digit_tile_frame();
        let region = RegionRect::new(0, 0, 20, 12).unwrap();
        let mut pre = Preprocessor::default();
        let out = pre.digit_tile(&frame, &region).unwrap();

        let p = DigitTileParams::default();
        assert_eq!(out.height(), p.target_height + 2 * p.padding);
        assert!(count_black(&out) > 0);
        // Border stays white
        assert_eq!(out.get_pixel(0, 0)[0], WHITE);
        assert_eq!(out.get_pixel(out.width() - 1, out.height() - 1)[0], WHITE);
        // Tall slim glyph stays tall and slim
        assert!(out.width() < out.height());
    }

    #[test]
    fn test_digit_tile_no_glyph_returns_uncropped() {
        let frame = RgbaImage::from_fn(10, 6, |x, _| {
            if x < 5 { Rgba([200, 40, 40, 255]) } else { Rgba([20, 20, 120, 255]) }
        });
        let region = RegionRect::new(0, 0, 10, 6).unwrap();
        let mut pre = Preprocessor::default();
        let out = pre.digit_tile(&frame, &region).unwrap();

        assert_eq!(out.dimensions(), (40, 24));
        // Source shades survive: no threshold, no crop
        assert_eq!(out.get_pixel(0, 0)[0], luminance(200, 40, 40));
        assert_eq!(out.get_pixel(39, 23)[0], luminance(20, 20, 120));
        assert_ne!(out.get_pixel(0, 0)[0], WHITE);
    }

    #[test]
    fn test_digit_tile_region_outside_frame() {
        let frame = digit_tile_frame();
        let region = RegionRect::new(50, 50, 5, 5).unwrap();
        assert!(Preprocessor::default().digit_tile(&frame, &region).is_none());
    }

    #[test]
    fn test_bracket_text_bright_on_dark() {
        // Dark strip with a bright block of "text"
        let frame = RgbaImage::from_fn(40, 16, |x, y| {
            if (10..30).contains(&x) && (5..11).contains(&y) {
                Rgba([230, 230, 230, 255])
            } else {
                Rgba([20, 25, 30, 255])
            }
        });
        let region = RegionRect::new(0, 0, 40, 16).unwrap();
        let mut pre = Preprocessor::default();
        let out = pre.bracket_text(&frame, &region).unwrap();

        // 16px -> scale 4 -> text block is 80x24, plus margin 4 and padding 16
        assert_eq!(out.dimensions(), (80 + 8 + 32, 24 + 8 + 32));
        assert_eq!(count_black(&out), 80 * 24);
    }

    #[test]
    fn test_bracket_text_dark_on_bright() {
        let frame = RgbaImage::from_fn(40, 16, |x, y| {
            if (10..30).contains(&x) && (5..11).contains(&y) {
                Rgba([10, 10, 10, 255])
            } else {
                Rgba([240, 240, 240, 255])
            }
        });
        let region = RegionRect::new(0, 0, 40, 16).unwrap();
        let out = Preprocessor::default().bracket_text(&frame, &region).unwrap();
        assert_eq!(count_black(&out), 80 * 24);
    }

    #[test]
    fn test_bracket_text_dark_on_light_with_partial_letterbox() {
        // Light strip, dark text block, and a dark bar over 95% of the top row
        let frame = RgbaImage::from_fn(40, 16, |x, y| {
            if y == 0 && x < 38 {
                Rgba([5, 5, 5, 255])
            } else if (10..30).contains(&x) && (5..11).contains(&y) {
                Rgba([15, 15, 15, 255])
            } else {
                Rgba([235, 235, 235, 255])
            }
        });
        let region = RegionRect::new(0, 0, 40, 16).unwrap();
        let out = Preprocessor::default().bracket_text(&frame, &region).unwrap();

        // The bar is gone; only the text block is kept
        assert_eq!(out.dimensions(), (80 + 8 + 32, 24 + 8 + 32));
        assert_eq!(count_black(&out), 80 * 24);
    }

    #[test]
    fn test_trim_edge_rows_removes_bar_and_specks() {
        // 10x10 mask: solid bar on row 0, one speck on row 9, text rows in the middle
        let mut mask = vec![0u8; 100];
        mask[0..10].fill(1);
        mask[95] = 1;
        for y in 3..7 {
            mask[y * 10 + 2..y * 10 + 8].fill(1);
        }
        trim_edge_rows(&mut mask, 10, 10, 0.15, 0.85);

        assert!(mask[0..10].iter().all(|&m| m == 0));
        assert_eq!(mask[95], 0);
        assert_eq!(bounding_box(&mask, 10, 10), Some((2, 3, 7, 6)));
    }

    #[test]
    fn test_scratch_buffers_reused() {
        let frame = digit_tile_frame();
        let region = RegionRect::new(0, 0, 20, 12).unwrap();
        let mut pre = Preprocessor::default();
        let first = pre.digit_tile(&frame, &region).unwrap();
        let cap = pre.scratch.upscaled.capacity();
        let second = pre.digit_tile(&frame, &region).unwrap();

        assert_eq!(first, second);
        assert_eq!(pre.scratch.upscaled.capacity(), cap);
    }
}
