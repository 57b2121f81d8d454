//! Region geometry for the two on-screen fields.
//!
//! Regions are configured either as fractions of the frame (`RelativeRect`)
//! or as display-space pixels. Both are converted to `RegionRect` in
//! source-pixel space before anything is cropped, because the display the
//! user calibrated on and the captured frame may differ in resolution.

use serde::{Deserialize, Serialize};

/// A rectangle in relative coordinates (0.0 to 1.0).
/// Used for defining screen regions that scale with window size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelativeRect {
    /// X position of top-left corner (0.0 = left edge, 1.0 = right edge)
    pub x: f32,
    /// Y position of top-left corner (0.0 = top edge, 1.0 = bottom edge)
    pub y: f32,
    /// Width as fraction of frame width
    pub width: f32,
    /// Height as fraction of frame height
    pub height: f32,
}

impl Default for RelativeRect {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.1,
            height: 0.1,
        }
    }
}

impl RelativeRect {
    /// Converts to absolute source pixels, clamped to the frame.
    ///
    /// Returns `None` when the clamped rectangle has no area.
    pub fn to_region(&self, source_size: (u32, u32)) -> Option<RegionRect> {
        let (w, h) = source_size;
        let x0 = ((self.x.max(0.0) * w as f32) as u32).min(w);
        let y0 = ((self.y.max(0.0) * h as f32) as u32).min(h);
        let rw = ((self.width.max(0.0) * w as f32) as u32).min(w - x0);
        let rh = ((self.height.max(0.0) * h as f32) as u32).min(h - y0);

        RegionRect::new(x0, y0, rw, rh)
    }
}

/// Integer rectangle in source-image pixel space. Always has `w > 0, h > 0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl RegionRect {
    /// Builds a rect, rejecting empty ones.
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Option<Self> {
        if w == 0 || h == 0 {
            return None;
        }
        Some(Self { x, y, w, h })
    }

    /// Scales a rect given in display pixels into source pixels.
    ///
    /// The origin rounds down and the far edge rounds up so the converted
    /// region never loses glyph pixels at its border. The result is clamped
    /// to the source frame.
    pub fn from_display(
        rect: RegionRect,
        display_size: (u32, u32),
        source_size: (u32, u32),
    ) -> Option<Self> {
        let (dw, dh) = display_size;
        let (sw, sh) = source_size;
        if dw == 0 || dh == 0 {
            return None;
        }

        let sx = sw as f64 / dw as f64;
        let sy = sh as f64 / dh as f64;

        let x0 = (rect.x as f64 * sx).floor() as u32;
        let y0 = (rect.y as f64 * sy).floor() as u32;
        let x1 = ((rect.x + rect.w) as f64 * sx).ceil() as u32;
        let y1 = ((rect.y + rect.h) as f64 * sy).ceil() as u32;

        Self::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))?.clamp_to(sw, sh)
    }

    /// Clamps to a `width x height` frame. `None` if nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let x0 = self.x.min(width);
        let y0 = self.y.min(height);
        let x1 = self.x.saturating_add(self.w).min(width);
        let y1 = self.y.saturating_add(self.h).min(height);
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }
}

/// One field's configured location.
///
/// Either fractions of the frame, or pixels measured on a display of the
/// given size (for example a scaled preview the user calibrated on).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldRegion {
    Display {
        rect: RegionRect,
        display_width: u32,
        display_height: u32,
    },
    Relative(RelativeRect),
}

impl FieldRegion {
    /// Resolves to source pixels for a frame of `source_size`.
    pub fn resolve(&self, source_size: (u32, u32)) -> Option<RegionRect> {
        match *self {
            FieldRegion::Display { rect, display_width, display_height } => {
                RegionRect::from_display(rect, (display_width, display_height), source_size)
            }
            FieldRegion::Relative(rel) => rel.to_region(source_size),
        }
    }
}

impl From<RelativeRect> for FieldRegion {
    fn from(rect: RelativeRect) -> Self {
        FieldRegion::Relative(rect)
    }
}
