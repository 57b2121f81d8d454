//! Frame sources for the sampling loop.

use anyhow::{Context, Result};
use image::RgbaImage;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

/// Supplies one captured frame per tick.
pub trait FrameSource: Send {
    /// `Ok(None)` when no frame is available (end of a recording).
    fn next_frame(&mut self) -> Result<Option<RgbaImage>>;
}

/// Replays image files from a directory in file-name order.
pub struct ImageDirSource {
    files: VecDeque<PathBuf>,
}

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

impl ImageDirSource {
    pub fn open(dir: &Path) -> Result<Self> {
        let entries = fs::read_dir(dir)
            .context(format!("Failed to read frame directory: {}", dir.display()))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        log::info!("Found {} frames in {}", files.len(), dir.display());
        Ok(Self { files: files.into() })
    }

    pub fn remaining(&self) -> usize {
        self.files.len()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
        let Some(path) = self.files.pop_front() else {
            return Ok(None);
        };
        let img = image::open(&path)
            .context(format!("Failed to open frame: {}", path.display()))?;
        Ok(Some(img.to_rgba8()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::tempdir;

    #[test]
    fn test_replays_in_name_order() {
        let dir = tempdir().unwrap();
        for (name, shade) in [("002.png", 20u8), ("001.png", 10u8), ("003.png", 30u8)] {
            RgbaImage::from_pixel(4, 4, Rgba([shade, shade, shade, 255]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let mut source = ImageDirSource::open(dir.path()).unwrap();
        assert_eq!(source.remaining(), 3);

        let shades: Vec<u8> = std::iter::from_fn(|| source.next_frame().unwrap())
            .map(|f| f.get_pixel(0, 0)[0])
            .collect();
        assert_eq!(shades, vec![10, 20, 30]);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_missing_dir_is_error() {
        assert!(ImageDirSource::open(Path::new("/no/such/frames")).is_err());
    }
}
