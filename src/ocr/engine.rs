use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;

/// Tesseract page segmentation modes used by the field readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMode {
    /// Single text line (psm 7)
    SingleLine,
    /// Single word (psm 8)
    SingleWord,
}

impl PageMode {
    pub fn psm(self) -> u8 {
        match self {
            PageMode::SingleLine => 7,
            PageMode::SingleWord => 8,
        }
    }
}

/// One recognition request: segmentation mode plus an optional whitelist.
#[derive(Debug, Clone, Copy)]
pub struct RecognizeOptions<'a> {
    pub mode: PageMode,
    pub whitelist: Option<&'a str>,
}

/// Digits-only run for the level tile
pub const LEVEL_WHITELIST: &str = "0123456789";
/// Characters that can appear in the bracketed experience string
pub const EXP_WHITELIST: &str = "0123456789.,%[]";

/// Black-box text recognizer: bitmap in, best-effort text out.
///
/// The output may be empty or garbage; callers never rely on more than that.
pub trait Recognizer: Send {
    fn recognize(&mut self, bitmap: &GrayImage, opts: RecognizeOptions<'_>) -> Result<String>;

    /// Drops and re-acquires engine resources. Called strictly between ticks.
    fn restart(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Where to find the tesseract executable and its language data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Executable path; `None` searches the bundled dir, then PATH
    pub tesseract_path: Option<PathBuf>,
    /// `--tessdata-dir`; `None` lets tesseract use its own default
    pub tessdata_dir: Option<PathBuf>,
    /// Language passed with `-l`
    pub language: String,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            tesseract_path: None,
            tessdata_dir: None,
            language: "eng".to_string(),
        }
    }
}

/// Recognizer backed by the tesseract command line tool.
///
/// Every call is its own process, so `restart` only re-resolves the
/// executable (picking up a reinstalled binary).
pub struct TesseractRecognizer {
    config: RecognizerConfig,
    executable: PathBuf,
}

impl TesseractRecognizer {
    pub fn new(config: RecognizerConfig) -> Result<Self> {
        let executable = find_tesseract_executable(config.tesseract_path.as_deref())?;
        log::info!("Tesseract found at: {}", executable.display());
        Ok(Self { config, executable })
    }
}

impl Recognizer for TesseractRecognizer {
    fn recognize(&mut self, bitmap: &GrayImage, opts: RecognizeOptions<'_>) -> Result<String> {
        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        bitmap
            .save(temp_input.path())
            .context("Failed to write OCR input image")?;

        let mut cmd = Command::new(&self.executable);
        cmd.arg(temp_input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.language)
            .arg("--psm")
            .arg(opts.mode.psm().to_string());
        if let Some(dir) = &self.config.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        if let Some(chars) = opts.whitelist {
            cmd.arg("-c").arg(format!("tessedit_char_whitelist={}", chars));
        }

        let output = cmd.output().context("Failed to run tesseract")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn restart(&mut self) -> Result<()> {
        self.executable = find_tesseract_executable(self.config.tesseract_path.as_deref())?;
        log::debug!("Tesseract re-resolved: {}", self.executable.display());
        Ok(())
    }
}

/// Resolves the tesseract executable: explicit path, bundled copy under
/// `<exe_dir>/tesseract/`, then whatever `tesseract` is on PATH.
pub fn find_tesseract_executable(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(anyhow!("Configured tesseract not found: {}", path.display()));
    }

    let exe_name = if cfg!(windows) { "tesseract.exe" } else { "tesseract" };
    let bundled = crate::paths::get_tesseract_dir().join(exe_name);
    if bundled.exists() {
        return Ok(bundled);
    }

    match Command::new("tesseract").arg("--version").output() {
        Ok(output) if output.status.success() => Ok(PathBuf::from("tesseract")),
        _ => Err(anyhow!(
            "Tesseract not found. Install it, add it to PATH, or set recognizer.tesseract_path"
        )),
    }
}
