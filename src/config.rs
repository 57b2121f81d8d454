//! Configuration types for the tracker.
//!
//! Loads settings from config.json at startup. Provides field regions,
//! preprocessing and validation thresholds, retention limits and sampling
//! parameters. Every section falls back to its defaults independently.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use crate::ocr::{BracketTextParams, DigitTileParams, FieldRegions, RecognizerConfig};
use crate::progress::{HistoryLimits, PaceParams, ValidationPolicy};

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<TrackerConfig> = OnceLock::new();

/// Sampling period. Only the three periods the overlay offers are valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum TickInterval {
    #[default]
    One,
    Five,
    Ten,
}

impl TickInterval {
    pub fn as_secs(self) -> u64 {
        match self {
            TickInterval::One => 1,
            TickInterval::Five => 5,
            TickInterval::Ten => 10,
        }
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.as_secs())
    }
}

impl TryFrom<u64> for TickInterval {
    type Error = String;

    fn try_from(secs: u64) -> std::result::Result<Self, Self::Error> {
        match secs {
            1 => Ok(TickInterval::One),
            5 => Ok(TickInterval::Five),
            10 => Ok(TickInterval::Ten),
            other => Err(format!("tick interval must be 1, 5 or 10 seconds, got {}", other)),
        }
    }
}

impl From<TickInterval> for u64 {
    fn from(interval: TickInterval) -> u64 {
        interval.as_secs()
    }
}

/// Bitmap preprocessing for both field pipelines.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub digit: DigitTileParams,
    pub bracket: BracketTextParams,
}

/// Sampling loop settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Seconds between ticks: 1, 5 or 10
    pub interval: TickInterval,
    /// Restart the recognizer after this many ticks (0 = never)
    pub restart_every_ticks: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval: TickInterval::One,
            restart_every_ticks: 1800,
        }
    }
}

/// Complete tracker configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub regions: FieldRegions,
    pub preprocess: PreprocessConfig,
    pub validation: ValidationPolicy,
    pub history: HistoryLimits,
    pub pace: PaceParams,
    pub sampling: SamplingConfig,
    pub recognizer: RecognizerConfig,
    /// Level → required EXP table (.csv or .json)
    pub exp_table_path: Option<PathBuf>,
    /// Overrides the default snapshot directory
    pub snapshot_dir: Option<PathBuf>,
    /// `error`, `warn`, `info`, `debug` or `trace`
    pub log_level: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            regions: FieldRegions::default(),
            preprocess: PreprocessConfig::default(),
            validation: ValidationPolicy::default(),
            history: HistoryLimits::default(),
            pace: PaceParams::default(),
            sampling: SamplingConfig::default(),
            recognizer: RecognizerConfig::default(),
            exp_table_path: None,
            snapshot_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl TrackerConfig {
    /// Parsed `log_level`, falling back to `Info`.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    /// Snapshot directory: configured override or the platform default.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.snapshot_dir
            .clone()
            .unwrap_or_else(crate::paths::get_snapshots_dir)
    }
}

/// Reads and parses a config file. Unlike the startup path this reports errors.
pub fn load_config_from(path: &Path) -> Result<TrackerConfig> {
    let contents = fs::read_to_string(path)
        .context(format!("Failed to read config: {}", path.display()))?;
    serde_json::from_str(&contents)
        .map_err(|e| anyhow!("Failed to parse config {}: {}", path.display(), e))
}

/// Loads configuration from config.json or returns defaults.
/// Looks for config.json in the same directory as the executable.
fn load_config() -> TrackerConfig {
    let config_path = crate::paths::get_exe_dir().join("config.json");

    log::debug!("Looking for config at: {}", config_path.display());

    if !config_path.exists() {
        log::info!("config.json not found. Using default config.");
        return TrackerConfig::default();
    }

    match load_config_from(&config_path) {
        Ok(config) => {
            log::info!("Config loaded from config.json");
            config
        }
        Err(e) => {
            log::warn!("{:#}. Using defaults.", e);
            TrackerConfig::default()
        }
    }
}

/// Initializes the global configuration. Call once at startup.
///
/// An explicit config overrides the file next to the executable.
pub fn init_config(explicit: Option<TrackerConfig>) {
    let _ = CONFIG.set(explicit.unwrap_or_else(load_config));
}

/// Returns a reference to the global configuration, loading it on first use.
pub fn get_config() -> &'static TrackerConfig {
    CONFIG.get_or_init(load_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_object_is_default() {
        let config: TrackerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let json = r#"{
            "validation": { "pct_tolerance": 1.0 },
            "sampling": { "interval": 5 },
            "log_level": "debug"
        }"#;
        let config: TrackerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.validation.pct_tolerance, 1.0);
        assert_eq!(config.validation.level_jump, 2);
        assert_eq!(config.sampling.interval, TickInterval::Five);
        assert_eq!(config.sampling.restart_every_ticks, 1800);
        assert_eq!(config.level_filter(), log::LevelFilter::Debug);
    }

    #[test]
    fn test_invalid_interval_rejected() {
        let err = serde_json::from_str::<TrackerConfig>(r#"{ "sampling": { "interval": 3 } }"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_unknown_log_level_falls_back() {
        let config = TrackerConfig {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert_eq!(config.level_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "history": { "max_points": 10 } }"#).unwrap();
        let config = load_config_from(&path).unwrap();
        assert_eq!(config.history.max_points, 10);
        assert_eq!(config.history.window_secs, 3 * 60 * 60);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_config_from(&path).is_err());
        assert!(load_config_from(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_round_trip() {
        let config = TrackerConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: TrackerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
