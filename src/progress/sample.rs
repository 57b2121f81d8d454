//! Per-tick readings and samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured fields read from one tick, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub level: Option<u32>,
    pub exp_percent: Option<f64>,
    pub exp_value: Option<i64>,
}

/// Why a structurally complete sample was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierReason {
    /// Read percent disagrees with value / required EXP, or value out of range
    PctValueMismatch,
    /// Level moved by two or more since the last accepted sample
    LevelJump,
    /// Same-level drop larger than any in-game penalty
    ImplausibleDrop,
}

impl OutlierReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutlierReason::PctValueMismatch => "pct_value_mismatch",
            OutlierReason::LevelJump => "level_jump",
            OutlierReason::ImplausibleDrop => "implausible_drop",
        }
    }
}

impl std::fmt::Display for OutlierReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tick's validated read. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub level: Option<u32>,
    pub exp_percent: Option<f64>,
    pub exp_value: Option<i64>,
    pub is_valid: bool,
    pub is_outlier: bool,
    pub outlier_reason: Option<OutlierReason>,
}

impl Sample {
    /// A sample that passed every check.
    pub fn accepted(timestamp: DateTime<Utc>, level: u32, exp_percent: f64, exp_value: i64) -> Self {
        Self {
            timestamp,
            level: Some(level),
            exp_percent: Some(exp_percent),
            exp_value: Some(exp_value),
            is_valid: true,
            is_outlier: false,
            outlier_reason: None,
        }
    }

    /// A sample with one or more fields missing. Not an outlier.
    pub fn missing(timestamp: DateTime<Utc>, reading: Reading) -> Self {
        Self {
            timestamp,
            level: reading.level,
            exp_percent: reading.exp_percent,
            exp_value: reading.exp_value,
            is_valid: false,
            is_outlier: false,
            outlier_reason: None,
        }
    }

    /// A complete sample rejected by policy.
    pub fn outlier(timestamp: DateTime<Utc>, reading: Reading, reason: OutlierReason) -> Self {
        Self {
            timestamp,
            level: reading.level,
            exp_percent: reading.exp_percent,
            exp_value: reading.exp_value,
            is_valid: false,
            is_outlier: true,
            outlier_reason: Some(reason),
        }
    }

    /// The three fields of an accepted sample.
    pub fn fields(&self) -> Option<(u32, f64, i64)> {
        if !self.is_valid {
            return None;
        }
        Some((self.level?, self.exp_percent?, self.exp_value?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outlier_reason_strings() {
        assert_eq!(OutlierReason::PctValueMismatch.to_string(), "pct_value_mismatch");
        assert_eq!(OutlierReason::LevelJump.to_string(), "level_jump");
        assert_eq!(
            serde_json::to_string(&OutlierReason::ImplausibleDrop).unwrap(),
            "\"implausible_drop\""
        );
    }

    #[test]
    fn test_fields_only_for_valid() {
        let now = Utc::now();
        let ok = Sample::accepted(now, 3, 12.5, 125);
        assert_eq!(ok.fields(), Some((3, 12.5, 125)));

        let reading = Reading { level: Some(3), exp_percent: Some(12.5), exp_value: Some(125) };
        let bad = Sample::outlier(now, reading, OutlierReason::LevelJump);
        assert_eq!(bad.fields(), None);
        assert!(bad.is_outlier);
        assert!(!Sample::missing(now, Reading::default()).is_outlier);
    }
}
