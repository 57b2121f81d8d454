//! Sample validation: decides whether one tick's reading may touch the totals.
//!
//! Stateless across calls. The only state consulted is the last accepted
//! sample, which is read, never written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sample::{OutlierReason, Reading, Sample};
use super::table::ExpTable;

/// Thresholds for the outlier checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// Max |read percent - value/required*100|, in percentage points
    pub pct_tolerance: f64,
    /// Value may exceed required EXP by this factor before it is rejected
    pub value_ceiling: f64,
    /// Largest same-level loss the game can inflict, in percentage points
    pub max_penalty_percent: f64,
    /// Extra allowance on top of the penalty for OCR noise
    pub drop_slack_percent: f64,
    /// A level change of this size or more in one tick is a misread
    pub level_jump: u32,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            pct_tolerance: 2.5,
            value_ceiling: 1.05,
            max_penalty_percent: 10.0,
            drop_slack_percent: 2.5,
            level_jump: 2,
        }
    }
}

/// Validates a reading against the last accepted sample and the EXP table.
///
/// Order: level continuity assist, completeness, percent/value consistency,
/// level jump, implausible same-level drop.
pub fn validate(
    reading: Reading,
    last: Option<&Sample>,
    table: &ExpTable,
    policy: &ValidationPolicy,
    timestamp: DateTime<Utc>,
) -> Sample {
    let mut reading = reading;
    let prev = last.and_then(Sample::fields);

    // The level tile is the less stable read under motion; borrow the last
    // accepted level when only the exp field came through.
    if reading.level.is_none() && reading.exp_value.is_some() && reading.exp_percent.is_some() {
        if let Some((prev_level, _, _)) = prev {
            log::debug!("level missing, assuming previous level {}", prev_level);
            reading.level = Some(prev_level);
        }
    }

    let (Some(level), Some(percent), Some(value)) = (reading.level, reading.exp_percent, reading.exp_value) else {
        return Sample::missing(timestamp, reading);
    };

    match table.required(level) {
        Some(required) => {
            let required = required as f64;
            let expected = value as f64 / required * 100.0;
            if value < 0 || value as f64 > required * policy.value_ceiling {
                log::debug!("rejecting: value {} outside 0..={} at level {}", value, required, level);
                return Sample::outlier(timestamp, reading, OutlierReason::PctValueMismatch);
            }
            if (expected - percent).abs() > policy.pct_tolerance {
                log::debug!(
                    "rejecting: read {:.2}% but {} / {} = {:.2}%",
                    percent, value, required, expected
                );
                return Sample::outlier(timestamp, reading, OutlierReason::PctValueMismatch);
            }
        }
        None => log::debug!("no EXP requirement for level {}, skipping consistency check", level),
    }

    let Some((prev_level, prev_percent, prev_value)) = prev else {
        return Sample::accepted(timestamp, level, percent, value);
    };

    if level.abs_diff(prev_level) >= policy.level_jump {
        log::debug!("rejecting: level {} -> {}", prev_level, level);
        return Sample::outlier(timestamp, reading, OutlierReason::LevelJump);
    }

    if level == prev_level && value < prev_value && percent < prev_percent {
        let drop = prev_percent - percent;
        if drop > policy.max_penalty_percent + policy.drop_slack_percent {
            log::debug!("rejecting: {:.2} point drop at level {}", drop, level);
            return Sample::outlier(timestamp, reading, OutlierReason::ImplausibleDrop);
        }
    }

    Sample::accepted(timestamp, level, percent, value)
}
