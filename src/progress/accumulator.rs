//! Running totals over accepted samples, level-aware.
//!
//! The accumulator is the only writer of the totals. Readers get copies via
//! `state()`.

use serde::{Deserialize, Serialize};

use super::sample::Sample;
use super::table::ExpTable;

/// Cumulative totals plus the sample the next delta is measured from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulatorState {
    pub cum_exp_percent: f64,
    pub cum_exp_value: f64,
    pub last_accepted: Option<Sample>,
}

/// Change applied by one accepted sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Delta {
    pub percent: f64,
    /// `None` when a required-EXP lookup in the span was unavailable
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    state: AccumulatorState,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: AccumulatorState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AccumulatorState {
        &self.state
    }

    pub fn last_accepted(&self) -> Option<&Sample> {
        self.state.last_accepted.as_ref()
    }

    /// Seeds the reference sample without touching the totals.
    ///
    /// Used on start/resume so a pre-pause reading is never diffed against
    /// a post-resume one.
    pub fn capture_baseline(&mut self, sample: Sample) {
        if sample.fields().is_some() {
            self.state.last_accepted = Some(sample);
        }
    }

    /// Applies an accepted sample. Returns `None` (and changes nothing) if the
    /// sample is not valid or there is no baseline yet, in which case the
    /// sample becomes the baseline.
    pub fn apply(&mut self, sample: Sample, table: &ExpTable) -> Option<Delta> {
        let cur = sample.fields()?;
        let Some(prev) = self.state.last_accepted.as_ref().and_then(Sample::fields) else {
            self.state.last_accepted = Some(sample);
            return None;
        };

        let delta = Delta {
            percent: percent_delta(prev, cur),
            value: value_delta(prev, cur, table),
        };

        self.state.cum_exp_percent += delta.percent;
        match delta.value {
            Some(v) => self.state.cum_exp_value += v,
            None => log::debug!(
                "EXP requirement missing between levels {} and {}, value total unchanged",
                prev.0,
                cur.0
            ),
        }
        self.state.last_accepted = Some(sample);

        Some(delta)
    }

    /// Clears totals and the reference sample together.
    pub fn reset(&mut self) {
        self.state = AccumulatorState::default();
    }
}

/// Percentage progress between two accepted samples.
///
/// Level up: the rest of the previous level plus the current percent.
/// Level down mirrors it with the roles swapped, negated.
pub fn percent_delta(prev: (u32, f64, i64), cur: (u32, f64, i64)) -> f64 {
    let (prev_level, prev_pct, _) = prev;
    let (cur_level, cur_pct, _) = cur;

    if cur_level > prev_level {
        (100.0 - prev_pct) + cur_pct
    } else if cur_level < prev_level {
        -((100.0 - cur_pct) + prev_pct)
    } else {
        cur_pct - prev_pct
    }
}

/// Absolute EXP progress between two accepted samples, spanning level
/// boundaries through the table. `None` if any needed level is missing.
pub fn value_delta(prev: (u32, f64, i64), cur: (u32, f64, i64), table: &ExpTable) -> Option<f64> {
    let (prev_level, _, prev_value) = prev;
    let (cur_level, _, cur_value) = cur;

    if cur_level == prev_level {
        return Some((cur_value - prev_value) as f64);
    }

    let (lo_level, lo_value, hi_value) = if cur_level > prev_level {
        (prev_level, prev_value, cur_value)
    } else {
        (cur_level, cur_value, prev_value)
    };

    let rest_of_lo = table.required(lo_level)? as f64 - lo_value as f64;
    let between = table.span_between(prev_level, cur_level)? as f64;
    let magnitude = rest_of_lo + between + hi_value as f64;

    Some(if cur_level > prev_level { magnitude } else { -magnitude })
}
