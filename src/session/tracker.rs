//! Session state owner: stopwatch, accumulator and history behind one API.
//!
//! The tracker is the single writer of all measurement state. Every method
//! that depends on the time takes `now` explicitly.

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

use super::state::TrackerState;
use crate::config::TrackerConfig;
use crate::progress::{
    validate, Accumulator, ExpTable, History, HistoryLimits, HistoryPoint, PaceParams, PaceSeries,
    Reading, Sample, Stopwatch, ValidationPolicy,
};
use crate::snapshot::{RuntimeState, Snapshot, CURRENT_VERSION};

/// Tunables the tracker needs from the configuration.
#[derive(Debug, Clone, Default)]
pub struct TrackerSettings {
    pub validation: ValidationPolicy,
    pub history: HistoryLimits,
    pub pace: PaceParams,
}

impl From<&TrackerConfig> for TrackerSettings {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            validation: config.validation.clone(),
            history: config.history.clone(),
            pace: config.pace.clone(),
        }
    }
}

/// What one reading did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    /// Seeded the reference sample after start/resume; totals unchanged
    Baseline(Sample),
    /// Advanced the totals and appended a history point
    Accepted(Sample),
    /// One or more fields unread
    Missing(Sample),
    /// Complete but rejected by policy
    Outlier(Sample),
    /// Read while not running; display only
    Observed(Sample),
}

impl Ingest {
    pub fn sample(&self) -> &Sample {
        match self {
            Ingest::Baseline(s)
            | Ingest::Accepted(s)
            | Ingest::Missing(s)
            | Ingest::Outlier(s)
            | Ingest::Observed(s) => s,
        }
    }
}

/// Read-only view for displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub state: String,
    pub elapsed_ms: u64,
    pub cum_exp_value: f64,
    pub cum_exp_percent: f64,
    /// Latest sample that is not an outlier
    pub displayed: Option<Sample>,
    /// Latest sample of any kind
    pub latest: Option<Sample>,
    pub history_len: usize,
}

pub struct Tracker {
    table: ExpTable,
    settings: TrackerSettings,
    state: TrackerState,
    has_started: bool,
    /// Next valid sample seeds the accumulator instead of producing a delta
    baseline_armed: bool,
    stopwatch: Stopwatch,
    accumulator: Accumulator,
    history: History,
    displayed: Option<Sample>,
    latest: Option<Sample>,
}

impl Tracker {
    pub fn new(table: ExpTable, settings: TrackerSettings) -> Self {
        let history = History::new(settings.history.clone());
        Self {
            table,
            settings,
            state: TrackerState::Idle,
            has_started: false,
            baseline_armed: false,
            stopwatch: Stopwatch::new(),
            accumulator: Accumulator::new(),
            history,
            displayed: None,
            latest: None,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn table(&self) -> &ExpTable {
        &self.table
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Starts or resumes. The next valid sample becomes the baseline.
    pub fn start(&mut self, now: DateTime<Utc>) {
        if self.state == TrackerState::Running {
            return;
        }
        let now = stamp(now);
        self.stopwatch.start(now);
        self.has_started = true;
        self.baseline_armed = true;
        self.state = TrackerState::Running;
        log::info!("Tracking started");
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        if self.state != TrackerState::Running {
            return;
        }
        let now = stamp(now);
        self.stopwatch.pause(now);
        self.baseline_armed = false;
        self.state = TrackerState::Paused;
        log::info!("Tracking paused at {} ms", self.stopwatch.elapsed_ms(now));
    }

    /// Clears totals, history and the stopwatch together.
    pub fn reset(&mut self) {
        self.stopwatch.reset();
        self.accumulator.reset();
        self.history.clear();
        self.has_started = false;
        self.baseline_armed = false;
        self.displayed = None;
        self.latest = None;
        self.state = TrackerState::Idle;
        log::info!("Tracking reset");
    }

    /// Validates one reading and applies it according to the current state.
    pub fn ingest(&mut self, reading: Reading, now: DateTime<Utc>) -> Ingest {
        let now = stamp(now);
        let policy = &self.settings.validation;

        let outcome = if self.state != TrackerState::Running {
            let sample = validate(reading, self.accumulator.last_accepted(), &self.table, policy, now);
            Ingest::Observed(sample)
        } else if self.baseline_armed {
            // No prior: a pre-pause reading must never be diffed against this one
            let sample = validate(reading, None, &self.table, policy, now);
            if sample.is_valid {
                self.accumulator.capture_baseline(sample.clone());
                self.baseline_armed = false;
                log::debug!("Baseline captured: {:?}", sample.fields());
                Ingest::Baseline(sample)
            } else {
                classify_rejected(sample)
            }
        } else {
            let sample = validate(reading, self.accumulator.last_accepted(), &self.table, policy, now);
            if sample.is_valid {
                if self.accumulator.apply(sample.clone(), &self.table).is_some() {
                    let totals = self.accumulator.state();
                    self.history.push(HistoryPoint {
                        timestamp: now,
                        cum_exp_value: totals.cum_exp_value,
                        cum_exp_percent: totals.cum_exp_percent,
                        elapsed_at_ms: self.stopwatch.elapsed_ms(now),
                    });
                }
                Ingest::Accepted(sample)
            } else {
                classify_rejected(sample)
            }
        };

        let sample = outcome.sample();
        if let Some(reason) = sample.outlier_reason {
            log::debug!("Outlier rejected ({}): {:?}", reason, sample);
        } else {
            self.displayed = Some(sample.clone());
        }
        self.latest = Some(sample.clone());

        outcome
    }

    pub fn view(&self, now: DateTime<Utc>) -> ProgressView {
        let totals = self.accumulator.state();
        ProgressView {
            state: self.state.to_string(),
            elapsed_ms: self.stopwatch.elapsed_ms(now),
            cum_exp_value: totals.cum_exp_value,
            cum_exp_percent: totals.cum_exp_percent,
            displayed: self.displayed.clone(),
            latest: self.latest.clone(),
            history_len: self.history.len(),
        }
    }

    pub fn series(&self) -> PaceSeries {
        PaceSeries::from_history(self.history.points(), &self.settings.pace)
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> Snapshot {
        Snapshot {
            version: CURRENT_VERSION,
            captured_at: stamp(now),
            runtime: RuntimeState {
                has_started: self.has_started,
            },
            stopwatch: self.stopwatch.clone(),
            accumulator: self.accumulator.state().clone(),
            history: self.history.to_vec(),
        }
    }

    /// Replaces the session with a snapshot's state.
    ///
    /// A snapshot taken while running is folded at its capture time, so the
    /// gap between save and restore is not counted. Restored sessions land
    /// paused (idle if never started); resuming captures a fresh baseline.
    pub fn restore(&mut self, snapshot: Snapshot) {
        let mut stopwatch = snapshot.stopwatch;
        stopwatch.pause(snapshot.captured_at);

        self.stopwatch = stopwatch;
        self.accumulator = Accumulator::from_state(snapshot.accumulator);
        self.history = History::from_points(snapshot.history, self.settings.history.clone());
        self.has_started = snapshot.runtime.has_started;
        self.baseline_armed = false;
        self.displayed = self.accumulator.last_accepted().cloned();
        self.latest = None;
        self.state = if self.has_started {
            TrackerState::Paused
        } else {
            TrackerState::Idle
        };
        log::info!(
            "Session restored: {} history points, state {}",
            self.history.len(),
            self.state
        );
    }
}

/// Snapshots store milliseconds; state never holds finer timestamps.
fn stamp(now: DateTime<Utc>) -> DateTime<Utc> {
    now.trunc_subsecs(3)
}

fn classify_rejected(sample: Sample) -> Ingest {
    if sample.is_outlier {
        Ingest::Outlier(sample)
    } else {
        Ingest::Missing(sample)
    }
}
