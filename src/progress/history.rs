use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Cumulative totals recorded after one accepted sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub cum_exp_value: f64,
    pub cum_exp_percent: f64,
    /// Stopwatch time at the sample; pauses do not advance it
    pub elapsed_at_ms: u64,
}

/// Retention limits for the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryLimits {
    /// Rolling window, measured back from the newest point's timestamp
    pub window_secs: u64,
    /// Hard cap on the number of points
    pub max_points: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            window_secs: 3 * 60 * 60,
            max_points: 20_000,
        }
    }
}

/// Append-only list of history points with oldest-first eviction.
#[derive(Debug, Clone, Default)]
pub struct History {
    points: VecDeque<HistoryPoint>,
    limits: HistoryLimits,
}

impl History {
    pub fn new(limits: HistoryLimits) -> Self {
        Self {
            points: VecDeque::new(),
            limits,
        }
    }

    /// Rebuilds from restored points, applying the current limits.
    pub fn from_points(points: Vec<HistoryPoint>, limits: HistoryLimits) -> Self {
        let mut history = Self {
            points: points.into(),
            limits,
        };
        history.evict();
        history
    }

    pub fn push(&mut self, point: HistoryPoint) {
        self.points.push_back(point);
        self.evict();
    }

    fn evict(&mut self) {
        // A window too large to represent never evicts by age
        let cutoff = self.points.back().and_then(|newest| {
            let secs = i64::try_from(self.limits.window_secs).ok()?;
            newest.timestamp.checked_sub_signed(Duration::try_seconds(secs)?)
        });
        if let Some(cutoff) = cutoff {
            while self.points.front().is_some_and(|p| p.timestamp < cutoff) {
                self.points.pop_front();
            }
        }
        while self.points.len() > self.limits.max_points {
            self.points.pop_front();
        }
    }

    pub fn points(&self) -> &VecDeque<HistoryPoint> {
        &self.points
    }

    pub fn to_vec(&self) -> Vec<HistoryPoint> {
        self.points.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}
