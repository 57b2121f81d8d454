//! Chart-ready series derived from the history.
//!
//! Pure functions: nothing here mutates the history. The x axis is stopwatch
//! time (`elapsed_at_ms`), so paused spans do not stretch the domain.

use serde::{Deserialize, Serialize};

use super::history::HistoryPoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaceParams {
    /// Rates are projected onto this many minutes ("EXP per hour" = 60)
    pub window_minutes: f64,
    /// Trailing window for the recent pace
    pub recent_window_secs: u64,
}

impl Default for PaceParams {
    fn default() -> Self {
        Self {
            window_minutes: 60.0,
            recent_window_secs: 30,
        }
    }
}

/// One chart point: x = elapsed milliseconds, y = value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub elapsed_ms: u64,
    pub value: f64,
}

/// The three derived series.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaceSeries {
    pub overall: Vec<SeriesPoint>,
    pub recent: Vec<SeriesPoint>,
    pub cumulative: Vec<SeriesPoint>,
}

impl PaceSeries {
    pub fn from_history<'a, I>(points: I, params: &PaceParams) -> Self
    where
        I: IntoIterator<Item = &'a HistoryPoint>,
        I::IntoIter: Clone,
    {
        let points = points.into_iter();
        Self {
            overall: overall_pace(points.clone(), params),
            recent: recent_pace(points.clone(), params),
            cumulative: cumulative(points),
        }
    }
}

/// Overall pace: cumulative value over elapsed time, projected to the window.
/// Points at zero elapsed time have no rate and are skipped.
pub fn overall_pace<'a>(points: impl IntoIterator<Item = &'a HistoryPoint>, params: &PaceParams) -> Vec<SeriesPoint> {
    let projection = params.window_minutes * 60.0;
    points
        .into_iter()
        .filter(|p| p.elapsed_at_ms > 0)
        .map(|p| SeriesPoint {
            elapsed_ms: p.elapsed_at_ms,
            value: p.cum_exp_value / (p.elapsed_at_ms as f64 / 1000.0) * projection,
        })
        .collect()
}

/// Recent pace: rate between each point and the earliest point inside the
/// trailing window, projected to the window. Two-pointer scan, one pass.
pub fn recent_pace<'a>(points: impl IntoIterator<Item = &'a HistoryPoint>, params: &PaceParams) -> Vec<SeriesPoint> {
    let points: Vec<&HistoryPoint> = points.into_iter().collect();
    let projection = params.window_minutes * 60.0;
    let window_ms = params.recent_window_secs.saturating_mul(1000);

    let mut out = Vec::with_capacity(points.len());
    let mut start = 0usize;

    for (i, cur) in points.iter().enumerate() {
        while start < i && cur.elapsed_at_ms.saturating_sub(points[start].elapsed_at_ms) > window_ms {
            start += 1;
        }
        let first = points[start];
        let dt_ms = cur.elapsed_at_ms.saturating_sub(first.elapsed_at_ms);
        if dt_ms == 0 {
            continue;
        }
        let rate = (cur.cum_exp_value - first.cum_exp_value) / (dt_ms as f64 / 1000.0);
        out.push(SeriesPoint {
            elapsed_ms: cur.elapsed_at_ms,
            value: rate * projection,
        });
    }

    out
}

/// Cumulative curve: raw `(elapsed, cumulative value)` pairs.
pub fn cumulative<'a>(points: impl IntoIterator<Item = &'a HistoryPoint>) -> Vec<SeriesPoint> {
    points
        .into_iter()
        .map(|p| SeriesPoint {
            elapsed_ms: p.elapsed_at_ms,
            value: p.cum_exp_value,
        })
        .collect()
}
