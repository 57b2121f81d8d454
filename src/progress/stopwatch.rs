use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session stopwatch. Accumulates running time across pauses.
///
/// Every method that needs the current time takes `now` so callers (and
/// tests) control the clock.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stopwatch {
    /// Time accumulated from earlier running windows
    pub accumulated_ms: u64,
    /// Start of the current running window, if running
    #[serde(with = "chrono::serde::ts_milliseconds_option", default)]
    pub running_since: Option<DateTime<Utc>>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        if let Some(since) = self.running_since.take() {
            self.accumulated_ms = self.accumulated_ms.saturating_add(window_ms(since, now));
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Total running time up to `now`. A clock that went backwards counts as zero.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        match self.running_since {
            Some(since) => self.accumulated_ms.saturating_add(window_ms(since, now)),
            None => self.accumulated_ms,
        }
    }
}

fn window_ms(since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - since).num_milliseconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_accumulates_across_pauses() {
        let t0 = Utc::now();
        let mut sw = Stopwatch::new();
        sw.start(t0);
        assert_eq!(sw.elapsed_ms(t0 + Duration::seconds(5)), 5000);
        sw.pause(t0 + Duration::seconds(10));

        // Paused time does not count
        assert_eq!(sw.elapsed_ms(t0 + Duration::seconds(100)), 10_000);

        sw.start(t0 + Duration::seconds(100));
        assert_eq!(sw.elapsed_ms(t0 + Duration::seconds(102)), 12_000);
    }

    #[test]
    fn test_start_twice_keeps_first_anchor() {
        let t0 = Utc::now();
        let mut sw = Stopwatch::new();
        sw.start(t0);
        sw.start(t0 + Duration::seconds(3));
        assert_eq!(sw.elapsed_ms(t0 + Duration::seconds(4)), 4000);
    }

    #[test]
    fn test_clock_going_backwards() {
        let t0 = Utc::now();
        let mut sw = Stopwatch::new();
        sw.start(t0);
        assert_eq!(sw.elapsed_ms(t0 - Duration::seconds(1)), 0);
    }

    #[test]
    fn test_reset() {
        let t0 = Utc::now();
        let mut sw = Stopwatch::new();
        sw.start(t0);
        sw.pause(t0 + Duration::seconds(1));
        sw.reset();
        assert_eq!(sw, Stopwatch::default());
    }
}
