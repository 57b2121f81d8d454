//! Versioned snapshot encoding.
//!
//! Encoding always writes the current schema. Decoding is total: every
//! input, including garbage, yields a valid current-version `Snapshot`.
//! Each sub-object is normalized on its own, so one malformed field only
//! loses that field. Older schema versions are mapped forward field by field.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::progress::{AccumulatorState, HistoryPoint, OutlierReason, Sample, Stopwatch};

pub const CURRENT_VERSION: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeState {
    pub has_started: bool,
}

/// Full measurement state at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub captured_at: DateTime<Utc>,
    pub runtime: RuntimeState,
    pub stopwatch: Stopwatch,
    pub accumulator: AccumulatorState,
    pub history: Vec<HistoryPoint>,
}

impl Snapshot {
    /// The fallback for unreadable or unknown input.
    pub fn empty() -> Self {
        Self {
            version: CURRENT_VERSION,
            captured_at: DateTime::<Utc>::default(),
            runtime: RuntimeState::default(),
            stopwatch: Stopwatch::default(),
            accumulator: AccumulatorState::default(),
            history: Vec::new(),
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Serializes a snapshot in the current schema.
pub fn encode(snapshot: &Snapshot) -> Result<String> {
    serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")
}

/// Parses any snapshot document into the current schema. Never fails.
pub fn decode(text: &str) -> Snapshot {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => normalize(&value),
        Err(e) => {
            log::warn!("Snapshot is not valid JSON ({}), using empty snapshot", e);
            Snapshot::empty()
        }
    }
}

/// Normalizes a parsed document of any known version.
///
/// A missing version tag is read as the untagged legacy v1 layout.
pub fn normalize(value: &Value) -> Snapshot {
    let Some(obj) = value.as_object() else {
        log::warn!("Snapshot root is not an object, using empty snapshot");
        return Snapshot::empty();
    };

    match obj.get("version").map(as_u64) {
        None => from_v1(obj),
        Some(Some(1)) => from_v1(obj),
        Some(Some(2)) => from_v2(obj),
        Some(Some(3)) => from_v3(obj),
        Some(other) => {
            log::warn!("Unknown snapshot version {:?}, using empty snapshot", other);
            Snapshot::empty()
        }
    }
}

/// v1: flat totals, tuple history `[t, value, percent, elapsed]`.
fn from_v1(obj: &Map<String, Value>) -> Snapshot {
    let captured_at = timestamp(obj.get("savedAt")).unwrap_or_default();
    let elapsed_ms = u64_field(obj, "elapsedMs");
    let running = bool_field(obj, "running");

    let history: Vec<HistoryPoint> = array_field(obj, "history")
        .iter()
        .filter_map(|entry| {
            let t = entry.as_array()?;
            let at = |i: usize| t.get(i);
            Some(HistoryPoint {
                timestamp: timestamp(at(0)).unwrap_or(captured_at),
                cum_exp_value: at(1).map(as_f64).unwrap_or(0.0),
                cum_exp_percent: at(2).map(as_f64).unwrap_or(0.0),
                elapsed_at_ms: at(3).and_then(as_u64).unwrap_or(0),
            })
        })
        .collect();

    Snapshot {
        version: CURRENT_VERSION,
        captured_at,
        runtime: RuntimeState {
            has_started: elapsed_ms > 0 || !history.is_empty(),
        },
        stopwatch: Stopwatch {
            accumulated_ms: elapsed_ms,
            running_since: running.then_some(captured_at),
        },
        accumulator: AccumulatorState {
            cum_exp_percent: f64_field(obj, "cumPct"),
            cum_exp_value: f64_field(obj, "cumExp"),
            last_accepted: None,
        },
        history,
    }
}

/// v2: nested stopwatch and totals, short-keyed history objects.
fn from_v2(obj: &Map<String, Value>) -> Snapshot {
    let captured_at = timestamp(obj.get("capturedAt")).unwrap_or_default();
    let empty = Map::new();
    let sw = obj.get("stopwatch").and_then(Value::as_object).unwrap_or(&empty);
    let totals = obj.get("totals").and_then(Value::as_object).unwrap_or(&empty);

    let running = bool_field(sw, "running");
    let started_at = timestamp(sw.get("startedAt"));

    let history = array_field(obj, "history")
        .iter()
        .filter_map(Value::as_object)
        .map(|p| HistoryPoint {
            timestamp: timestamp(p.get("t")).unwrap_or(captured_at),
            cum_exp_value: f64_field(p, "v"),
            cum_exp_percent: f64_field(p, "p"),
            elapsed_at_ms: u64_field(p, "e"),
        })
        .collect();

    Snapshot {
        version: CURRENT_VERSION,
        captured_at,
        runtime: RuntimeState {
            has_started: bool_field(obj, "hasStarted"),
        },
        stopwatch: Stopwatch {
            accumulated_ms: u64_field(sw, "elapsedMs"),
            running_since: if running { started_at.or(Some(captured_at)) } else { None },
        },
        accumulator: AccumulatorState {
            cum_exp_percent: f64_field(totals, "expPercent"),
            cum_exp_value: f64_field(totals, "expValue"),
            last_accepted: obj.get("lastSample").and_then(|s| sample(s, captured_at)),
        },
        history,
    }
}

/// v3: the current layout, still normalized field by field.
fn from_v3(obj: &Map<String, Value>) -> Snapshot {
    let captured_at = timestamp(obj.get("capturedAt")).unwrap_or_default();
    let empty = Map::new();
    let runtime = obj.get("runtime").and_then(Value::as_object).unwrap_or(&empty);
    let sw = obj.get("stopwatch").and_then(Value::as_object).unwrap_or(&empty);
    let acc = obj.get("accumulator").and_then(Value::as_object).unwrap_or(&empty);

    let history = array_field(obj, "history")
        .iter()
        .filter_map(Value::as_object)
        .map(|p| HistoryPoint {
            timestamp: timestamp(p.get("timestamp")).unwrap_or(captured_at),
            cum_exp_value: f64_field(p, "cumExpValue"),
            cum_exp_percent: f64_field(p, "cumExpPercent"),
            elapsed_at_ms: u64_field(p, "elapsedAtMs"),
        })
        .collect();

    Snapshot {
        version: CURRENT_VERSION,
        captured_at,
        runtime: RuntimeState {
            has_started: bool_field(runtime, "hasStarted"),
        },
        stopwatch: Stopwatch {
            accumulated_ms: u64_field(sw, "accumulatedMs"),
            running_since: timestamp(sw.get("runningSince")),
        },
        accumulator: AccumulatorState {
            cum_exp_percent: f64_field(acc, "cumExpPercent"),
            cum_exp_value: f64_field(acc, "cumExpValue"),
            last_accepted: acc.get("lastAccepted").and_then(|s| sample(s, captured_at)),
        },
        history,
    }
}

/// Normalizes a stored sample. Only complete, non-outlier samples are worth
/// restoring as the accumulator's reference point.
fn sample(value: &Value, fallback_ts: DateTime<Utc>) -> Option<Sample> {
    let obj = value.as_object()?;
    let level = obj.get("level").and_then(as_u64).and_then(|l| u32::try_from(l).ok());
    let exp_percent = obj.get("expPercent").and_then(as_f64_opt);
    let exp_value = obj.get("expValue").and_then(as_f64_opt).map(|v| v as i64);
    let is_outlier = bool_field(obj, "isOutlier");
    let reason = obj
        .get("outlierReason")
        .and_then(Value::as_str)
        .and_then(|r| match r {
            "pct_value_mismatch" => Some(OutlierReason::PctValueMismatch),
            "level_jump" => Some(OutlierReason::LevelJump),
            "implausible_drop" => Some(OutlierReason::ImplausibleDrop),
            _ => None,
        });

    let (level, exp_percent, exp_value) = (level?, exp_percent?, exp_value?);
    if is_outlier || reason.is_some() {
        return None;
    }

    Some(Sample::accepted(
        timestamp(obj.get("timestamp")).unwrap_or(fallback_ts),
        level,
        exp_percent,
        exp_value,
    ))
}

fn array_field<'a>(obj: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    obj.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn f64_field(obj: &Map<String, Value>, key: &str) -> f64 {
    obj.get(key).map(as_f64).unwrap_or(0.0)
}

fn u64_field(obj: &Map<String, Value>, key: &str) -> u64 {
    obj.get(key).and_then(as_u64).unwrap_or(0)
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Finite number (or numeric string), else zero.
fn as_f64(value: &Value) -> f64 {
    as_f64_opt(value).unwrap_or(0.0)
}

fn as_f64_opt(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Non-negative integer; fractional values are truncated.
fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// Epoch milliseconds or an RFC 3339 string.
fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .and_then(DateTime::from_timestamp_millis),
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}
