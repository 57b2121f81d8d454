//! Progress measurement: from validated samples to cumulative totals and pace.
//!
//! This module provides:
//! - The level-indexed experience table
//! - Sample validation (outlier rejection)
//! - The level-aware accumulator and its bounded history
//! - The session stopwatch
//! - Derived pace series for charts

pub mod accumulator;
pub mod history;
pub mod pace;
pub mod sample;
pub mod stopwatch;
pub mod table;
pub mod validate;

pub use accumulator::{Accumulator, AccumulatorState, Delta};
pub use history::{History, HistoryLimits, HistoryPoint};
pub use pace::{PaceParams, PaceSeries, SeriesPoint};
pub use sample::{OutlierReason, Reading, Sample};
pub use stopwatch::Stopwatch;
pub use table::ExpTable;
pub use validate::{validate, ValidationPolicy};
