//! EXP pace tracker.
//!
//! Reads a level number and a bracketed experience string from captured
//! game frames, rejects implausible reads, accumulates level-aware progress
//! and derives pace series, with versioned save/restore of the session.

pub mod config;
pub mod logging;
pub mod ocr;
pub mod paths;
pub mod progress;
pub mod session;
pub mod snapshot;
