//! Session orchestration: the tracker, its sampling loop and control input.

pub mod control;
pub mod runner;
pub mod source;
pub mod state;
pub mod tracker;

pub use control::ControlCommand;
pub use runner::{Sampler, SamplerHandle, TickOutcome};
pub use source::{FrameSource, ImageDirSource};
pub use state::TrackerState;
pub use tracker::{Ingest, ProgressView, Tracker, TrackerSettings};
