/// Measurement state of a tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerState {
    /// Never started, or reset
    #[default]
    Idle,
    /// Stopwatch running, accepted samples accumulate
    Running,
    /// Stopwatch stopped, samples are displayed only
    Paused,
}

impl std::fmt::Display for TrackerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerState::Idle => write!(f, "Idle"),
            TrackerState::Running => write!(f, "Running"),
            TrackerState::Paused => write!(f, "Paused"),
        }
    }
}
