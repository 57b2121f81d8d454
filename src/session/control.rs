//! Out-of-band control commands (hotkey bridge messages).
//!
//! Accepted wire forms: a bare word (`ping`, `toggle`, `reset`) or a JSON
//! object `{"type":"toggle"}`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlCommand {
    /// Start/resume when idle or paused, pause when running
    Toggle,
    /// Clear the session
    Reset,
    /// Liveness check, answered with `pong`
    Ping,
}

impl ControlCommand {
    /// Parses one message. Unknown input is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let text = raw.trim();
        if text.starts_with('{') {
            return serde_json::from_str(text).ok();
        }
        match text.to_ascii_lowercase().as_str() {
            "toggle" => Some(ControlCommand::Toggle),
            "reset" => Some(ControlCommand::Reset),
            "ping" => Some(ControlCommand::Ping),
            _ => None,
        }
    }
}
