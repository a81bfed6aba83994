//! Queue type definitions

use serde::{Deserialize, Serialize};

/// Why the queue changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum QueueChangeTrigger {
    /// A track was appended
    Enqueue,
    /// The head was taken to start playback (auto-start, play, natural advance)
    Advance,
    /// The head was taken because the current track was skipped
    Skip,
    /// Queue cleared by stop
    Stop,
    /// Queue cleared on request
    Clear,
    /// Queue dropped after the session's output became unavailable
    SessionFailed,
}

impl std::fmt::Display for QueueChangeTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueChangeTrigger::Enqueue => write!(f, "Enqueue"),
            QueueChangeTrigger::Advance => write!(f, "Advance"),
            QueueChangeTrigger::Skip => write!(f, "Skip"),
            QueueChangeTrigger::Stop => write!(f, "Stop"),
            QueueChangeTrigger::Clear => write!(f, "Clear"),
            QueueChangeTrigger::SessionFailed => write!(f, "SessionFailed"),
        }
    }
}
