//! Playback-related type definitions
//!
//! Supporting types for session playback state and track lifecycle.

use serde::{Deserialize, Serialize};

/// Playback state of one session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Nothing playing; initial state
    #[default]
    Idle,
    Playing,
    Paused,
    /// Engine is shutting down and waiting for its worker to stop
    Stopping,
}

impl PlaybackState {
    /// True while a track is current (`Playing` or `Paused`)
    pub fn has_current_track(&self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Why a track stopped producing audio
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum TrackEndReason {
    /// Source ran out of audio
    Finished,
    /// Worker was cancelled (skip, stop, shutdown)
    Cancelled,
    /// Resolve, read, encode or sink failure
    Failed,
}

impl std::fmt::Display for TrackEndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackEndReason::Finished => write!(f, "Finished"),
            TrackEndReason::Cancelled => write!(f, "Cancelled"),
            TrackEndReason::Failed => write!(f, "Failed"),
        }
    }
}
