//! Playback domain types: tracks, session keys, commands and snapshots

use crate::error::{Error, Result};
use feints_common::events::{PlaybackState, TrackInfo};
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;

/// A playable item
///
/// Immutable once constructed. The locator is opaque to the engine and only interpreted by
/// the `SourceResolver`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    locator: String,
    title: String,
    duration: Option<Duration>,
}

impl Track {
    /// Create a track; the locator is trimmed and must not be empty
    ///
    /// A blank title falls back to the locator.
    pub fn new(locator: impl Into<String>, title: impl Into<String>) -> Result<Self> {
        let locator = locator.into().trim().to_string();
        if locator.is_empty() {
            return Err(Error::InvalidTrack("locator must not be empty".to_string()));
        }

        let title = title.into().trim().to_string();
        let title = if title.is_empty() { locator.clone() } else { title };

        Ok(Self {
            locator,
            title,
            duration: None,
        })
    }

    /// Attach a known duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Serializable view for events and API responses
    pub fn info(&self) -> TrackInfo {
        TrackInfo {
            locator: self.locator.clone(),
            title: self.title.clone(),
            duration_ms: self.duration.map(|d| d.as_millis() as u64),
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

/// Identifies one playback session (e.g. `guild:channel`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return Err(Error::InvalidSessionKey("session key must not be empty".to_string()));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Control command accepted by a `PlaybackEngine`
#[derive(Debug)]
pub enum Command {
    /// Append a track; auto-starts playback when idle
    Enqueue(Track),
    /// Start playback from the queue when idle
    Play,
    Pause,
    Resume,
    /// Stop playback and clear the queue
    Stop,
    /// Abandon the current track and move to the next one
    Skip,
    /// Empty the queue without touching playback
    Clear,
    /// Request a snapshot of the session
    Query(oneshot::Sender<PlaybackSnapshot>),
}

impl Command {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Command::Enqueue(_) => "enqueue",
            Command::Play => "play",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Stop => "stop",
            Command::Skip => "skip",
            Command::Clear => "clear",
            Command::Query(_) => "query",
        }
    }
}

/// Point-in-time copy of a session's observable state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub session: SessionKey,
    pub state: PlaybackState,
    pub current: Option<Track>,
    pub queue: Vec<Track>,
}
