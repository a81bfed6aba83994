//! Error types for feints-player
//!
//! `Error` is returned by the public API (engine handles, registry, config).
//! `TrackError` describes why a single track could not be played; it travels inside worker
//! reports and events, so it is `Clone`.

use thiserror::Error;

/// Main error type for feints-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Track rejected at construction (empty locator)
    #[error("Invalid track: {0}")]
    InvalidTrack(String),

    /// Session key rejected (empty)
    #[error("Invalid session key: {0}")]
    InvalidSessionKey(String),

    /// The session's engine has exited and no longer accepts commands
    #[error("Engine closed for session {0}")]
    EngineClosed(String),

    /// Output sink could not be opened for a session
    #[error("Sink error: {0}")]
    Sink(String),

    /// File or socket I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] feints_common::Error),

    /// Track-level failure surfaced through the public API
    #[error(transparent)]
    Track(#[from] TrackError),
}

/// Why one track failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackError {
    /// Source could not be opened or produced no audio
    #[error("Failed to resolve source: {0}")]
    Resolve(String),

    /// Reading decoded PCM from an opened source failed
    #[error("Failed to read source: {0}")]
    SourceRead(String),

    /// Encoder rejected a frame or could not be created
    #[error("Encode error: {0}")]
    Encode(String),

    /// Output sink is gone
    #[error("Sink unavailable: {0}")]
    SinkUnavailable(String),
}

impl TrackError {
    /// True when the failure affects the whole session rather than this one track
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, TrackError::SinkUnavailable(_))
    }
}

/// Convenience Result type using feints-player Error
pub type Result<T> = std::result::Result<T, Error>;
