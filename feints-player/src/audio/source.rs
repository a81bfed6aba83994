//! Audio source abstraction
//!
//! A `SourceResolver` turns a `Track` into a byte stream of s16le / 48 kHz / stereo PCM plus a
//! cleanup handle. The stream worker owns both for the lifetime of one track and always calls
//! the cleanup handle before reporting completion.

use crate::error::TrackError;
use crate::playback::types::Track;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncRead;

/// Decoded PCM byte stream
pub type PcmReader = Box<dyn AsyncRead + Send + Unpin>;

/// Tears down whatever backs a resolved source (process, connection, file)
#[async_trait]
pub trait SourceCleanup: Send {
    /// Release the source, waiting at most `grace` for it to go away
    async fn shutdown(self: Box<Self>, grace: Duration);
}

/// An opened source: PCM reader plus its teardown handle
pub struct ResolvedSource {
    pub reader: PcmReader,
    pub cleanup: Box<dyn SourceCleanup>,
}

impl ResolvedSource {
    pub fn new(reader: PcmReader, cleanup: Box<dyn SourceCleanup>) -> Self {
        Self { reader, cleanup }
    }
}

/// Opens tracks as PCM sources
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, track: &Track) -> Result<ResolvedSource, TrackError>;
}
