//! Output sink abstraction
//!
//! A sink accepts encoded frames at playback cadence. It reports backpressure as
//! `SinkError::Full` (the worker drops that frame and keeps going) and permanent loss of the
//! transport as `SinkError::Unavailable` (the session stops).

use crate::audio::types::EncodedFrame;
use crate::error::Result;
use crate::playback::types::SessionKey;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Why a sink refused a frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Sink cannot take the frame right now
    #[error("sink is full")]
    Full,

    /// Sink is gone for good
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for encoded frames of one session
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn send(&self, frame: EncodedFrame) -> std::result::Result<(), SinkError>;
}

/// Opens the per-session sink when an engine is created
#[async_trait]
pub trait SinkProvider: Send + Sync {
    async fn open(&self, key: &SessionKey) -> Result<Arc<dyn OutputSink>>;
}

/// In-process sink backed by a bounded channel
///
/// The receiving half is handed to whatever drives the actual transport.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<EncodedFrame>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EncodedFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl OutputSink for ChannelSink {
    async fn send(&self, frame: EncodedFrame) -> std::result::Result<(), SinkError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => {
                SinkError::Unavailable("frame receiver dropped".to_string())
            }
        })
    }
}

/// Creates a `ChannelSink` per session and keeps the receivers for pickup
#[derive(Debug)]
pub struct ChannelSinkProvider {
    capacity: usize,
    receivers: Mutex<HashMap<SessionKey, mpsc::Receiver<EncodedFrame>>>,
}

impl ChannelSinkProvider {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            receivers: Mutex::new(HashMap::new()),
        }
    }

    /// Take the frame receiver of the most recently opened sink for `key`
    pub fn take_receiver(&self, key: &SessionKey) -> Option<mpsc::Receiver<EncodedFrame>> {
        self.receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }
}

#[async_trait]
impl SinkProvider for ChannelSinkProvider {
    async fn open(&self, key: &SessionKey) -> Result<Arc<dyn OutputSink>> {
        let (sink, rx) = ChannelSink::new(self.capacity);
        let replaced = self
            .receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), rx);

        if replaced.is_some() {
            debug!(session = %key, "Replacing unclaimed channel sink receiver");
        }
        Ok(Arc::new(sink))
    }
}
