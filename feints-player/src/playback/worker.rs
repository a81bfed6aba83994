//! Stream worker: one track, from source to sink, in real time
//!
//! A worker resolves its track, then loops: wait while paused, wait for the next 20 ms tick,
//! read one frame of PCM, encode it, hand it to the sink. A pause that arrives while a frame
//! is being read holds that frame back until resume. Cancellation is observed at every
//! await point. The source is always torn down before the single completion report is
//! delivered, so the engine can treat the report as proof that the worker is gone.

use crate::audio::encoder::{EncoderFactory, FrameEncoder};
use crate::audio::sink::{OutputSink, SinkError};
use crate::audio::source::{PcmReader, ResolvedSource, SourceResolver};
use crate::audio::types::{
    frames_to_duration, samples_from_le_bytes, EncodedFrame, FRAME_BYTES, FRAME_DURATION,
    FRAME_SAMPLES_INTERLEAVED,
};
use crate::config::EngineConfig;
use crate::error::TrackError;
use crate::playback::events::{TrackOutcome, WorkerId, WorkerReport};
use crate::playback::types::Track;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Timing knobs for stream workers
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// A sink send slower than this drops the frame
    pub sink_send_timeout: Duration,
    /// Upper bound on source teardown
    pub teardown_grace: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for WorkerSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            sink_send_timeout: config.sink_send_timeout(),
            teardown_grace: config.teardown_grace(),
        }
    }
}

/// Collaborators shared by every worker of one session
#[derive(Clone)]
pub struct WorkerContext {
    pub resolver: Arc<dyn SourceResolver>,
    pub encoder_factory: Arc<dyn EncoderFactory>,
    pub sink: Arc<dyn OutputSink>,
    pub settings: WorkerSettings,
}

/// Control handle for a running worker
#[derive(Debug)]
pub struct WorkerHandle {
    id: WorkerId,
    cancel: CancellationToken,
    pause_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Stop emitting frames; the source stays open at its current position
    pub fn pause(&self) {
        self.pause_tx.send_replace(true);
    }

    /// Continue from the first unread frame
    pub fn resume(&self) {
        self.pause_tx.send_replace(false);
    }

    /// Request cancellation; returns immediately
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True once the worker task has exited (report already delivered)
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Outcome of handing one frame to the sink
enum Delivery {
    Sent,
    Dropped,
    Cancelled,
    Unavailable(String),
}

/// Per-track streaming task
pub struct StreamWorker {
    id: WorkerId,
    track: Track,
    ctx: WorkerContext,
    cancel: CancellationToken,
    paused: watch::Receiver<bool>,
    frames_sent: u64,
    frames_dropped: u64,
}

impl StreamWorker {
    /// Start a worker for `track`
    ///
    /// `on_complete` is called exactly once, from the worker task, after the source has been
    /// torn down.
    pub fn spawn<F>(
        id: WorkerId,
        track: Track,
        ctx: WorkerContext,
        start_paused: bool,
        on_complete: F,
    ) -> WorkerHandle
    where
        F: FnOnce(WorkerReport) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (pause_tx, paused) = watch::channel(start_paused);
        let fallback_track = track.clone();

        let worker = StreamWorker {
            id,
            track,
            ctx,
            cancel: cancel.clone(),
            paused,
            frames_sent: 0,
            frames_dropped: 0,
        };

        let join = tokio::spawn(async move {
            let report = match AssertUnwindSafe(worker.run()).catch_unwind().await {
                Ok(report) => report,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    warn!(worker_id = %id, "Stream worker panicked: {}", message);
                    WorkerReport {
                        worker_id: id,
                        track: fallback_track,
                        outcome: TrackOutcome::Failed(TrackError::SourceRead(format!(
                            "stream worker panicked: {}",
                            message
                        ))),
                        frames_sent: 0,
                        frames_dropped: 0,
                    }
                }
            };
            on_complete(report);
        });

        WorkerHandle {
            id,
            cancel,
            pause_tx,
            join,
        }
    }

    async fn run(mut self) -> WorkerReport {
        debug!(worker_id = %self.id, track = %self.track, "Stream worker started");

        let outcome = self.play().await;

        match &outcome {
            TrackOutcome::Failed(err) => warn!(
                worker_id = %self.id,
                track = %self.track,
                frames_sent = self.frames_sent,
                "Track failed: {}",
                err
            ),
            _ => info!(
                worker_id = %self.id,
                track = %self.track,
                frames_sent = self.frames_sent,
                frames_dropped = self.frames_dropped,
                played = ?frames_to_duration(self.frames_sent),
                "Track ended: {:?}",
                outcome.reason()
            ),
        }

        WorkerReport {
            worker_id: self.id,
            track: self.track,
            outcome,
            frames_sent: self.frames_sent,
            frames_dropped: self.frames_dropped,
        }
    }

    async fn play(&mut self) -> TrackOutcome {
        let resolved = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return TrackOutcome::Cancelled,
            resolved = self.ctx.resolver.resolve(&self.track) => resolved,
        };

        let ResolvedSource { mut reader, cleanup } = match resolved {
            Ok(source) => source,
            Err(err) => return TrackOutcome::Failed(err),
        };

        let outcome = self.stream(&mut reader).await;

        drop(reader);
        cleanup.shutdown(self.ctx.settings.teardown_grace).await;
        outcome
    }

    async fn stream(&mut self, reader: &mut PcmReader) -> TrackOutcome {
        let mut encoder: Box<dyn FrameEncoder> = match self.ctx.encoder_factory.create() {
            Ok(encoder) => encoder,
            Err(err) => return TrackOutcome::Failed(err),
        };

        let mut pcm = vec![0u8; FRAME_BYTES];
        let mut samples = Vec::with_capacity(FRAME_SAMPLES_INTERLEAVED);
        let mut pacer = tokio::time::interval(FRAME_DURATION);
        pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut index: u64 = 0;

        loop {
            let paused = *self.paused.borrow();
            if paused && !self.hold_while_paused(&mut pacer, index).await {
                return TrackOutcome::Cancelled;
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return TrackOutcome::Cancelled,
                _ = pacer.tick() => {}
            }

            // Paused while waiting for the tick: nothing was read yet, go back to the gate
            if *self.paused.borrow() {
                continue;
            }

            let filled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return TrackOutcome::Cancelled,
                read = read_frame(reader, &mut pcm) => match read {
                    Ok(filled) => filled,
                    Err(e) => return TrackOutcome::Failed(TrackError::SourceRead(e.to_string())),
                },
            };

            if filled == 0 {
                return TrackOutcome::Finished;
            }

            let last = filled < FRAME_BYTES;
            if last {
                // Pad the trailing partial frame with silence
                pcm[filled..].fill(0);
            }

            samples_from_le_bytes(&pcm, &mut samples);
            let frame = match encoder.encode(index, &samples) {
                Ok(frame) => frame,
                Err(err) => return TrackOutcome::Failed(err),
            };
            index += 1;

            // Paused while the frame was read: keep it for the first tick after resume
            let paused = *self.paused.borrow();
            if paused {
                if !self.hold_while_paused(&mut pacer, frame.index).await {
                    return TrackOutcome::Cancelled;
                }
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return TrackOutcome::Cancelled,
                    _ = pacer.tick() => {}
                }
            }

            match self.deliver(frame).await {
                Delivery::Sent => self.frames_sent += 1,
                Delivery::Dropped => self.frames_dropped += 1,
                Delivery::Cancelled => return TrackOutcome::Cancelled,
                Delivery::Unavailable(reason) => {
                    return TrackOutcome::Failed(TrackError::SinkUnavailable(reason))
                }
            }

            if last {
                return TrackOutcome::Finished;
            }
        }
    }

    /// Park until resumed; returns false if cancelled meanwhile
    async fn hold_while_paused(&mut self, pacer: &mut Interval, frame: u64) -> bool {
        debug!(worker_id = %self.id, frame, "Paused");
        if !self.wait_while_paused().await {
            return false;
        }
        debug!(worker_id = %self.id, frame, "Resumed");
        // Next frame one full period after resume, no catch-up burst
        pacer.reset();
        true
    }

    /// Returns false if cancelled (or the handle vanished) while paused
    async fn wait_while_paused(&mut self) -> bool {
        loop {
            if !*self.paused.borrow_and_update() {
                return true;
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                changed = self.paused.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    async fn deliver(&self, frame: EncodedFrame) -> Delivery {
        if self.cancel.is_cancelled() {
            return Delivery::Cancelled;
        }

        let index = frame.index;
        let send =
            tokio::time::timeout(self.ctx.settings.sink_send_timeout, self.ctx.sink.send(frame));

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Delivery::Cancelled,
            sent = send => match sent {
                Ok(Ok(())) => Delivery::Sent,
                Ok(Err(SinkError::Full)) => {
                    debug!(worker_id = %self.id, frame = index, "Sink full, dropping frame");
                    Delivery::Dropped
                }
                Ok(Err(SinkError::Unavailable(reason))) => Delivery::Unavailable(reason),
                Err(_) => {
                    debug!(
                        worker_id = %self.id,
                        frame = index,
                        "Sink send timed out, dropping frame"
                    );
                    Delivery::Dropped
                }
            },
        }
    }
}

/// Fill `buf` from `reader`; returns bytes read, short only at end of stream
async fn read_frame(reader: &mut PcmReader, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
