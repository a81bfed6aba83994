//! Engine handle, actor loop and worker lifecycle

use crate::error::{Error, Result};
use crate::playback::events::{EngineMessage, TrackOutcome, WorkerId, WorkerReport};
use crate::playback::queue::SongQueue;
use crate::playback::types::{Command, PlaybackSnapshot, SessionKey, Track};
use crate::playback::worker::{panic_message, StreamWorker, WorkerContext, WorkerHandle};
use feints_common::events::{
    EventBus, FeintsEvent, PlaybackState, QueueChangeTrigger, TrackEndReason,
};
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Extra time on top of the teardown grace a shutdown waits for the actor to exit
const SHUTDOWN_MARGIN: Duration = Duration::from_secs(1);

/// Handle to a session's playback actor
///
/// Cheap to clone. Commands are acknowledged as soon as they are in the mailbox; their effect
/// is observable through `query` or the event bus.
#[derive(Clone, Debug)]
pub struct PlaybackEngine {
    id: Uuid,
    key: SessionKey,
    tx: mpsc::UnboundedSender<EngineMessage>,
    shutdown_timeout: Duration,
}

impl PlaybackEngine {
    /// Spawn the actor for `key` on the current tokio runtime
    pub fn spawn(key: SessionKey, ctx: WorkerContext, events: Arc<EventBus>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let shutdown_timeout = ctx.settings.teardown_grace + SHUTDOWN_MARGIN;

        let actor = EngineActor::new(key.clone(), ctx, events, tx.downgrade());
        tokio::spawn(actor.run(rx));
        info!(session = %key, engine_id = %id, "Playback engine started");

        Self {
            id,
            key,
            tx,
            shutdown_timeout,
        }
    }

    /// Unique id of this engine instance (a recreated engine for the same key gets a new one)
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// True once the actor has exited
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Put a command in the mailbox
    pub fn submit(&self, command: Command) -> Result<()> {
        self.send(EngineMessage::Command(command))
    }

    pub fn enqueue(&self, track: Track) -> Result<()> {
        self.submit(Command::Enqueue(track))
    }

    pub fn play(&self) -> Result<()> {
        self.submit(Command::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.submit(Command::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.submit(Command::Resume)
    }

    pub fn skip(&self) -> Result<()> {
        self.submit(Command::Skip)
    }

    pub fn stop(&self) -> Result<()> {
        self.submit(Command::Stop)
    }

    pub fn clear(&self) -> Result<()> {
        self.submit(Command::Clear)
    }

    /// Snapshot of state, current track and queue, taken in mailbox order
    pub async fn query(&self) -> Result<PlaybackSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Query(reply))?;
        rx.await.map_err(|_| self.closed_error())
    }

    /// Ask the actor to exit if it has been quiescent for `idle_for`
    ///
    /// Returns true if the actor is gone afterwards.
    pub(crate) async fn retire_if_idle(&self, idle_for: Duration) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.send(EngineMessage::Retire { idle_for, reply }).is_err() {
            return true;
        }
        rx.await.unwrap_or(true)
    }

    /// Cancel playback and wait (bounded) for the actor to exit
    pub async fn shutdown(&self) {
        if self.send(EngineMessage::Shutdown).is_err() {
            return;
        }

        if tokio::time::timeout(self.shutdown_timeout, self.tx.closed())
            .await
            .is_err()
        {
            warn!(session = %self.key, "Engine did not stop within {:?}", self.shutdown_timeout);
        }
    }

    fn send(&self, message: EngineMessage) -> Result<()> {
        self.tx.send(message).map_err(|_| self.closed_error())
    }

    fn closed_error(&self) -> Error {
        Error::EngineClosed(self.key.to_string())
    }
}

/// Actor-owned session state
pub(super) struct EngineActor {
    pub(super) key: SessionKey,
    pub(super) state: PlaybackState,
    pub(super) current: Option<Track>,
    pub(super) queue: SongQueue,
    /// Worker streaming `current`
    pub(super) active: Option<WorkerHandle>,
    /// Cancelled worker whose report has not arrived yet
    ///
    /// At most one of `active` and `retiring` is set: a new worker only starts after the
    /// previous one confirmed teardown.
    pub(super) retiring: Option<WorkerHandle>,
    next_worker_id: u64,
    last_activity: Instant,
    pub(super) shutting_down: bool,
    ctx: WorkerContext,
    events: Arc<EventBus>,
    mailbox: mpsc::WeakUnboundedSender<EngineMessage>,
}

impl EngineActor {
    fn new(
        key: SessionKey,
        ctx: WorkerContext,
        events: Arc<EventBus>,
        mailbox: mpsc::WeakUnboundedSender<EngineMessage>,
    ) -> Self {
        Self {
            key,
            state: PlaybackState::Idle,
            current: None,
            queue: SongQueue::new(),
            active: None,
            retiring: None,
            next_worker_id: 0,
            last_activity: Instant::now(),
            shutting_down: false,
            ctx,
            events,
            mailbox,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<EngineMessage>) {
        while let Some(message) = rx.recv().await {
            let handled =
                std::panic::catch_unwind(AssertUnwindSafe(|| self.handle_message(message)));
            let flow = match handled {
                Ok(flow) => flow,
                Err(panic) => {
                    error!(
                        session = %self.key,
                        "Engine handler panicked: {}",
                        panic_message(panic.as_ref())
                    );
                    self.repair_after_panic();
                    ControlFlow::Continue(())
                }
            };

            if flow.is_break() {
                break;
            }
        }

        // Mailbox closed or retired: nothing may keep playing for this session
        self.cancel_workers();
        rx.close();

        self.events.emit_lossy(FeintsEvent::SessionClosed {
            session: self.key.to_string(),
            timestamp: chrono::Utc::now(),
        });
        info!(session = %self.key, "Playback engine stopped");
    }

    fn handle_message(&mut self, message: EngineMessage) -> ControlFlow<()> {
        match message {
            EngineMessage::Command(Command::Query(reply)) => {
                let _ = reply.send(self.snapshot());
            }
            EngineMessage::Command(command) => {
                self.last_activity = Instant::now();
                if self.shutting_down {
                    debug!(
                        session = %self.key,
                        command = command.name(),
                        "Ignoring command during shutdown"
                    );
                } else {
                    self.handle_command(command);
                }
            }
            EngineMessage::WorkerFinished(report) => {
                self.last_activity = Instant::now();
                self.on_worker_finished(report);
            }
            EngineMessage::Retire { idle_for, reply } => {
                let quiescent = self.is_quiescent(idle_for);
                let _ = reply.send(quiescent);
                if quiescent {
                    info!(session = %self.key, "Retiring idle engine");
                    return ControlFlow::Break(());
                }
            }
            EngineMessage::Shutdown => self.begin_shutdown(),
        }

        if self.shutting_down && self.active.is_none() && self.retiring.is_none() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    pub(super) fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            session: self.key.clone(),
            state: self.state,
            current: self.current.clone(),
            queue: self.queue.list(),
        }
    }

    fn is_quiescent(&self, idle_for: Duration) -> bool {
        self.state == PlaybackState::Idle
            && self.queue.is_empty()
            && self.active.is_none()
            && self.retiring.is_none()
            && self.last_activity.elapsed() >= idle_for
    }

    fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        info!(session = %self.key, "Shutting down playback engine");
        self.shutting_down = true;

        self.drop_unstarted_current();
        self.retire_active();
        self.queue.clear();
        self.current = None;
        self.set_state(PlaybackState::Stopping);
    }

    /// Restore `current`/`state`/worker consistency after a handler panicked midway
    fn repair_after_panic(&mut self) {
        if self.current.is_none() && self.state.has_current_track() {
            self.set_state(PlaybackState::Idle);
        } else if self.current.is_some() && !self.state.has_current_track() {
            self.current = None;
        } else if self.current.is_some()
            && self.active.is_none()
            && self.retiring.is_none()
            && !self.shutting_down
        {
            // No worker and none pending: without one the session would never advance
            warn!(session = %self.key, "Current track has no worker, restarting it");
            let restarted = std::panic::catch_unwind(AssertUnwindSafe(|| self.start_worker()));
            if restarted.is_err() || self.active.is_none() {
                error!(session = %self.key, "Could not restart worker, going idle");
                self.drop_unstarted_current();
                self.set_state(PlaybackState::Idle);
            }
        }
    }

    // ========================================================================
    // Worker lifecycle
    // ========================================================================

    /// Make `track` current in `state` and start (or schedule) its worker
    pub(super) fn begin(&mut self, track: Track, state: PlaybackState) {
        info!(session = %self.key, track = %track, "Starting track");
        self.current = Some(track.clone());
        self.set_state(state);
        self.events.emit_lossy(FeintsEvent::TrackStarted {
            session: self.key.to_string(),
            track: track.info(),
            timestamp: chrono::Utc::now(),
        });

        if self.retiring.is_none() {
            self.start_worker();
        } else {
            debug!(session = %self.key, "Deferring worker start until previous worker stops");
        }
    }

    fn start_worker(&mut self) {
        let Some(track) = self.current.clone() else {
            return;
        };

        let id = WorkerId(self.next_worker_id);
        self.next_worker_id += 1;

        let mailbox = self.mailbox.clone();
        let handle = StreamWorker::spawn(
            id,
            track,
            self.ctx.clone(),
            self.state == PlaybackState::Paused,
            move |report| {
                if let Some(tx) = mailbox.upgrade() {
                    let _ = tx.send(EngineMessage::WorkerFinished(report));
                }
            },
        );

        debug!(session = %self.key, worker_id = %id, "Stream worker spawned");
        self.active = Some(handle);
    }

    /// Cancel the active worker and park it until its report confirms teardown
    pub(super) fn retire_active(&mut self) {
        if let Some(handle) = self.active.take() {
            debug!(session = %self.key, worker_id = %handle.id(), "Cancelling stream worker");
            handle.cancel();
            if let Some(previous) = self.retiring.replace(handle) {
                // Unreachable while the single-worker rule holds; keep the newer handle
                warn!(
                    session = %self.key,
                    worker_id = %previous.id(),
                    "Two workers retiring at once"
                );
                previous.cancel();
            }
        }
    }

    /// Report a current track whose worker never started as cancelled
    pub(super) fn drop_unstarted_current(&mut self) {
        if self.active.is_some() {
            return;
        }
        if let Some(track) = self.current.take() {
            self.emit_track_ended(&track, TrackEndReason::Cancelled, None, 0);
        }
    }

    fn cancel_workers(&mut self) {
        for handle in [self.active.take(), self.retiring.take()].into_iter().flatten() {
            handle.cancel();
        }
    }

    fn on_worker_finished(&mut self, report: WorkerReport) {
        let id = report.worker_id;
        let detail = match &report.outcome {
            TrackOutcome::Failed(err) => Some(err.to_string()),
            _ => None,
        };

        if self.retiring.as_ref().map(WorkerHandle::id) == Some(id) {
            self.retiring = None;
            self.emit_track_ended(
                &report.track,
                report.outcome.reason(),
                detail,
                report.frames_sent,
            );

            if self.current.is_some() && self.active.is_none() && !self.shutting_down {
                self.start_worker();
            }
            return;
        }

        if self.active.as_ref().map(WorkerHandle::id) != Some(id) {
            debug!(session = %self.key, worker_id = %id, "Ignoring stale worker report");
            return;
        }

        self.active = None;
        self.emit_track_ended(
            &report.track,
            report.outcome.reason(),
            detail,
            report.frames_sent,
        );

        match report.outcome {
            TrackOutcome::Failed(err) if err.is_session_fatal() => {
                self.fail_session(err.to_string())
            }
            TrackOutcome::Failed(err) => {
                warn!(session = %self.key, track = %report.track, "Skipping failed track: {}", err);
                self.advance();
            }
            TrackOutcome::Finished | TrackOutcome::Cancelled => self.advance(),
        }
    }

    /// Move to the next queued track after the current one ended on its own
    ///
    /// A paused session stays paused on the next track.
    fn advance(&mut self) {
        match self.queue.pop() {
            Some(next) => {
                self.emit_queue_changed(QueueChangeTrigger::Advance);
                let state = if self.state == PlaybackState::Paused {
                    PlaybackState::Paused
                } else {
                    PlaybackState::Playing
                };
                self.begin(next, state);
            }
            None => {
                self.current = None;
                self.set_state(PlaybackState::Idle);
            }
        }
    }

    fn fail_session(&mut self, reason: String) {
        error!(session = %self.key, "Session output failed: {}", reason);

        if self.queue.clear() > 0 {
            self.emit_queue_changed(QueueChangeTrigger::SessionFailed);
        }
        self.current = None;
        self.set_state(PlaybackState::Idle);

        self.events.emit_lossy(FeintsEvent::SessionFailed {
            session: self.key.to_string(),
            reason,
            timestamp: chrono::Utc::now(),
        });
    }

    // ========================================================================
    // Event emission
    // ========================================================================

    pub(super) fn set_state(&mut self, new_state: PlaybackState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }
        self.state = new_state;

        info!(session = %self.key, "Playback state {} -> {}", old_state, new_state);
        self.events.emit_lossy(FeintsEvent::PlaybackStateChanged {
            session: self.key.to_string(),
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        });
    }

    pub(super) fn emit_queue_changed(&self, trigger: QueueChangeTrigger) {
        self.events.emit_lossy(FeintsEvent::QueueChanged {
            session: self.key.to_string(),
            queue: self.queue.list().iter().map(Track::info).collect(),
            trigger,
            timestamp: chrono::Utc::now(),
        });
    }

    fn emit_track_ended(
        &self,
        track: &Track,
        reason: TrackEndReason,
        detail: Option<String>,
        frames_sent: u64,
    ) {
        self.events.emit_lossy(FeintsEvent::TrackEnded {
            session: self.key.to_string(),
            track: track.info(),
            reason,
            detail,
            frames_sent,
            timestamp: chrono::Utc::now(),
        });
    }
}
