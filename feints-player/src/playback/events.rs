//! Messages exchanged between the engine actor and its stream workers

use crate::error::TrackError;
use crate::playback::types::{Command, Track};
use feints_common::events::TrackEndReason;
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;

/// Identifies one stream worker within an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// How a worker's track ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Finished,
    Cancelled,
    Failed(TrackError),
}

impl TrackOutcome {
    pub fn reason(&self) -> TrackEndReason {
        match self {
            TrackOutcome::Finished => TrackEndReason::Finished,
            TrackOutcome::Cancelled => TrackEndReason::Cancelled,
            TrackOutcome::Failed(_) => TrackEndReason::Failed,
        }
    }
}

/// Final report of a worker, sent once after its source is torn down
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub worker_id: WorkerId,
    pub track: Track,
    pub outcome: TrackOutcome,
    pub frames_sent: u64,
    pub frames_dropped: u64,
}

/// Everything the engine actor's mailbox carries
#[derive(Debug)]
pub(crate) enum EngineMessage {
    /// External control command
    Command(Command),
    /// A worker finished (naturally, cancelled or failed)
    WorkerFinished(WorkerReport),
    /// Exit if quiescent for at least `idle_for`; replies whether the engine exited
    Retire {
        idle_for: Duration,
        reply: oneshot::Sender<bool>,
    },
    /// Cancel everything and exit once the worker is gone
    Shutdown,
}
