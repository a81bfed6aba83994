//! Session playback: queue, stream workers, engine actor and the session registry

pub mod engine;
pub mod events;
pub mod queue;
pub mod registry;
pub mod types;
pub mod worker;

pub use engine::PlaybackEngine;
pub use events::{TrackOutcome, WorkerId, WorkerReport};
pub use queue::SongQueue;
pub use registry::EngineRegistry;
pub use types::{Command, PlaybackSnapshot, SessionKey, Track};
pub use worker::{StreamWorker, WorkerContext, WorkerHandle, WorkerSettings};
