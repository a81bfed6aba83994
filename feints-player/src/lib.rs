//! # Feints Player Library (feints-player)
//!
//! Per-session audio playback engine.
//!
//! **Purpose:** Keep one ordered queue of tracks per session, stream the current track through
//! ffmpeg and Opus to an output sink in real time, and expose HTTP/SSE control.
//!
//! **Architecture:** One actor task per session (`PlaybackEngine`) owning the state machine,
//! one transient task per playing track (`StreamWorker`), sessions looked up through the
//! `EngineRegistry`.

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod playback;

pub use error::{Error, Result, TrackError};
pub use playback::{EngineRegistry, PlaybackEngine};
