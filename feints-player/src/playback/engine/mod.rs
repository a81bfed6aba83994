//! Playback engine: one actor per session
//!
//! **Module Structure:**
//! - `core.rs`: public handle, actor loop, worker lifecycle, event emission
//! - `commands.rs`: state-machine transitions for each control command
//!
//! All state is owned by the actor task and only changed while it handles a mailbox message.
//! Workers report back through the same mailbox, so every transition is totally ordered.

mod commands;
mod core;

pub use self::core::PlaybackEngine;
