//! # Feints Common Library
//!
//! Shared code for the feints playback service and its tooling:
//! - Error types
//! - Event types (`FeintsEvent`) and the `EventBus`
//! - Configuration file resolution and TOML loading

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
