//! Shared payload types carried inside events

use serde::{Deserialize, Serialize};

/// Serializable description of a track
///
/// Used in events and HTTP responses, so it carries only display data and the locator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackInfo {
    /// Opaque source reference (path or URL)
    pub locator: String,
    /// Display title
    pub title: String,
    /// Known duration in milliseconds, if any
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration_ms: Option<u64>,
}
