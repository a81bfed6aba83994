//! Event types for the feints event system
//!
//! Provides shared event definitions and the EventBus used by the playback service.

mod playback_types;
mod queue_types;
mod shared_types;

pub use playback_types::{PlaybackState, TrackEndReason};
pub use queue_types::QueueChangeTrigger;
pub use shared_types::TrackInfo;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// feints event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
/// Every variant names the session it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeintsEvent {
    /// Session playback state changed
    PlaybackStateChanged {
        /// Session key
        session: String,
        /// Playback state before change
        old_state: PlaybackState,
        /// Playback state after change
        new_state: PlaybackState,
        /// When state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track became the session's current track
    ///
    /// Emitted when the engine commits to the track, which may be slightly before its
    /// first frame reaches the sink (the previous worker is still tearing down).
    TrackStarted {
        /// Session key
        session: String,
        /// Track that started
        track: TrackInfo,
        /// When the track started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track's worker reported completion
    TrackEnded {
        /// Session key
        session: String,
        /// Track that ended
        track: TrackInfo,
        /// How the track ended
        reason: TrackEndReason,
        /// Failure description when `reason` is `Failed`
        #[serde(skip_serializing_if = "Option::is_none", default)]
        detail: Option<String>,
        /// Frames delivered to the sink
        frames_sent: u64,
        /// When the worker reported
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Pending queue changed
    QueueChanged {
        /// Session key
        session: String,
        /// Queue contents after the change (head first)
        queue: Vec<TrackInfo>,
        /// Why queue changed
        trigger: QueueChangeTrigger,
        /// When queue changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session output became unusable; playback stopped and queue dropped
    SessionFailed {
        /// Session key
        session: String,
        /// Failure description
        reason: String,
        /// When the failure was handled
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session engine exited (removed, retired or shut down)
    SessionClosed {
        /// Session key
        session: String,
        /// When the engine exited
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl FeintsEvent {
    /// Session key the event belongs to
    pub fn session(&self) -> &str {
        match self {
            FeintsEvent::PlaybackStateChanged { session, .. }
            | FeintsEvent::TrackStarted { session, .. }
            | FeintsEvent::TrackEnded { session, .. }
            | FeintsEvent::QueueChanged { session, .. }
            | FeintsEvent::SessionFailed { session, .. }
            | FeintsEvent::SessionClosed { session, .. } => session,
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over a `tokio::sync::broadcast` channel. Slow subscribers lag and lose the
/// oldest events instead of blocking emitters.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<FeintsEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    ///
    /// # Examples
    ///
    /// ```
    /// use feints_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<FeintsEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    ///
    /// # Examples
    ///
    /// ```
    /// use feints_common::events::{EventBus, FeintsEvent, PlaybackState};
    ///
    /// let event_bus = EventBus::new(16);
    /// let _rx = event_bus.subscribe();
    ///
    /// let delivered = event_bus.emit(FeintsEvent::PlaybackStateChanged {
    ///     session: "guild:1".to_string(),
    ///     old_state: PlaybackState::Idle,
    ///     new_state: PlaybackState::Playing,
    ///     timestamp: chrono::Utc::now(),
    /// });
    /// assert_eq!(delivered.ok(), Some(1));
    /// ```
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: FeintsEvent,
    ) -> Result<usize, broadcast::error::SendError<FeintsEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: FeintsEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track_info(title: &str) -> TrackInfo {
        TrackInfo {
            locator: format!("/music/{}.flac", title),
            title: title.to_string(),
            duration_ms: None,
        }
    }

    #[test]
    fn test_playback_state_serializes_lowercase() {
        let json = serde_json::to_string(&PlaybackState::Playing).expect("serialize");
        assert_eq!(json, "\"playing\"");
        assert_eq!(PlaybackState::Stopping.to_string(), "stopping");
        assert_eq!(PlaybackState::default(), PlaybackState::Idle);
    }

    #[test]
    fn test_has_current_track() {
        assert!(PlaybackState::Playing.has_current_track());
        assert!(PlaybackState::Paused.has_current_track());
        assert!(!PlaybackState::Idle.has_current_track());
        assert!(!PlaybackState::Stopping.has_current_track());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = FeintsEvent::TrackEnded {
            session: "guild:1".to_string(),
            track: track_info("intro"),
            reason: TrackEndReason::Cancelled,
            detail: None,
            frames_sent: 12,
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"type\":\"TrackEnded\""), "{}", json);
        assert!(json.contains("\"reason\":\"Cancelled\""), "{}", json);
        assert!(!json.contains("detail"), "empty detail should be skipped: {}", json);
        assert!(!json.contains("duration_ms"), "unknown duration should be skipped: {}", json);

        let back: FeintsEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.session(), "guild:1");
    }

    #[test]
    fn test_emit_without_subscribers_fails() {
        let bus = EventBus::new(4);
        let result = bus.emit(FeintsEvent::SessionClosed {
            session: "a".to_string(),
            timestamp: chrono::Utc::now(),
        });
        assert!(result.is_err());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit_lossy(FeintsEvent::QueueChanged {
            session: "a".to_string(),
            queue: vec![track_info("one")],
            trigger: QueueChangeTrigger::Enqueue,
            timestamp: chrono::Utc::now(),
        });
        bus.emit_lossy(FeintsEvent::SessionClosed {
            session: "a".to_string(),
            timestamp: chrono::Utc::now(),
        });

        match rx.recv().await.expect("first event") {
            FeintsEvent::QueueChanged { queue, trigger, .. } => {
                assert_eq!(queue.len(), 1);
                assert_eq!(trigger, QueueChangeTrigger::Enqueue);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            rx.recv().await.expect("second event"),
            FeintsEvent::SessionClosed { .. }
        ));
    }
}
