//! Server-Sent Events stream of playback events

use crate::api::AppContext;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use feints_common::events::FeintsEvent;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Only forward events of this session
    #[serde(default)]
    session: Option<String>,
}

/// GET /events - SSE event stream, optionally filtered by `?session=`
pub async fn event_stream(
    State(ctx): State<AppContext>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(session = ?query.session, "New SSE client connected");

    let rx = ctx.registry.events().subscribe();
    let filter = query.session;

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let filter = filter.clone();
        async move {
            match result {
                Ok(event) => {
                    if let Some(session) = &filter {
                        if event.session() != session.as_str() {
                            return None;
                        }
                    }
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            Some(Ok(Event::default().event(event_type_str(&event)).data(json)))
                        }
                        Err(e) => {
                            warn!("Failed to serialize event: {}", e);
                            None
                        }
                    }
                }
                Err(e) => {
                    // Lagged subscriber: events were dropped, keep streaming
                    warn!("SSE stream error: {:?}", e);
                    None
                }
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// SSE `event:` field for each event variant
fn event_type_str(event: &FeintsEvent) -> &'static str {
    match event {
        FeintsEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
        FeintsEvent::TrackStarted { .. } => "TrackStarted",
        FeintsEvent::TrackEnded { .. } => "TrackEnded",
        FeintsEvent::QueueChanged { .. } => "QueueChanged",
        FeintsEvent::SessionFailed { .. } => "SessionFailed",
        FeintsEvent::SessionClosed { .. } => "SessionClosed",
    }
}
