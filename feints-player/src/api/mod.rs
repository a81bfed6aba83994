//! REST API for the playback service
//!
//! Session commands are addressed by path (`/sessions/:key/...`); the session key is taken
//! verbatim from the URL. Every command is acknowledged with 202 once the session's engine
//! has accepted it.

pub mod handlers;
pub mod sse;

use crate::playback::EngineRegistry;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub registry: Arc<EngineRegistry>,
}

/// Build the API router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(handlers::health))

        // Sessions
        .route("/sessions", get(handlers::list_sessions))
        .route(
            "/sessions/:key",
            get(handlers::get_session).delete(handlers::remove_session),
        )

        // Playback control
        .route("/sessions/:key/enqueue", post(handlers::enqueue))
        .route("/sessions/:key/play", post(handlers::play))
        .route("/sessions/:key/pause", post(handlers::pause))
        .route("/sessions/:key/resume", post(handlers::resume))
        .route("/sessions/:key/skip", post(handlers::skip))
        .route("/sessions/:key/stop", post(handlers::stop))
        .route("/sessions/:key/clear", post(handlers::clear))

        // SSE events
        .route("/events", get(sse::event_stream))

        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
