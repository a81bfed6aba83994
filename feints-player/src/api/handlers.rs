//! HTTP request handlers

use crate::api::AppContext;
use crate::error::Error;
use crate::playback::{Command, PlaybackSnapshot, SessionKey, Track};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use feints_common::events::{PlaybackState, TrackInfo};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    sessions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: String,
    pub session: String,
    pub command: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session: String,
    pub state: PlaybackState,
    pub current: Option<TrackInfo>,
    pub queue: Vec<TrackInfo>,
}

impl From<PlaybackSnapshot> for SessionResponse {
    fn from(snapshot: PlaybackSnapshot) -> Self {
        Self {
            session: snapshot.session.to_string(),
            state: snapshot.state,
            current: snapshot.current.as_ref().map(Track::info),
            queue: snapshot.queue.iter().map(Track::info).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    locator: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration_ms: Option<u64>,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", message.into()),
        }),
    )
}

fn session_key(raw: String) -> Result<SessionKey, ApiError> {
    SessionKey::new(raw).map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "feints-player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: ctx.registry.sessions().await.len(),
    })
}

// ============================================================================
// Session Endpoints
// ============================================================================

/// GET /sessions - List live sessions
pub async fn list_sessions(State(ctx): State<AppContext>) -> Json<SessionListResponse> {
    let sessions = ctx
        .registry
        .sessions()
        .await
        .into_iter()
        .map(|key| key.to_string())
        .collect();
    Json(SessionListResponse { sessions })
}

/// GET /sessions/:key - Snapshot of one session
pub async fn get_session(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let key = session_key(key)?;

    let Some(engine) = ctx.registry.get(&key).await else {
        return Err(error_response(StatusCode::NOT_FOUND, format!("no session {}", key)));
    };

    match engine.query().await {
        Ok(snapshot) => Ok(Json(snapshot.into())),
        Err(Error::EngineClosed(_)) => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("session {} closed", key),
        )),
        Err(e) => {
            error!(session = %key, "Query failed: {}", e);
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// DELETE /sessions/:key - Stop and forget a session
pub async fn remove_session(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    let key = session_key(key)?;

    if ctx.registry.remove(&key).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error_response(StatusCode::NOT_FOUND, format!("no session {}", key)))
    }
}

// ============================================================================
// Playback Control Endpoints
// ============================================================================

/// POST /sessions/:key/enqueue - Append a track (auto-starts when idle)
pub async fn enqueue(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
    Json(req): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let mut track = Track::new(req.locator, req.title.unwrap_or_default())
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))?;
    if let Some(ms) = req.duration_ms {
        track = track.with_duration(Duration::from_millis(ms));
    }

    info!(session = %key, track = %track, "Enqueue request");
    submit(ctx, key, Command::Enqueue(track)).await
}

/// POST /sessions/:key/play
pub async fn play(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    submit(ctx, key, Command::Play).await
}

/// POST /sessions/:key/pause
pub async fn pause(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    submit(ctx, key, Command::Pause).await
}

/// POST /sessions/:key/resume
pub async fn resume(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    submit(ctx, key, Command::Resume).await
}

/// POST /sessions/:key/skip
pub async fn skip(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    submit(ctx, key, Command::Skip).await
}

/// POST /sessions/:key/stop
pub async fn stop(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    submit(ctx, key, Command::Stop).await
}

/// POST /sessions/:key/clear
pub async fn clear(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    submit(ctx, key, Command::Clear).await
}

async fn submit(
    ctx: AppContext,
    key: String,
    command: Command,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let key = session_key(key)?;
    let name = command.name();

    match ctx.registry.submit(&key, command).await {
        Ok(_) => Ok((
            StatusCode::ACCEPTED,
            Json(CommandResponse {
                status: "accepted".to_string(),
                session: key.to_string(),
                command: name.to_string(),
            }),
        )),
        Err(e) => {
            error!(session = %key, command = name, "Command failed: {}", e);
            let status = match e {
                Error::Sink(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err(error_response(status, e.to_string()))
        }
    }
}
