//! Feints Player (feints-player) - Main entry point
//!
//! Per-session audio playback service: decodes tracks with ffmpeg, encodes Opus, paces
//! frames out over RTP and takes control commands over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use feints_common::events::EventBus;
use feints_player::api::{self, AppContext};
use feints_player::audio::{FfmpegResolver, OpusEncoderFactory, RtpSinkProvider};
use feints_player::config::{Config, ConfigOverrides, CONFIG_FILE_NAME};
use feints_player::playback::{EngineRegistry, WorkerSettings};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for feints-player
#[derive(Parser, Debug)]
#[command(name = "feints-player")]
#[command(about = "Per-session audio playback service")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "FEINTS_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "FEINTS_PLAYER_PORT")]
    port: Option<u16>,

    /// Log level or EnvFilter directive (RUST_LOG takes precedence)
    #[arg(long, env = "FEINTS_LOG_LEVEL")]
    log_level: Option<String>,

    /// RTP destination (host:port)
    #[arg(long, env = "FEINTS_RTP_TARGET")]
    rtp_target: Option<String>,

    /// ffmpeg executable
    #[arg(long, env = "FEINTS_FFMPEG")]
    ffmpeg: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Config file: --config / FEINTS_CONFIG, then ~/.config/feints, then /etc/feints
    let config_path = feints_common::config::resolve_config_path(
        args.config.as_deref(),
        feints_common::config::CONFIG_ENV_VAR,
        CONFIG_FILE_NAME,
    );

    let overrides = ConfigOverrides {
        port: args.port,
        log_level: args.log_level,
        rtp_target: args.rtp_target,
        ffmpeg_path: args.ffmpeg,
    };

    // Config carries the log level, so it is loaded before tracing and reported afterwards
    let config = Config::load(config_path.as_deref(), overrides)
        .context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(&config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting feints-player on port {}", config.port);
    match &config.source_path {
        Some(path) => info!("Config file: {}", path.display()),
        None => warn!("No config file found, using built-in defaults"),
    }
    info!(
        "Configuration: port={}, rtp_target={}, idle_timeout_secs={}",
        config.port, config.output.rtp_target, config.engine.idle_timeout_secs
    );

    // Playback collaborators
    let resolver = Arc::new(FfmpegResolver::new(&config.source));
    let encoder_factory = Arc::new(OpusEncoderFactory::new(&config.encoder));
    let sink_provider = Arc::new(
        RtpSinkProvider::from_config(&config.output)
            .await
            .context("Failed to configure RTP output")?,
    );
    info!("RTP output target: {}", sink_provider.target());

    let events = Arc::new(EventBus::new(config.engine.event_capacity));
    let registry = Arc::new(EngineRegistry::new(
        resolver,
        encoder_factory,
        sink_provider,
        WorkerSettings::from(&config.engine),
        events,
    ));

    let reaper = config.engine.idle_timeout().map(|idle_for| {
        info!("Idle sessions retire after {:?}", idle_for);
        registry.spawn_reaper(config.engine.reap_interval(), idle_for)
    });

    // Build the application router
    let app = api::create_router(AppContext {
        registry: Arc::clone(&registry),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(reaper) = reaper {
        reaper.abort();
    }
    registry.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Bare level names apply to our crates only; anything else is used as a full directive
fn default_filter(level: &str) -> String {
    match level {
        "trace" | "debug" | "info" | "warn" | "error" => format!(
            "feints_player={level},feints_common={level},tower_http={level}",
            level = level
        ),
        directive => directive.to_string(),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
