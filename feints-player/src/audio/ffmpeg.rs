//! ffmpeg-backed source resolver
//!
//! Spawns one `ffmpeg` process per track that decodes the track locator (local path or URL)
//! to raw s16le / 48 kHz / stereo PCM on stdout. The process is killed on cleanup, on drop,
//! and whenever the worker is cancelled.

use crate::audio::source::{ResolvedSource, SourceCleanup, SourceResolver};
use crate::audio::types::{CHANNELS, SAMPLE_RATE};
use crate::config::SourceConfig;
use crate::error::TrackError;
use crate::playback::types::Track;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Size of the first read used to confirm ffmpeg actually produces audio
const PROBE_BYTES: usize = 8192;

/// Resolves tracks by decoding them with an external ffmpeg process
#[derive(Debug, Clone)]
pub struct FfmpegResolver {
    ffmpeg_path: PathBuf,
    input_args: Vec<String>,
    startup_timeout: Duration,
}

impl FfmpegResolver {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            input_args: config.input_args.clone(),
            startup_timeout: config.startup_timeout(),
        }
    }

    /// Full argument list for decoding `locator`
    pub fn command_args(&self, locator: &str) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-nostdin".to_string(),
        ];
        args.extend(self.input_args.iter().cloned());
        args.extend([
            "-i".to_string(),
            locator.to_string(),
            "-vn".to_string(),
            "-f".to_string(),
            "s16le".to_string(),
            "-ar".to_string(),
            SAMPLE_RATE.to_string(),
            "-ac".to_string(),
            CHANNELS.to_string(),
            "pipe:1".to_string(),
        ]);
        args
    }
}

#[async_trait]
impl SourceResolver for FfmpegResolver {
    async fn resolve(&self, track: &Track) -> Result<ResolvedSource, TrackError> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(self.command_args(track.locator()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TrackError::Resolve(format!(
                    "failed to spawn {}: {}",
                    self.ffmpeg_path.display(),
                    e
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TrackError::Resolve("ffmpeg stdout was not captured".to_string()))?;
        let mut stdout = BufReader::new(stdout);

        debug!(track = %track.title(), pid = ?child.id(), "ffmpeg started");

        // An unopenable input makes ffmpeg exit without writing anything; read the first chunk
        // here so that shows up as a resolve failure instead of an empty track.
        let mut probe = vec![0u8; PROBE_BYTES];
        let read = tokio::time::timeout(self.startup_timeout, stdout.read(&mut probe)).await;

        let filled = match read {
            Ok(Ok(0)) => {
                let status = tokio::time::timeout(Duration::from_secs(1), child.wait())
                    .await
                    .ok()
                    .and_then(|waited| waited.ok());
                return Err(TrackError::Resolve(format!(
                    "ffmpeg produced no audio for {} (exit status: {})",
                    track.locator(),
                    status.map_or_else(|| "unknown".to_string(), |s| s.to_string())
                )));
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                let _ = child.start_kill();
                return Err(TrackError::Resolve(format!("failed to read ffmpeg output: {}", e)));
            }
            Err(_) => {
                let _ = child.start_kill();
                return Err(TrackError::Resolve(format!(
                    "ffmpeg did not start producing audio within {:?}",
                    self.startup_timeout
                )));
            }
        };
        probe.truncate(filled);

        let reader = std::io::Cursor::new(probe).chain(stdout);
        Ok(ResolvedSource::new(
            Box::new(reader),
            Box::new(ChildCleanup { child }),
        ))
    }
}

/// Kills and reaps the ffmpeg process
struct ChildCleanup {
    child: Child,
}

#[async_trait]
impl SourceCleanup for ChildCleanup {
    async fn shutdown(mut self: Box<Self>, grace: Duration) {
        let pid = self.child.id();

        // Still running (cancelled mid-track): no reason to let it finish
        if let Ok(None) = self.child.try_wait() {
            if let Err(e) = self.child.start_kill() {
                warn!(?pid, "Failed to kill ffmpeg: {}", e);
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!(?pid, %status, "ffmpeg exited"),
            Ok(Err(e)) => warn!(?pid, "Failed to wait for ffmpeg: {}", e),
            Err(_) => warn!(?pid, "ffmpeg did not exit within {:?}", grace),
        }
    }
}
