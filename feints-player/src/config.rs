//! Configuration management for feints-player
//!
//! Two tiers, highest priority first:
//! 1. Command-line arguments / environment variables (see `main.rs`)
//! 2. TOML configuration file (located by `feints_common::config::resolve_config_path`)
//! 3. Built-in defaults (code constants below)
//!
//! Configuration is read once at startup; the service must restart to pick up changes.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name under the feints config directories
pub const CONFIG_FILE_NAME: &str = "player.toml";

/// Configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Engine lifecycle and timing settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// ffmpeg source settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Opus encoder settings
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// RTP output settings
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            logging: LoggingConfig::default(),
            engine: EngineConfig::default(),
            source: SourceConfig::default(),
            encoder: EncoderConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Engine lifecycle and timing settings
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Retire engines quiescent for this long (0 disables the reaper)
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// How often the reaper scans the registry
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,

    /// Upper bound on source teardown (process kill + wait)
    #[serde(default = "default_teardown_grace_ms")]
    pub teardown_grace_ms: u64,

    /// Per-frame sink send deadline; a slower send drops the frame
    #[serde(default = "default_sink_send_timeout_ms")]
    pub sink_send_timeout_ms: u64,

    /// EventBus buffer size
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl EngineConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }

    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }

    pub fn sink_send_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_send_timeout_ms.max(1))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            reap_interval_secs: default_reap_interval_secs(),
            teardown_grace_ms: default_teardown_grace_ms(),
            sink_send_timeout_ms: default_sink_send_timeout_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// ffmpeg source settings
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// ffmpeg executable (looked up on PATH when relative)
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Extra arguments placed before `-i` (e.g. reconnect options for HTTP inputs)
    #[serde(default)]
    pub input_args: Vec<String>,

    /// How long to wait for the first decoded bytes before giving up on a source
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
}

impl SourceConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            input_args: Vec::new(),
            startup_timeout_ms: default_startup_timeout_ms(),
        }
    }
}

/// Opus application profile
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncoderApplication {
    Voip,
    #[default]
    Audio,
    LowDelay,
}

/// Opus encoder settings
#[derive(Debug, Clone, Deserialize)]
pub struct EncoderConfig {
    /// Target bitrate in bits per second (`None` lets libopus decide)
    #[serde(default = "default_bitrate")]
    pub bitrate: Option<i32>,

    #[serde(default)]
    pub application: EncoderApplication,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            bitrate: default_bitrate(),
            application: EncoderApplication::default(),
        }
    }
}

/// RTP output settings
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// UDP destination for RTP packets (`host:port`)
    #[serde(default = "default_rtp_target")]
    pub rtp_target: String,

    /// RTP dynamic payload type for Opus
    #[serde(default = "default_payload_type")]
    pub payload_type: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            rtp_target: default_rtp_target(),
            payload_type: default_payload_type(),
        }
    }
}

fn default_port() -> u16 {
    5750
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_reap_interval_secs() -> u64 {
    30
}

fn default_teardown_grace_ms() -> u64 {
    2000
}

fn default_sink_send_timeout_ms() -> u64 {
    40
}

fn default_event_capacity() -> usize {
    256
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_startup_timeout_ms() -> u64 {
    15_000
}

fn default_bitrate() -> Option<i32> {
    Some(128_000)
}

fn default_rtp_target() -> String {
    "127.0.0.1:5004".to_string()
}

fn default_payload_type() -> u8 {
    111
}

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// File the configuration was read from, if any
    pub source_path: Option<PathBuf>,
    pub port: u16,
    pub log_level: String,
    pub engine: EngineConfig,
    pub source: SourceConfig,
    pub encoder: EncoderConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from the resolved TOML path (if any) and apply CLI overrides
    ///
    /// Silent: the log level lives in here, so the caller reports the result once tracing is up.
    pub fn load(toml_path: Option<&Path>, cli_overrides: ConfigOverrides) -> Result<Self> {
        let toml_config: TomlConfig = feints_common::config::load_toml_or_default(toml_path)?;
        Self::from_toml(toml_config, toml_path.map(Path::to_path_buf), cli_overrides)
    }

    /// Apply CLI overrides on top of an already-parsed TOML config
    pub fn from_toml(
        toml_config: TomlConfig,
        source_path: Option<PathBuf>,
        cli_overrides: ConfigOverrides,
    ) -> Result<Self> {
        let mut source = toml_config.source;
        if let Some(ffmpeg_path) = cli_overrides.ffmpeg_path {
            source.ffmpeg_path = ffmpeg_path;
        }

        let mut output = toml_config.output;
        if let Some(rtp_target) = cli_overrides.rtp_target {
            output.rtp_target = rtp_target;
        }

        if output.payload_type > 127 {
            return Err(Error::Config(format!(
                "RTP payload type must be 0-127, got {}",
                output.payload_type
            )));
        }

        Ok(Config {
            source_path,
            port: cli_overrides.port.unwrap_or(toml_config.port),
            log_level: cli_overrides.log_level.unwrap_or(toml_config.logging.level),
            engine: toml_config.engine,
            source,
            encoder: toml_config.encoder,
            output,
        })
    }
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub rtp_target: Option<String>,
    pub ffmpeg_path: Option<PathBuf>,
}
