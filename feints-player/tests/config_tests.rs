//! Configuration loading from real files and the FEINTS_CONFIG environment variable

use feints_common::config::{resolve_config_path, CONFIG_ENV_VAR};
use feints_player::config::{Config, ConfigOverrides, CONFIG_FILE_NAME};
use feints_player::Error;
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

/// Log output captured in memory
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_load_full_file() {
    let file = config_file(
        r#"
        port = 5800

        [logging]
        level = "debug"

        [engine]
        idle_timeout_secs = 120
        teardown_grace_ms = 500
        sink_send_timeout_ms = 30

        [source]
        ffmpeg_path = "/usr/local/bin/ffmpeg"
        input_args = ["-reconnect", "1"]

        [output]
        rtp_target = "192.168.1.20:5004"
        payload_type = 96
        "#,
    );

    let config = Config::load(Some(file.path()), ConfigOverrides::default()).expect("load");

    assert_eq!(config.source_path.as_deref(), Some(file.path()));
    assert_eq!(config.port, 5800);
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.engine.idle_timeout(), Some(Duration::from_secs(120)));
    assert_eq!(config.engine.teardown_grace(), Duration::from_millis(500));
    assert_eq!(config.engine.sink_send_timeout(), Duration::from_millis(30));
    assert_eq!(config.source.ffmpeg_path, PathBuf::from("/usr/local/bin/ffmpeg"));
    assert_eq!(config.source.input_args, vec!["-reconnect", "1"]);
    assert_eq!(config.output.rtp_target, "192.168.1.20:5004");
    assert_eq!(config.output.payload_type, 96);
}

#[test]
fn test_cli_overrides_file() {
    let file = config_file("port = 5800\n");
    let overrides = ConfigOverrides {
        port: Some(9000),
        ..Default::default()
    };

    let config = Config::load(Some(file.path()), overrides).expect("load");
    assert_eq!(config.port, 9000);
}

#[test]
fn test_malformed_file_is_an_error() {
    let file = config_file("port = \"not a number\"\n");

    let result = Config::load(Some(file.path()), ConfigOverrides::default());
    assert!(matches!(result, Err(Error::Common(_))));
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join(CONFIG_FILE_NAME);

    assert!(Config::load(Some(&missing), ConfigOverrides::default()).is_err());
}

#[test]
#[serial]
fn test_env_var_selects_config_file() {
    let file = config_file("port = 6100\n");
    std::env::set_var(CONFIG_ENV_VAR, file.path());

    let resolved = resolve_config_path(None, CONFIG_ENV_VAR, CONFIG_FILE_NAME);
    std::env::remove_var(CONFIG_ENV_VAR);

    let resolved = resolved.expect("path from env");
    assert_eq!(resolved, file.path());
    let config = Config::load(Some(&resolved), ConfigOverrides::default()).expect("load");
    assert_eq!(config.port, 6100);
}

#[test]
#[serial]
fn test_cli_path_beats_env_var() {
    let from_env = config_file("port = 6100\n");
    let from_cli = config_file("port = 6200\n");
    std::env::set_var(CONFIG_ENV_VAR, from_env.path());

    let resolved = resolve_config_path(Some(from_cli.path()), CONFIG_ENV_VAR, CONFIG_FILE_NAME);
    std::env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved.as_deref(), Some(from_cli.path()));
}

#[test]
fn test_load_is_silent() {
    // main reports the loaded config itself, once its subscriber is installed
    let file = config_file("port = 5800\n");
    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        Config::load(Some(file.path()), ConfigOverrides::default()).expect("load file");
        Config::load(None, ConfigOverrides::default()).expect("load defaults");
    });

    let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
    assert!(output.is_empty(), "unexpected log output: {}", output);
}
