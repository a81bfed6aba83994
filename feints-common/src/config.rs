//! Configuration file resolution and TOML loading
//!
//! Every feints binary looks for its TOML file in the same places, in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config directory (`~/.config/feints/<file>`)
//! 4. System config directory (`/etc/feints/<file>`)
//!
//! A missing file is not an error: callers fall back to built-in defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Directory name used under the platform config directories
pub const CONFIG_DIR_NAME: &str = "feints";

/// Environment variable consulted when no `--config` argument is given
pub const CONFIG_ENV_VAR: &str = "FEINTS_CONFIG";

/// Resolve the configuration file path
///
/// Explicit sources (CLI argument, environment variable) are returned as-is even when the
/// file does not exist, so that a typo surfaces as a load error instead of silently
/// falling back to defaults. Implicit locations are only returned when the file exists.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3 and 4: user then system config directory
    default_config_locations(file_name)
        .into_iter()
        .find(|candidate| candidate.exists())
}

/// Candidate config file locations for the platform, most specific first
pub fn default_config_locations(file_name: &str) -> Vec<PathBuf> {
    let mut locations = Vec::new();

    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join(CONFIG_DIR_NAME).join(file_name));
    }

    if cfg!(unix) {
        locations.push(PathBuf::from("/etc").join(CONFIG_DIR_NAME).join(file_name));
    }

    locations
}

/// Load a TOML file into `T`, or return `T::default()` when no path was resolved
///
/// Logs nothing: callers load config before their subscriber exists and report afterwards.
pub fn load_toml_or_default<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file {:?}: {}", path, e)))?;

    let parsed = toml::from_str::<T>(&content)
        .map_err(|e| Error::Config(format!("Failed to parse TOML {:?}: {}", path, e)))?;

    Ok(parsed)
}
