//! Common error types for feints

use thiserror::Error;

/// Common result type for feints operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the feints crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}
