//! Errors raised while locating, reading, or checking configuration.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    /// Neither `GATELINK_HOME` nor a home directory is available.
    #[error("Could not determine home directory; set GATELINK_HOME")]
    NoHomeDir,

    #[error("JSON5 parse error: {0}")]
    Json5(String),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] serde_json::Error),

    /// One or more settings are out of range. All problems are joined with `; `.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
