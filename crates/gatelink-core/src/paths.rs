//! Where Gatelink keeps its files.
//!
//! Everything lives under one base directory, `~/.gatelink` unless
//! `GATELINK_HOME` points elsewhere.

use crate::error::ConfigError;
use std::path::PathBuf;

/// Environment variable that replaces `~/.gatelink`.
pub const HOME_ENV: &str = "GATELINK_HOME";

pub fn base_dir() -> Result<PathBuf, ConfigError> {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|home| home.join(".gatelink"))
        .ok_or(ConfigError::NoHomeDir)
}

/// `<base>/gatelink.json5`
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("gatelink.json5"))
}

/// `<base>/identity`, holding the device keypair and issued device tokens.
pub fn identity_dir() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("identity"))
}

/// Expand a leading `~/` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
