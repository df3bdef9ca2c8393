//! Configuration loading and persistence.

use super::Config;
use crate::error::ConfigError;
use crate::paths;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

impl Config {
    /// Load the default config file, or defaults when it is missing or
    /// unreadable.
    pub fn load_or_default() -> Self {
        let loaded = paths::config_file().and_then(|path| Self::load(&path));
        match loaded {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => Self::default(),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable config, using defaults");
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "loaded config");
        Self::parse(&content)
    }

    /// Parse JSON5 text. Missing sections and keys take their defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Write the config, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Render as JSON5. The json5 crate cannot serialize, so this is
    /// pretty JSON, which JSON5 readers accept.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        match url::Url::parse(&self.gateway.url) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
            Ok(url) => errors.push(format!(
                "Gateway URL must use ws:// or wss://, got '{}'",
                url.scheme()
            )),
            Err(e) => errors.push(format!("Invalid gateway URL '{}': {}", self.gateway.url, e)),
        }

        if self.gateway.request_timeout_ms == 0 {
            errors.push("Gateway request_timeout_ms cannot be 0".to_string());
        }
        if self.gateway.challenge_timeout_ms == 0 {
            errors.push("Gateway challenge_timeout_ms cannot be 0".to_string());
        }

        let reconnect = &self.reconnect;
        if reconnect.initial_delay_ms == 0 {
            errors.push("Reconnect initial_delay_ms cannot be 0".to_string());
        }
        if reconnect.max_delay_ms < reconnect.initial_delay_ms {
            errors.push(format!(
                "Reconnect max_delay_ms ({}) is below initial_delay_ms ({})",
                reconnect.max_delay_ms, reconnect.initial_delay_ms
            ));
        }
        if !reconnect.multiplier.is_finite() || reconnect.multiplier < 1.0 {
            errors.push(format!(
                "Reconnect multiplier must be >= 1.0, got {}",
                reconnect.multiplier
            ));
        }

        if self.client.id.trim().is_empty() {
            errors.push("Client id cannot be empty".to_string());
        }
        if self.client.role.trim().is_empty() {
            errors.push("Client role cannot be empty".to_string());
        }
        if self.client.scopes.iter().any(|s| s.contains(',') || s.contains('|')) {
            errors.push("Client scopes cannot contain ',' or '|'".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }
}
