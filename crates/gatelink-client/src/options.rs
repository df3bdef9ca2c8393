//! Client construction options.

use std::time::Duration;

use gatelink_core::config::{ClientSettings, ReconnectSettings};
use gatelink_core::{Config, SecretString};

/// Everything a [`GatewayClient`](crate::GatewayClient) needs to connect.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Gateway WebSocket URL.
    pub url: String,

    /// Shared bearer token, used when no device token is stored.
    pub token: Option<SecretString>,

    /// Client id, mode, role, scopes, and locale presented in `connect`.
    pub client: ClientSettings,

    /// Client version reported to the gateway.
    pub client_version: String,

    /// Platform reported to the gateway.
    pub platform: String,

    /// Default deadline for a request.
    pub request_timeout: Duration,

    /// Deadline from starting a connection attempt to receiving the challenge.
    pub challenge_timeout: Duration,

    /// Backoff between reconnect attempts.
    pub reconnect: ReconnectSettings,
}

impl ClientOptions {
    /// Defaults pointed at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        let gateway = gatelink_core::config::GatewaySettings::default();
        Self {
            url: url.into(),
            token: None,
            client: ClientSettings::default(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            platform: std::env::consts::OS.to_string(),
            request_timeout: Duration::from_millis(gateway.request_timeout_ms),
            challenge_timeout: Duration::from_millis(gateway.challenge_timeout_ms),
            reconnect: ReconnectSettings::default(),
        }
    }

    /// Options from a loaded config file.
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.gateway.url.clone(),
            token: config.gateway.token.clone().and_then(SecretString::non_blank),
            client: config.client.clone(),
            request_timeout: Duration::from_millis(config.gateway.request_timeout_ms),
            challenge_timeout: Duration::from_millis(config.gateway.challenge_timeout_ms),
            reconnect: config.reconnect.clone(),
            ..Self::new(config.gateway.url.clone())
        }
    }

    /// Set the shared token. Blank tokens count as none.
    pub fn with_token(mut self, token: impl Into<SecretString>) -> Self {
        self.token = token.into().non_blank();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_challenge_timeout(mut self, timeout: Duration) -> Self {
        self.challenge_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectSettings) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// User agent sent in `connect`.
    pub fn user_agent(&self) -> String {
        format!("gatelink/{}", self.client_version)
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new(gatelink_core::config::DEFAULT_GATEWAY_URL)
    }
}
