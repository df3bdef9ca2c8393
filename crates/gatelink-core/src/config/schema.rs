//! Configuration schema definitions.

use crate::secret::SecretString;
use serde::{Deserialize, Serialize};

/// Default gateway endpoint.
pub const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:18789";

/// Client id the gateway knows the control UI by.
pub const DEFAULT_CLIENT_ID: &str = "openclaw-control-ui";

/// Main Gatelink configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Gateway endpoint and timeouts.
    #[serde(default)]
    pub gateway: GatewaySettings,

    /// Reconnection backoff.
    #[serde(default)]
    pub reconnect: ReconnectSettings,

    /// How this client presents itself during the handshake.
    #[serde(default)]
    pub client: ClientSettings,
}

/// Gateway endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// WebSocket URL (`ws://` or `wss://`).
    #[serde(default = "default_url")]
    pub url: String,

    /// Shared bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SecretString>,

    /// Deadline for an individual RPC.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// How long to wait for `connect.challenge` after the socket opens.
    #[serde(default = "default_challenge_timeout_ms")]
    pub challenge_timeout_ms: u64,
}

fn default_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_challenge_timeout_ms() -> u64 {
    10_000
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            request_timeout_ms: default_request_timeout_ms(),
            challenge_timeout_ms: default_challenge_timeout_ms(),
        }
    }
}

/// Capped exponential backoff between reconnect attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectSettings {
    /// First retry delay, and the value restored after a successful handshake.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound on the retry delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor applied after each attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    1.5
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

/// Client descriptor presented in `connect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Client id.
    #[serde(default = "default_client_id")]
    pub id: String,

    /// Client mode.
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Requested role.
    #[serde(default = "default_role")]
    pub role: String,

    /// Requested scopes.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Locale reported to the gateway.
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_mode() -> String {
    "webchat".to_string()
}

fn default_role() -> String {
    "operator".to_string()
}

fn default_scopes() -> Vec<String> {
    vec![
        "operator.admin".to_string(),
        "operator.approvals".to_string(),
        "operator.pairing".to_string(),
    ]
}

fn default_locale() -> String {
    "en-US".to_string()
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            id: default_client_id(),
            mode: default_mode(),
            role: default_role(),
            scopes: default_scopes(),
            locale: default_locale(),
        }
    }
}
