//! Handshake payloads: the challenge, the `connect` request, and the
//! gateway's `hello-ok` answer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway protocol version spoken by this client.
pub const PROTOCOL_VERSION: u32 = 3;

/// Event the gateway sends first on every connection.
pub const CONNECT_CHALLENGE_EVENT: &str = "connect.challenge";

/// Method of the authentication request.
pub const CONNECT_METHOD: &str = "connect";

/// Payload of `connect.challenge`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChallengePayload {
    /// Server nonce that must be embedded in the signed payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl ChallengePayload {
    /// Read the challenge from an event payload. Anything unexpected counts
    /// as a challenge without a nonce.
    pub fn from_payload(payload: &Value) -> Self {
        let nonce = payload
            .get("nonce")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        Self { nonce }
    }
}

/// Parameters of the `connect` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub min_protocol: u32,
    pub max_protocol: u32,
    pub client: ClientDescriptor,
    pub role: String,
    pub scopes: Vec<String>,
    pub device: DeviceProof,
    #[serde(default)]
    pub caps: Vec<String>,
    pub auth: ConnectAuth,
    pub user_agent: String,
    pub locale: String,
}

/// Who is connecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientDescriptor {
    pub id: String,
    pub version: String,
    pub platform: String,
    pub mode: String,
}

/// Proof of possession of the device key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProof {
    /// Device id (hex SHA-256 of the public key).
    pub id: String,

    /// Raw public key, base64url.
    pub public_key: String,

    /// Signature over the auth payload, base64url.
    pub signature: String,

    /// Signing time, epoch milliseconds.
    pub signed_at: u64,

    /// Challenge nonce, echoed when one was issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Credentials presented with `connect`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Successful `connect` response payload.
///
/// Parsed leniently: every field is optional so gateway additions never
/// break the handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloOk {
    #[serde(default)]
    pub protocol: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<HelloAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<HelloPolicy>,
}

impl HelloOk {
    /// Parse the `connect` payload, falling back to an empty hello.
    pub fn from_payload(payload: &Value) -> Self {
        serde_json::from_value(payload.clone()).unwrap_or_default()
    }

    /// Device token issued by the gateway, if any.
    pub fn device_token(&self) -> Option<&str> {
        self.auth
            .as_ref()
            .and_then(|a| a.device_token.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

/// Auth section of `hello-ok`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Policy section of `hello-ok`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_interval_ms: Option<u64>,
}
