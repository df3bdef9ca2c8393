//! Chat methods on top of [`GatewayClient::rpc`].

use gatelink_core::id;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::client::GatewayClient;
use crate::Result;

/// Default number of messages fetched by [`GatewayClient::chat_history`].
pub const DEFAULT_HISTORY_LIMIT: u32 = 200;

/// Result of `chat.history`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistory {
    /// Messages, oldest first, as the gateway sent them.
    #[serde(default)]
    pub messages: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_level: Option<String>,
}

impl ChatHistory {
    fn from_payload(payload: Value) -> Self {
        serde_json::from_value(payload).unwrap_or_default()
    }
}

/// Acknowledgement of `chat.send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSendAck {
    /// Run id, also the idempotency key sent with the message.
    pub run_id: String,
    /// Status reported by the gateway, if any.
    pub status: Option<String>,
}

impl GatewayClient {
    /// Fetch recent messages of a chat session.
    pub async fn chat_history(&self, session_key: &str, limit: Option<u32>) -> Result<ChatHistory> {
        let payload = self
            .rpc(
                "chat.history",
                json!({
                    "sessionKey": session_key,
                    "limit": limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
                }),
            )
            .await?;
        Ok(ChatHistory::from_payload(payload))
    }

    /// Send a user message. Replies stream back as `chat` events.
    pub async fn chat_send(&self, session_key: &str, message: &str) -> Result<ChatSendAck> {
        let idempotency_key = id::uuid();
        let payload = self
            .rpc(
                "chat.send",
                json!({
                    "sessionKey": session_key,
                    "message": message,
                    "deliver": false,
                    "idempotencyKey": idempotency_key,
                }),
            )
            .await?;
        Ok(ChatSendAck {
            run_id: payload
                .get("runId")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(idempotency_key),
            status: payload
                .get("status")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    /// Ask the gateway to stop a running reply. Fire-and-forget.
    pub fn chat_abort(&self, session_key: &str, run_id: Option<&str>) -> Result<()> {
        let mut params = json!({ "sessionKey": session_key });
        if let Some(run_id) = run_id {
            params["runId"] = Value::String(run_id.to_string());
        }
        self.notify("chat.abort", params)
    }
}
