//! Gateway wire frames.
//!
//! Every WebSocket text message is one JSON object tagged by `type`:
//! `req` (client to gateway), `res` (answer to a `req`, matched by `id`),
//! or `event` (pushed by the gateway).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Message used when the gateway rejects a request without saying why.
pub const GENERIC_ERROR_MESSAGE: &str = "request failed";

/// A single frame on the gateway socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Outbound request.
    Req(RequestFrame),

    /// Response to a request.
    Res(ResponseFrame),

    /// Server-pushed event.
    Event(EventFrame),
}

impl Frame {
    /// Parse a text message. Returns `None` for anything that is not a
    /// well-formed frame.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    /// Serialize to the JSON text sent on the socket.
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Request frame: `{type:"req", id, method, params}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlation id, echoed back in the response.
    pub id: String,

    /// Method name.
    pub method: String,

    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

impl RequestFrame {
    /// Create a request with empty-object params.
    pub fn new(id: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params: Value::Object(Default::default()),
        }
    }

    /// Set the parameters.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

impl From<RequestFrame> for Frame {
    fn from(req: RequestFrame) -> Self {
        Frame::Req(req)
    }
}

/// Response frame: `{type:"res", id, ok, payload?, error?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Id of the request being answered.
    pub id: String,

    /// Whether the request succeeded.
    pub ok: bool,

    /// Result (on success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Error (on failure), normalized on the way in.
    #[serde(
        default,
        deserialize_with = "deserialize_error",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<ErrorInfo>,
}

impl ResponseFrame {
    /// Create a success response.
    pub fn success(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Create an error response.
    pub fn failure(id: impl Into<String>, error: ErrorInfo) -> Self {
        Self {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }

    /// Split into the payload or the error, filling in the generic message
    /// when a failed response carries no usable error.
    pub fn into_result(self) -> Result<Value, ErrorInfo> {
        if self.ok {
            Ok(self.payload.unwrap_or(Value::Null))
        } else {
            Err(self.error.unwrap_or_else(ErrorInfo::generic))
        }
    }
}

impl From<ResponseFrame> for Frame {
    fn from(res: ResponseFrame) -> Self {
        Frame::Res(res)
    }
}

/// Event frame: `{type:"event", event, payload, seq?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    /// Event name.
    pub event: String,

    /// Event payload, forwarded verbatim.
    #[serde(default)]
    pub payload: Value,

    /// Per-connection sequence number, when the gateway assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl EventFrame {
    /// Create an event without a sequence number.
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
            seq: None,
        }
    }

    /// Set the sequence number.
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }
}

impl From<EventFrame> for Frame {
    fn from(event: EventFrame) -> Self {
        Frame::Event(event)
    }
}

/// Normalized gateway error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Machine-readable code, when the gateway sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Human-readable message.
    pub message: String,

    /// Extra detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorInfo {
    /// Create an error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            details: None,
        }
    }

    /// Set the error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// The error used when the gateway gives no message.
    pub fn generic() -> Self {
        Self::new(GENERIC_ERROR_MESSAGE)
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

/// Shapes the `error` field takes on the wire.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawError {
    Text(String),
    Detailed(ErrorInfo),
    Other(Value),
}

impl From<RawError> for ErrorInfo {
    fn from(raw: RawError) -> Self {
        let info = match raw {
            // A bare string is not a structured message; keep it as detail only.
            RawError::Text(text) => ErrorInfo {
                details: Some(Value::String(text)),
                ..ErrorInfo::generic()
            },
            RawError::Detailed(info) => info,
            RawError::Other(value) => {
                let message = value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                ErrorInfo {
                    code: value.get("code").map(|c| match c {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    }),
                    message,
                    details: value.get("details").cloned(),
                }
            }
        };
        if info.message.trim().is_empty() {
            ErrorInfo {
                message: GENERIC_ERROR_MESSAGE.to_string(),
                ..info
            }
        } else {
            info
        }
    }
}

fn deserialize_error<'de, D>(deserializer: D) -> Result<Option<ErrorInfo>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawError>::deserialize(deserializer)?.map(ErrorInfo::from))
}
