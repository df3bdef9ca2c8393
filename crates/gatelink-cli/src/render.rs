//! Terminal rendering utilities.

use console::style;
use gatelink_core::{ConnectionState, ConnectionStatus, EventFrame};
use serde_json::Value;

const MAX_PAYLOAD_CHARS: usize = 500;

/// Render a connection status line.
pub fn render_status(status: &ConnectionStatus) {
    let state = match status.state {
        ConnectionState::Connected => style(status.state.to_string()).green(),
        ConnectionState::Connecting => style(status.state.to_string()).yellow(),
        ConnectionState::Disconnected => style(status.state.to_string()).dim(),
        ConnectionState::Error => style(status.state.to_string()).red(),
    };
    match &status.error {
        Some(error) => eprintln!("{} {} {}", style("●").bold(), state, style(error).dim()),
        None => eprintln!("{} {}", style("●").bold(), state),
    }
}

/// Render one gateway event.
pub fn render_event(event: &EventFrame) {
    let seq = event
        .seq
        .map(|s| format!("#{} ", s))
        .unwrap_or_default();
    println!(
        "{}{} {}",
        style(seq).dim(),
        style(&event.event).cyan().bold(),
        truncate(&event.payload.to_string())
    );
}

/// Pretty-print a JSON value.
pub fn render_json(value: &Value) {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    println!("{}", text);
}

/// Render one chat history message.
pub fn render_chat_message(message: &Value) {
    let role = message.get("role").and_then(Value::as_str).unwrap_or("?");
    let text = message_text(message);
    let label = match role {
        "user" => style(role).blue().bold(),
        "assistant" => style(role).green().bold(),
        _ => style(role).dim(),
    };
    println!("{} {}", label, text);
}

/// Best-effort text of a chat message: a string `content`, or the `text`
/// parts of a content array.
pub fn message_text(message: &Value) -> String {
    match message.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => message
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() > MAX_PAYLOAD_CHARS {
        let cut: String = text.chars().take(MAX_PAYLOAD_CHARS).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}
