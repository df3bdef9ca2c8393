//! Authenticated, self-healing WebSocket client for the chat gateway.
//!
//! This crate provides:
//! - A persistent Ed25519 device identity and device-token storage
//! - The challenge/response handshake
//! - Request/response correlation with per-request timeouts
//! - Automatic reconnection with capped exponential backoff
//! - Ordered delivery of gateway events to a listener

pub mod chat;
pub mod client;
pub mod dispatch;
pub mod error;
mod handshake;
pub mod identity;
pub mod options;
mod pending;
pub mod store;
pub mod supervisor;
mod transport;

pub use chat::{ChatHistory, ChatSendAck, DEFAULT_HISTORY_LIMIT};
pub use client::{GatewayClient, HANDSHAKE_FAILED_CLOSE};
pub use dispatch::ConnectionListener;
pub use error::GatewayError;
pub use identity::{verify_signature, AuthPayload, DeviceIdentity, IdentityManager};
pub use options::ClientOptions;
pub use store::{DeviceTokenEntry, FileIdentityStore, IdentityStore, MemoryIdentityStore, StoredIdentity};
pub use supervisor::{Backoff, Phase, Supervisor};

/// Result type for gateway client operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
