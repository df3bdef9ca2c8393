//! # gatelink-core
//!
//! Core types, wire frames, and configuration for Gatelink.
//!
//! This crate provides the pieces shared by the gateway client and the CLI:
//!
//! - **Configuration**: Loading, validation, and persistence of the config file
//! - **Types**: Wire frames, handshake payloads, and connection status
//! - **Utilities**: Path resolution, ID generation, and secret handling

pub mod config;
pub mod error;
pub mod id;
pub mod paths;
pub mod secret;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use error::ConfigError;
pub use secret::SecretString;
pub use types::*;
