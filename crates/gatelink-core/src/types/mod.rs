//! Core types for Gatelink.

mod connect;
mod connection;
mod frame;

pub use connect::*;
pub use connection::*;
pub use frame::*;
