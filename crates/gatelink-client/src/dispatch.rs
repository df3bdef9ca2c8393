//! Event dispatch to the application listener.

use std::sync::Arc;

use gatelink_core::{EventFrame, HelloOk};
use tracing::{debug, warn};

/// Application callbacks for connection lifecycle and pushed events.
///
/// All methods run on the client's driver task, in the order the gateway
/// sent the frames. Keep them short; hand heavy work to another task.
pub trait ConnectionListener: Send + Sync {
    /// A gateway event arrived after the handshake.
    fn on_event(&self, event: &EventFrame) {
        let _ = event;
    }

    /// The handshake completed.
    fn on_connected(&self, hello: &HelloOk) {
        let _ = hello;
    }

    /// An established connection closed.
    fn on_disconnected(&self, code: u16, reason: &str) {
        let _ = (code, reason);
    }

    /// Event sequence numbers skipped from `expected` to `received`.
    fn on_gap(&self, expected: u64, received: u64) {
        let _ = (expected, received);
    }
}

/// Routes events to the registered listener and watches sequence numbers.
#[derive(Default)]
pub(crate) struct EventDispatcher {
    listener: Option<Arc<dyn ConnectionListener>>,
    last_seq: Option<u64>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_listener(&mut self, listener: Option<Arc<dyn ConnectionListener>>) {
        self.listener = listener;
    }

    #[cfg(test)]
    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Forget the sequence position; each connection numbers from scratch.
    pub fn reset_sequence(&mut self) {
        self.last_seq = None;
    }

    pub fn dispatch(&mut self, event: &EventFrame) {
        if let Some(seq) = event.seq {
            if let Some(last) = self.last_seq {
                let expected = last + 1;
                if seq > expected {
                    warn!(expected, received = seq, "event sequence gap");
                    if let Some(listener) = &self.listener {
                        listener.on_gap(expected, seq);
                    }
                }
            }
            self.last_seq = Some(self.last_seq.map_or(seq, |last| last.max(seq)));
        }

        match &self.listener {
            Some(listener) => listener.on_event(event),
            None => debug!(event = %event.event, "no listener, dropping event"),
        }
    }

    pub fn connected(&self, hello: &HelloOk) {
        if let Some(listener) = &self.listener {
            listener.on_connected(hello);
        }
    }

    pub fn disconnected(&self, code: u16, reason: &str) {
        if let Some(listener) = &self.listener {
            listener.on_disconnected(code, reason);
        }
    }
}
