//! Request correlation: ids for outbound requests, and the table of
//! requests still waiting for their response.

use std::collections::HashMap;
use std::time::Duration;

use gatelink_core::{id, ResponseFrame};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::error::GatewayError;
use crate::Result;

/// Reply channel of an API caller.
pub(crate) type ReplySender = oneshot::Sender<Result<Value>>;

/// Who is waiting on a request.
pub(crate) enum Waiter {
    /// An API caller, answered through its channel.
    Caller(ReplySender),
    /// The connection's own `connect` request; the driver takes the result.
    Handshake,
}

/// What happened when a request was settled.
#[derive(Debug)]
pub(crate) enum Settled {
    /// A caller got its answer.
    Delivered,
    /// The handshake request finished with this result.
    Handshake(Result<Value>),
    /// No such request (late, duplicate, or never ours).
    Unknown,
}

struct PendingRequest {
    method: String,
    waiter: Waiter,
    deadline: Option<Instant>,
    timeout: Duration,
}

/// Outstanding requests keyed by correlation id.
#[derive(Default)]
pub(crate) struct RequestCorrelator {
    pending: HashMap<String, PendingRequest>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new request and return its id. The id is a UUID v4 that is
    /// guaranteed not to collide with any request still pending.
    ///
    /// With a `timeout` the request expires that long from now; without one
    /// it waits until answered or rejected.
    pub fn register(&mut self, method: &str, waiter: Waiter, timeout: Option<Duration>) -> String {
        let mut request_id = id::uuid();
        while self.pending.contains_key(&request_id) {
            request_id = id::uuid();
        }
        self.pending.insert(
            request_id.clone(),
            PendingRequest {
                method: method.to_string(),
                waiter,
                deadline: timeout.map(|t| Instant::now() + t),
                timeout: timeout.unwrap_or_default(),
            },
        );
        request_id
    }

    /// Settle the request a response refers to.
    pub fn resolve(&mut self, response: ResponseFrame) -> Settled {
        let Some(request) = self.pending.remove(&response.id) else {
            debug!(id = %response.id, "ignoring response for unknown request");
            return Settled::Unknown;
        };
        debug!(id = %response.id, method = %request.method, ok = response.ok, "response received");
        let result = response.into_result().map_err(GatewayError::Rpc);
        settle(request.waiter, result)
    }

    /// Fail one request with `error`.
    pub fn reject(&mut self, request_id: &str, error: GatewayError) -> Settled {
        match self.pending.remove(request_id) {
            Some(request) => settle(request.waiter, Err(error)),
            None => Settled::Unknown,
        }
    }

    /// Fail every outstanding request with `Disconnected` and empty the table.
    pub fn reject_all(&mut self, reason: &str) -> usize {
        let count = self.pending.len();
        for (request_id, request) in self.pending.drain() {
            debug!(id = %request_id, method = %request.method, "rejecting pending request");
            if let Waiter::Caller(reply) = request.waiter {
                let _ = reply.send(Err(GatewayError::Disconnected(reason.to_string())));
            }
        }
        count
    }

    /// Earliest deadline among pending requests.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().filter_map(|r| r.deadline).min()
    }

    /// Time out every request whose deadline is at or before `now`.
    pub fn expire_due(&mut self, now: Instant) -> Vec<Settled> {
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, r)| r.deadline.is_some_and(|d| d <= now))
            .map(|(id, _)| id.clone())
            .collect();

        due.into_iter()
            .filter_map(|request_id| self.pending.remove(&request_id).map(|r| (request_id, r)))
            .map(|(request_id, request)| {
                debug!(id = %request_id, method = %request.method, "request timed out");
                let error = GatewayError::Timeout {
                    method: request.method,
                    timeout_ms: request.timeout.as_millis() as u64,
                };
                settle(request.waiter, Err(error))
            })
            .collect()
    }

    #[cfg(test)]
    pub fn contains(&self, request_id: &str) -> bool {
        self.pending.contains_key(request_id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn settle(waiter: Waiter, result: Result<Value>) -> Settled {
    match waiter {
        Waiter::Caller(reply) => {
            // The caller may have stopped waiting.
            let _ = reply.send(result);
            Settled::Delivered
        }
        Waiter::Handshake => Settled::Handshake(result),
    }
}
