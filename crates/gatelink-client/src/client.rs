//! The gateway client.
//!
//! [`GatewayClient`] is a cheap, cloneable handle. All connection state
//! lives in a single driver task that owns the socket, the pending request
//! table, the reconnect supervisor, and the event dispatcher; handles talk
//! to it over a command channel. Because only the driver touches that
//! state, lifecycle changes are applied one at a time in arrival order.

use std::sync::Arc;
use std::time::Duration;

use gatelink_core::{
    ChallengePayload, ConnectionState, ConnectionStatus, EventFrame, Frame, HelloOk, RequestFrame,
    CONNECT_CHALLENGE_EVENT, CONNECT_METHOD,
};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::dispatch::{ConnectionListener, EventDispatcher};
use crate::error::GatewayError;
use crate::handshake::{self, HandshakeState};
use crate::identity::IdentityManager;
use crate::options::ClientOptions;
use crate::pending::{RequestCorrelator, Settled, Waiter};
use crate::store::IdentityStore;
use crate::supervisor::{Backoff, Phase, Supervisor};
use crate::transport::{Transport, TransportEvent, TransportSignal, ABNORMAL_CLOSE};
use crate::Result;

/// Close code sent when the handshake fails.
pub const HANDSHAKE_FAILED_CLOSE: u16 = 4008;

/// Close code sent for a normal client-initiated close.
const NORMAL_CLOSE: u16 = 1000;

/// Close code the gateway uses for a planned restart.
const SERVICE_RESTART_CLOSE: u16 = 1012;

/// How long [`GatewayClient::shutdown`] waits for the close frame to be written.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

enum Command {
    Connect,
    Disconnect {
        /// Answered once the socket has been closed.
        done: Option<oneshot::Sender<()>>,
    },
    Call {
        method: String,
        params: Value,
        timeout: Option<Duration>,
        reply: oneshot::Sender<Result<Value>>,
    },
    Notify {
        method: String,
        params: Value,
    },
    SetListener(Option<Arc<dyn ConnectionListener>>),
}

/// Handle to a gateway connection.
///
/// Creating a client spawns its driver task, so it must happen inside a
/// Tokio runtime. The driver stops once every handle is dropped.
#[derive(Clone)]
pub struct GatewayClient {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    request_timeout: Duration,
}

impl GatewayClient {
    /// Create a client. Nothing connects until [`connect`](Self::connect).
    pub fn new(options: ClientOptions, store: Arc<dyn IdentityStore>) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(ConnectionStatus::default());
        let request_timeout = options.request_timeout;
        let driver = Driver::new(options, IdentityManager::new(store), commands_rx, status_tx);
        tokio::spawn(driver.run());
        Self {
            commands,
            status,
            request_timeout,
        }
    }

    /// Start connecting, and keep reconnecting until [`disconnect`](Self::disconnect).
    pub fn connect(&self) -> Result<()> {
        self.send(Command::Connect)
    }

    /// Close the connection and stop reconnecting. Pending requests fail
    /// with [`GatewayError::Disconnected`].
    pub fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect { done: None })
    }

    /// Like [`disconnect`](Self::disconnect), but wait until the socket is
    /// closed. Everything sent before this call, such as a
    /// [`notify`](Self::notify), is on the wire when it returns.
    ///
    /// Call this before the runtime shuts down, or queued frames are lost.
    pub async fn shutdown(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Disconnect { done: Some(done) })?;
        rx.await.map_err(|_| GatewayError::Closed)
    }

    /// Call `method` with the default request timeout.
    pub async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        self.rpc_with_timeout(method, params, self.request_timeout).await
    }

    /// Call `method`, failing with [`GatewayError::Timeout`] after `timeout`.
    ///
    /// Fails immediately with [`GatewayError::NotConnected`] unless the
    /// handshake has completed.
    pub async fn rpc_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Call {
            method: method.to_string(),
            params,
            timeout: Some(timeout),
            reply,
        })?;
        rx.await.map_err(|_| GatewayError::Closed)?
    }

    /// Send a request without waiting for its response. Dropped silently
    /// when not connected.
    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.send(Command::Notify {
            method: method.to_string(),
            params,
        })
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected()
    }

    /// Wait until the handshake completes, up to `timeout`.
    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<()> {
        let mut status = self.status.clone();
        let waited = tokio::time::timeout(timeout, async {
            status.wait_for(ConnectionStatus::is_connected).await.map(|_| ())
        })
        .await;
        match waited {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(GatewayError::Closed),
            Err(_) => Err(GatewayError::Timeout {
                method: CONNECT_METHOD.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Register the listener for events and lifecycle callbacks, replacing
    /// any previous one.
    pub fn set_listener(&self, listener: Arc<dyn ConnectionListener>) -> Result<()> {
        self.send(Command::SetListener(Some(listener)))
    }

    /// Remove the listener; events are dropped until a new one is set.
    pub fn clear_listener(&self) -> Result<()> {
        self.send(Command::SetListener(None))
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| GatewayError::Closed)
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("status", &*self.status.borrow())
            .finish()
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct Driver {
    options: ClientOptions,
    identity: IdentityManager,
    commands: mpsc::UnboundedReceiver<Command>,
    signals_tx: mpsc::UnboundedSender<TransportSignal>,
    signals: mpsc::UnboundedReceiver<TransportSignal>,
    status: watch::Sender<ConnectionStatus>,
    transport: Option<Transport>,
    generation: u64,
    supervisor: Supervisor,
    pending: RequestCorrelator,
    dispatcher: EventDispatcher,
    handshake: HandshakeState,
    retry_at: Option<Instant>,
    transport_error: Option<String>,
}

impl Driver {
    fn new(
        options: ClientOptions,
        identity: IdentityManager,
        commands: mpsc::UnboundedReceiver<Command>,
        status: watch::Sender<ConnectionStatus>,
    ) -> Self {
        let (signals_tx, signals) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new(Backoff::from_settings(&options.reconnect));
        Self {
            options,
            identity,
            commands,
            signals_tx,
            signals,
            status,
            transport: None,
            generation: 0,
            supervisor,
            pending: RequestCorrelator::new(),
            dispatcher: EventDispatcher::new(),
            handshake: HandshakeState::Idle,
            retry_at: None,
            transport_error: None,
        }
    }

    async fn run(mut self) {
        loop {
            let request_deadline = self.pending.next_deadline();
            let challenge_deadline = self.handshake.challenge_deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                Some(signal) = self.signals.recv() => self.handle_signal(signal).await,
                _ = sleep_until_opt(self.retry_at) => self.retry_elapsed(),
                _ = sleep_until_opt(challenge_deadline) => self.challenge_timed_out(),
                _ = sleep_until_opt(request_deadline) => self.expire_requests().await,
            }
        }
        debug!("gateway client driver stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                if self.supervisor.connect() {
                    self.retry_at = None;
                    self.open_transport();
                }
            }
            Command::Disconnect { done } => {
                let closing = self.stop("client disconnect");
                if let Some(done) = done {
                    tokio::spawn(async move {
                        if let Some(closing) = closing {
                            if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, closing).await.is_err() {
                                warn!("timed out writing close frame");
                            }
                        }
                        let _ = done.send(());
                    });
                }
            }
            Command::Call {
                method,
                params,
                timeout,
                reply,
            } => self.call(method, params, timeout, reply),
            Command::Notify { method, params } => self.notify(method, params),
            Command::SetListener(listener) => self.dispatcher.set_listener(listener),
        }
    }

    fn call(
        &mut self,
        method: String,
        params: Value,
        timeout: Option<Duration>,
        reply: oneshot::Sender<Result<Value>>,
    ) {
        if !self.handshake.is_done() {
            let _ = reply.send(Err(GatewayError::NotConnected));
            return;
        }
        let timeout = timeout.unwrap_or(self.options.request_timeout);
        let request_id = self.pending.register(&method, Waiter::Caller(reply), Some(timeout));
        debug!(id = %request_id, method = %method, "sending request");
        let frame = Frame::from(RequestFrame::new(request_id.clone(), method).with_params(params));
        if !self.send_frame(&frame) {
            self.pending.reject(
                &request_id,
                GatewayError::TransportError("failed to send request".to_string()),
            );
        }
    }

    fn notify(&mut self, method: String, params: Value) {
        if !self.handshake.is_done() {
            debug!(method = %method, "not connected, dropping notification");
            return;
        }
        let frame = Frame::from(RequestFrame::new(gatelink_core::id::uuid(), method).with_params(params));
        self.send_frame(&frame);
    }

    fn send_frame(&self, frame: &Frame) -> bool {
        self.transport.as_ref().is_some_and(|t| t.send(frame))
    }

    fn set_status(&self, status: ConnectionStatus) {
        debug!(status = %status, "connection status");
        self.status.send_replace(status);
    }

    fn open_transport(&mut self) {
        if let Some(previous) = self.transport.take() {
            let _ = previous.close(NORMAL_CLOSE, "reconnecting");
        }
        self.generation += 1;
        self.transport_error = None;
        self.dispatcher.reset_sequence();
        self.handshake = HandshakeState::AwaitingChallenge {
            deadline: Instant::now() + self.options.challenge_timeout,
        };
        info!(url = %self.options.url, attempt = self.generation, "connecting to gateway");
        self.set_status(ConnectionStatus::new(ConnectionState::Connecting));
        self.transport = Some(Transport::open(
            &self.options.url,
            self.generation,
            self.signals_tx.clone(),
        ));
    }

    async fn handle_signal(&mut self, signal: TransportSignal) {
        let current = self.transport.as_ref().map(Transport::generation);
        if current != Some(signal.generation) {
            debug!(generation = signal.generation, "ignoring signal from stale socket");
            return;
        }
        match signal.event {
            TransportEvent::Open => {
                if let Some(transport) = self.transport.as_mut() {
                    transport.mark_open();
                }
                debug!("socket open, awaiting challenge");
            }
            TransportEvent::Message(frame) => self.handle_frame(frame).await,
            TransportEvent::Error(detail) => {
                warn!(error = %detail, "transport error");
                self.transport_error = Some(detail);
            }
            TransportEvent::Closed { code, reason } => {
                info!(code, reason = %reason, "gateway connection closed");
                self.transport = None;
                self.connection_lost(code, &reason, None);
            }
        }
    }

    async fn handle_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Res(response) => {
                if let Settled::Handshake(result) = self.pending.resolve(response) {
                    self.finish_handshake(result).await;
                }
            }
            Frame::Event(event) if event.event == CONNECT_CHALLENGE_EVENT => {
                self.handle_challenge(&event).await;
            }
            Frame::Event(event) => {
                if self.handshake.is_done() {
                    self.dispatcher.dispatch(&event);
                } else {
                    debug!(event = %event.event, "dropping event received before handshake");
                }
            }
            Frame::Req(request) => {
                debug!(method = %request.method, "ignoring request frame from gateway");
            }
        }
    }

    async fn handle_challenge(&mut self, event: &EventFrame) {
        if self.handshake.challenge_deadline().is_none() {
            debug!("ignoring challenge outside of handshake");
            return;
        }
        let nonce = ChallengePayload::from_payload(&event.payload).nonce;

        let identity = match self.identity.get_or_create().await {
            Ok(identity) => identity,
            Err(e @ GatewayError::CryptoUnavailable(_)) => {
                error!(error = %e, "device identity unavailable, giving up");
                self.halt(e.to_string());
                return;
            }
            Err(e) => {
                error!(error = %e, "failed to load device identity");
                self.fail_connection(e.to_string());
                return;
            }
        };

        let prepared = handshake::prepare_connect(
            &self.options,
            &identity,
            self.identity.store().as_ref(),
            nonce,
        )
        .await;
        let params = match serde_json::to_value(&prepared.params) {
            Ok(params) => params,
            Err(e) => {
                self.fail_connection(GatewayError::from(e).to_string());
                return;
            }
        };

        let request_id = self.pending.register(
            CONNECT_METHOD,
            Waiter::Handshake,
            Some(self.options.request_timeout),
        );
        self.handshake = HandshakeState::InFlight {
            used_device_token: prepared.used_device_token,
        };
        debug!(id = %request_id, device_id = %identity.device_id(), "sending connect");
        let frame = Frame::from(RequestFrame::new(request_id.clone(), CONNECT_METHOD).with_params(params));
        if !self.send_frame(&frame) {
            self.pending.reject(&request_id, GatewayError::NotConnected);
            self.fail_connection("failed to send connect request".to_string());
        }
    }

    async fn finish_handshake(&mut self, result: Result<Value>) {
        let HandshakeState::InFlight { used_device_token } = self.handshake else {
            return;
        };
        let identity = match self.identity.get_or_create().await {
            Ok(identity) => identity,
            Err(e) => {
                self.fail_connection(e.to_string());
                return;
            }
        };
        let store = Arc::clone(self.identity.store());

        match result {
            Ok(payload) => {
                let hello = HelloOk::from_payload(&payload);
                handshake::record_hello(store.as_ref(), &identity, &self.options, &hello).await;
                self.handshake = HandshakeState::Done;
                self.supervisor.handshake_succeeded();
                info!(protocol = hello.protocol, "gateway handshake complete");
                self.set_status(ConnectionStatus::new(ConnectionState::Connected));
                self.dispatcher.connected(&hello);
            }
            Err(err) => {
                let err = match err {
                    GatewayError::Rpc(info) => GatewayError::HandshakeRejected(info),
                    other => other,
                };
                warn!(error = %err, "gateway handshake failed");
                if used_device_token {
                    handshake::forget_device_token(store.as_ref(), &identity, &self.options).await;
                }
                let message = match err.server_error() {
                    Some(info) => info.message.clone(),
                    None => err.to_string(),
                };
                self.fail_connection(message);
            }
        }
    }

    fn challenge_timed_out(&mut self) {
        let expired = self
            .handshake
            .challenge_deadline()
            .is_some_and(|deadline| deadline <= Instant::now());
        if expired {
            warn!(
                timeout_ms = self.options.challenge_timeout.as_millis() as u64,
                "no connect challenge from gateway"
            );
            self.fail_connection("connect challenge timeout".to_string());
        }
    }

    async fn expire_requests(&mut self) {
        for settled in self.pending.expire_due(Instant::now()) {
            if let Settled::Handshake(result) = settled {
                self.finish_handshake(result).await;
            }
        }
    }

    fn retry_elapsed(&mut self) {
        self.retry_at = None;
        if self.supervisor.retry_elapsed() {
            self.open_transport();
        }
    }

    /// Close the socket after a failed attempt and report `message`.
    fn fail_connection(&mut self, message: String) {
        if let Some(transport) = self.transport.take() {
            let _ = transport.close(HANDSHAKE_FAILED_CLOSE, "connect failed");
        }
        self.connection_lost(HANDSHAKE_FAILED_CLOSE, "connect failed", Some(message));
    }

    /// The socket is gone: settle everything tied to it and schedule a retry.
    fn connection_lost(&mut self, code: u16, reason: &str, error: Option<String>) {
        let was_connected = self.supervisor.phase() == Phase::Connected;
        self.handshake = HandshakeState::Idle;

        let rejected = self
            .pending
            .reject_all(&format!("gateway closed ({}): {}", code, reason));
        if rejected > 0 {
            debug!(rejected, "rejected pending requests");
        }

        let clean = error.is_none()
            && self.transport_error.is_none()
            && was_connected
            && code != ABNORMAL_CLOSE;
        if clean || (code == SERVICE_RESTART_CLOSE && error.is_none()) {
            self.set_status(ConnectionStatus::new(ConnectionState::Disconnected));
        } else {
            let message = error
                .or_else(|| self.transport_error.take())
                .unwrap_or_else(|| format!("disconnected ({}): {}", code, reason));
            self.set_status(ConnectionStatus::error(message));
        }

        if was_connected {
            self.dispatcher.disconnected(code, reason);
        }

        if let Some(delay) = self.supervisor.connection_lost() {
            info!(delay_ms = delay.as_millis() as u64, "scheduling reconnect");
            self.retry_at = Some(Instant::now() + delay);
        }
    }

    /// Stop for good after an unrecoverable failure.
    fn halt(&mut self, message: String) {
        self.supervisor.disconnect();
        self.retry_at = None;
        if let Some(transport) = self.transport.take() {
            let _ = transport.close(HANDSHAKE_FAILED_CLOSE, "connect failed");
        }
        self.handshake = HandshakeState::Idle;
        self.pending.reject_all(&message);
        self.set_status(ConnectionStatus::error(message));
    }

    /// Close for good. Returns the socket task, if there was a socket, so a
    /// caller can wait for the close frame to be written.
    fn stop(&mut self, reason: &str) -> Option<JoinHandle<()>> {
        let was_connected = self.supervisor.phase() == Phase::Connected;
        self.supervisor.disconnect();
        self.retry_at = None;
        let closing = self
            .transport
            .take()
            .map(|transport| transport.close(NORMAL_CLOSE, reason));
        self.handshake = HandshakeState::Idle;
        self.pending.reject_all(reason);
        info!("disconnected from gateway");
        self.set_status(ConnectionStatus::new(ConnectionState::Disconnected));
        if was_connected {
            self.dispatcher.disconnected(NORMAL_CLOSE, reason);
        }
        closing
    }

    fn shutdown(&mut self) {
        let _ = self.stop("client dropped");
    }
}
