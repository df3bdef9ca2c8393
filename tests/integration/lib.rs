//! Scripted mock gateway for integration tests.
//!
//! [`MockGateway`] listens on a loopback port and hands every accepted
//! WebSocket to the test as a [`MockConnection`], which the test drives
//! frame by frame.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use gatelink_client::{ConnectionListener, GatewayClient};
use gatelink_core::{
    ConnectionStatus, ErrorInfo, EventFrame, Frame, HelloOk, RequestFrame, ResponseFrame,
    CONNECT_CHALLENGE_EVENT, CONNECT_METHOD,
};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::WebSocketStream;

/// Default wait for anything a test expects to happen.
pub const WAIT: Duration = Duration::from_secs(5);

/// A gateway that accepts connections and lets the test script them.
pub struct MockGateway {
    addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<MockConnection>,
    task: JoinHandle<()>,
}

impl MockGateway {
    /// Bind to an ephemeral loopback port and start accepting.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (tx, connections) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                    if tx.send(MockConnection { ws }).is_err() {
                        break;
                    }
                }
            }
        });
        Self {
            addr,
            connections,
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Wait for the client's next connection attempt.
    pub async fn next_connection(&mut self) -> MockConnection {
        tokio::time::timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("accept loop stopped")
    }

    /// Wait up to `within` for a connection; `None` if none arrives.
    pub async fn try_next_connection(&mut self, within: Duration) -> Option<MockConnection> {
        tokio::time::timeout(within, self.connections.recv())
            .await
            .ok()
            .flatten()
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// One accepted client socket.
pub struct MockConnection {
    ws: WebSocketStream<TcpStream>,
}

impl MockConnection {
    pub async fn send_frame(&mut self, frame: Frame) {
        let text = frame.to_text().expect("encode frame");
        self.send_raw(&text).await;
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string()))
            .await
            .expect("send to client");
    }

    pub async fn send_event(&mut self, event: EventFrame) {
        self.send_frame(event.into()).await;
    }

    pub async fn send_challenge(&mut self, nonce: &str) {
        self.send_event(EventFrame::new(CONNECT_CHALLENGE_EVENT, json!({ "nonce": nonce })))
            .await;
    }

    /// Next frame from the client; `None` once the socket closes.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => return Frame::parse(&text),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    /// Next request from the client, failing the test on anything else.
    pub async fn recv_request(&mut self) -> RequestFrame {
        match tokio::time::timeout(WAIT, self.recv_frame()).await {
            Ok(Some(Frame::Req(request))) => request,
            Ok(other) => panic!("expected a request, got {:?}", other),
            Err(_) => panic!("timed out waiting for a request"),
        }
    }

    /// Close code the client sends, or `None` if the socket just ends.
    pub async fn recv_close(&mut self) -> Option<u16> {
        loop {
            match tokio::time::timeout(WAIT, self.ws.next()).await.ok()?? {
                Ok(Message::Close(frame)) => return frame.map(|f| u16::from(f.code)),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }

    pub async fn respond_ok(&mut self, id: &str, payload: Value) {
        self.send_frame(ResponseFrame::success(id, payload).into()).await;
    }

    pub async fn respond_err(&mut self, id: &str, error: ErrorInfo) {
        self.send_frame(ResponseFrame::failure(id, error).into()).await;
    }

    /// Run the challenge and accept `connect` with `hello`. Returns the
    /// client's `connect` request.
    pub async fn handshake_with(&mut self, nonce: &str, hello: Value) -> RequestFrame {
        self.send_challenge(nonce).await;
        let request = self.recv_request().await;
        assert_eq!(request.method, CONNECT_METHOD);
        self.respond_ok(&request.id, hello).await;
        request
    }

    /// Handshake with a minimal `hello-ok`.
    pub async fn handshake(&mut self) -> RequestFrame {
        self.handshake_with("nonce-1", json!({ "protocol": 3 })).await
    }

    /// Close from the gateway side.
    pub async fn close(mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        let _ = self.ws.close(Some(frame)).await;
    }
}

/// Wait until the client's status satisfies `pred`.
pub async fn wait_for_status(
    client: &GatewayClient,
    pred: impl Fn(&ConnectionStatus) -> bool,
) -> ConnectionStatus {
    let mut rx = client.watch_status();
    let result = tokio::time::timeout(WAIT, async {
        loop {
            let current = rx.borrow_and_update().clone();
            if pred(&current) {
                return current;
            }
            rx.changed().await.expect("client dropped");
        }
    })
    .await;
    match result {
        Ok(status) => status,
        Err(_) => panic!("status never matched; last was {}", client.status()),
    }
}

/// What a [`RecordingListener`] saw.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Event(EventFrame),
    Connected(HelloOk),
    Disconnected(u16, String),
    Gap(u64, u64),
}

/// Listener that forwards every callback to a channel.
pub struct RecordingListener {
    tx: mpsc::UnboundedSender<Observed>,
}

impl RecordingListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Observed>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl ConnectionListener for RecordingListener {
    fn on_event(&self, event: &EventFrame) {
        let _ = self.tx.send(Observed::Event(event.clone()));
    }

    fn on_connected(&self, hello: &HelloOk) {
        let _ = self.tx.send(Observed::Connected(hello.clone()));
    }

    fn on_disconnected(&self, code: u16, reason: &str) {
        let _ = self.tx.send(Observed::Disconnected(code, reason.to_string()));
    }

    fn on_gap(&self, expected: u64, received: u64) {
        let _ = self.tx.send(Observed::Gap(expected, received));
    }
}

/// Next observation, failing the test if none arrives in time.
pub async fn next_observed(rx: &mut mpsc::UnboundedReceiver<Observed>) -> Observed {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for listener callback")
        .expect("listener dropped")
}
