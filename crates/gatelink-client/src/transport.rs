//! WebSocket transport.
//!
//! Owns one socket in a background task and reports what happens to it as
//! [`TransportSignal`]s. Knows nothing about requests or the handshake.

use futures::{SinkExt, StreamExt};
use gatelink_core::Frame;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tracing::{debug, warn};

/// Close code used when a socket ends without a close frame.
pub const ABNORMAL_CLOSE: u16 = 1006;

/// Close code used when a close frame carried no status.
pub const NO_STATUS_CLOSE: u16 = 1005;

/// Something that happened on a socket.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TransportEvent {
    /// The socket is open and frames may be sent.
    Open,
    /// A well-formed frame arrived.
    Message(Frame),
    /// The socket is gone. Always the last event of a generation.
    Closed { code: u16, reason: String },
    /// A socket-level failure. A `Closed` follows.
    Error(String),
}

/// A [`TransportEvent`] tagged with the connection attempt it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TransportSignal {
    pub generation: u64,
    pub event: TransportEvent,
}

enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Handle to one socket attempt.
pub(crate) struct Transport {
    generation: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
    open: bool,
    task: JoinHandle<()>,
}

impl Transport {
    /// Start connecting to `url`. Events arrive on `signals` tagged with
    /// `generation`.
    pub fn open(
        url: &str,
        generation: u64,
        signals: mpsc::UnboundedSender<TransportSignal>,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(url.to_string(), generation, outbound_rx, signals));
        Self {
            generation,
            outbound,
            open: false,
            task,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record that the `Open` signal for this generation was seen.
    pub fn mark_open(&mut self) {
        self.open = true;
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Send a frame. Returns false, sending nothing, when the socket is not
    /// open or the frame cannot be encoded.
    pub fn send(&self, frame: &Frame) -> bool {
        if !self.open {
            debug!(generation = self.generation, "dropping frame, socket not open");
            return false;
        }
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to encode frame");
                return false;
            }
        };
        self.outbound.send(Outbound::Text(text)).is_ok()
    }

    /// Close the socket. No `Closed` signal is emitted for a local close.
    ///
    /// Frames already passed to [`send`](Self::send) are written before the
    /// close frame. The returned handle finishes once the socket task has
    /// written the close frame and exited.
    pub fn close(self, code: u16, reason: &str) -> JoinHandle<()> {
        if self.open {
            let _ = self.outbound.send(Outbound::Close {
                code,
                reason: reason.to_string(),
            });
        } else {
            self.task.abort();
        }
        self.task
    }
}

async fn run_socket(
    url: String,
    generation: u64,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    signals: mpsc::UnboundedSender<TransportSignal>,
) {
    let emit = |event: TransportEvent| {
        let _ = signals.send(TransportSignal { generation, event });
    };

    debug!(url = %url, generation, "Connecting to WebSocket");
    let ws = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            let detail = format!("WebSocket connect failed: {}", e);
            emit(TransportEvent::Error(detail.clone()));
            emit(TransportEvent::Closed {
                code: ABNORMAL_CLOSE,
                reason: detail,
            });
            return;
        }
    };
    debug!(url = %url, generation, "WebSocket connected");
    emit(TransportEvent::Open);

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        let detail = format!("Failed to send: {}", e);
                        emit(TransportEvent::Error(detail.clone()));
                        emit(TransportEvent::Closed { code: ABNORMAL_CLOSE, reason: detail });
                        return;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    let _ = sink.close().await;
                    return;
                }
                // Handle dropped without an explicit close.
                None => {
                    let _ = sink.close().await;
                    return;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => match Frame::parse(&text) {
                    Some(frame) => emit(TransportEvent::Message(frame)),
                    None => debug!(generation, "dropping malformed frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((NO_STATUS_CLOSE, String::new()));
                    emit(TransportEvent::Closed { code, reason });
                    return;
                }
                // Ping/pong are answered by tungstenite; binary is not part of the protocol.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    let detail = format!("WebSocket error: {}", e);
                    emit(TransportEvent::Error(detail.clone()));
                    emit(TransportEvent::Closed { code: ABNORMAL_CLOSE, reason: detail });
                    return;
                }
                None => {
                    emit(TransportEvent::Closed {
                        code: ABNORMAL_CLOSE,
                        reason: "connection lost".to_string(),
                    });
                    return;
                }
            }
        }
    }
}
