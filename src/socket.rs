//! The single WebSocket connection to the assistant backend.
//!
//! [`SocketSession::open`] performs the handshake and spawns one background
//! task that owns the stream. Inbound frames are decoded and delivered, in
//! receipt order, on the typed [`SocketEvent`] channel returned from `open`.
//! Outbound messages are fire-and-forget: while the connection is not open
//! they are dropped without error, and there is no retry or redelivery.

use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SocketConfig;
use crate::error::Result;
use crate::protocol::{self, ClientMessage, ServerMessage};

/// Connection status of a [`SocketSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Handshake in progress.
    Connecting,
    /// Open; sends are transmitted.
    Connected,
    /// Closed locally or by the server.
    Closed,
    /// The handshake failed. There is no automatic retry.
    Failed(String),
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Closed => write!(f, "Closed"),
            Self::Failed(msg) => write!(f, "Failed: {msg}"),
        }
    }
}

/// Events delivered from the socket to its single subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A successfully decoded inbound message.
    Message(ServerMessage),
    /// The connection is gone. `reason` is `None` for a local close.
    Closed { reason: Option<String> },
}

/// Anything that can carry outbound messages to the backend.
///
/// [`SocketSession`] is the production implementation; the controller only
/// sees this trait.
pub trait Outbound: Send + Sync {
    /// Transmit `message`, or drop it if that is not currently possible.
    fn send(&self, message: &ClientMessage);
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One persistent connection, bounded by [`open`](Self::open) and
/// [`close`](Self::close). Dropping the session also closes the connection.
pub struct SocketSession {
    url: String,
    status: Arc<Mutex<ConnectionStatus>>,
    /// Encoded frames for the background task.
    outbound_tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SocketSession {
    /// Connect to `config.url`.
    ///
    /// Never fails: when the handshake errors or times out the session is
    /// returned in [`ConnectionStatus::Failed`] and a single
    /// [`SocketEvent::Closed`] carrying the reason is already queued on the
    /// event channel.
    pub async fn open(config: &SocketConfig) -> (Self, mpsc::UnboundedReceiver<SocketEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let status = Arc::new(Mutex::new(ConnectionStatus::Connecting));
        let cancel = CancellationToken::new();

        let attempt =
            tokio::time::timeout(config.connect_timeout(), connect_async(config.url.as_str()))
                .await;

        let task = match attempt {
            Ok(Ok((stream, _response))) => {
                info!(url = %config.url, "backend connected");
                set_status(&status, ConnectionStatus::Connected);

                let loop_status = Arc::clone(&status);
                let loop_cancel = cancel.clone();
                Some(tokio::spawn(async move {
                    connection_loop(stream, loop_status, outbound_rx, event_tx, loop_cancel).await;
                }))
            }
            Ok(Err(e)) => {
                fail_open(&status, &event_tx, &config.url, format!("connect: {e}"));
                None
            }
            Err(_) => {
                let reason = format!("connect timed out after {:?}", config.connect_timeout());
                fail_open(&status, &event_tx, &config.url, reason);
                None
            }
        };

        let session = Self {
            url: config.url.clone(),
            status,
            outbound_tx,
            cancel,
            task: Mutex::new(task),
        };
        (session, event_rx)
    }

    /// Endpoint this session was opened against.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.status.lock() {
            Ok(s) => s.clone(),
            Err(p) => p.into_inner().clone(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Close the connection if it is open. Safe to call repeatedly.
    pub async fn close(&self) {
        self.cancel.cancel();
        let handle = match self.task.lock() {
            Ok(mut t) => t.take(),
            Err(p) => p.into_inner().take(),
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("socket task ended abnormally: {e}");
            }
            info!(url = %self.url, "backend connection closed");
        }
    }
}

impl Outbound for SocketSession {
    fn send(&self, message: &ClientMessage) {
        if !self.is_open() {
            debug!(kind = message.kind(), "connection not open; dropping outbound message");
            return;
        }
        match protocol::encode(message) {
            Ok(json) => {
                // A closed receiver means the connection task already exited.
                if self.outbound_tx.send(json).is_err() {
                    debug!(kind = message.kind(), "connection task gone; dropping outbound message");
                }
            }
            Err(e) => warn!(kind = message.kind(), "failed to encode outbound message: {e}"),
        }
    }
}

impl Drop for SocketSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn set_status(status: &Mutex<ConnectionStatus>, next: ConnectionStatus) {
    match status.lock() {
        Ok(mut s) => *s = next,
        Err(p) => *p.into_inner() = next,
    }
}

fn fail_open(
    status: &Mutex<ConnectionStatus>,
    events: &mpsc::UnboundedSender<SocketEvent>,
    url: &str,
    reason: String,
) {
    warn!(url, "backend connection failed: {reason}");
    set_status(status, ConnectionStatus::Failed(reason.clone()));
    let _ = events.send(SocketEvent::Closed {
        reason: Some(reason),
    });
}

/// Pump frames in both directions until the connection ends or `cancel` fires.
async fn connection_loop(
    stream: WsStream,
    status: Arc<Mutex<ConnectionStatus>>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<SocketEvent>,
    cancel: CancellationToken,
) {
    let (mut write, mut read) = stream.split();

    let reason = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!("close frame not delivered: {e}");
                }
                break None;
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => dispatch(&text, &events),
                    Some(Ok(Message::Close(_))) | None => {
                        break Some("connection closed by server".to_owned());
                    }
                    Some(Err(e)) => break Some(format!("read error: {e}")),
                    Some(Ok(_)) => {} // Binary, Ping/Pong frames handled by tungstenite.
                }
            }
            Some(json) = outbound_rx.recv() => {
                if let Err(e) = write.send(Message::Text(json)).await {
                    break Some(format!("send error: {e}"));
                }
            }
        }
    };

    set_status(&status, ConnectionStatus::Closed);
    if let Some(ref reason) = reason {
        warn!("backend connection lost: {reason}");
    }
    let _ = events.send(SocketEvent::Closed { reason });
}

/// Decode one text frame and hand it to the subscriber.
fn dispatch(text: &str, events: &mpsc::UnboundedSender<SocketEvent>) {
    match decode_frame(text) {
        Ok(message) => {
            debug!(kind = message.kind(), "inbound message");
            let _ = events.send(SocketEvent::Message(message));
        }
        Err(e) => warn!("discarding malformed inbound frame: {e}"),
    }
}

fn decode_frame(text: &str) -> Result<ServerMessage> {
    Ok(protocol::decode(text)?)
}
