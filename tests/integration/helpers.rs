//! Shared helpers for integration tests: a scripted in-process backend and
//! recording sinks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use neuro::config::NeuroConfig;
use neuro::sinks::{AvatarSink, ConversationHistory, Expression, SubtitleSink};
use neuro::SessionSinks;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// How long any single wait in these tests may take.
pub(crate) const TIMEOUT: Duration = Duration::from_secs(5);

/// A one-connection WebSocket backend driven by the test.
pub(crate) struct FakeBackend {
    pub url: String,
    to_client: mpsc::UnboundedSender<Message>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl FakeBackend {
    /// Bind on an ephemeral port and accept exactly one client.
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (to_client, mut outgoing) = mpsc::unbounded_channel::<Message>();
        let (received_tx, from_client) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("handshake");
            let (mut write, mut read) = ws.split();
            loop {
                tokio::select! {
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let _ = received_tx.send(text);
                        }
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => {}
                    },
                    Some(msg) = outgoing.recv() => {
                        let closing = matches!(msg, Message::Close(_));
                        if write.send(msg).await.is_err() || closing {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            url: format!("ws://{addr}/ws"),
            to_client,
            from_client,
        }
    }

    /// Send one raw text frame to the client.
    pub(crate) fn push(&self, frame: &str) {
        self.to_client
            .send(Message::Text(frame.to_owned()))
            .expect("backend task alive");
    }

    /// Close the connection from the server side.
    pub(crate) fn close(&self) {
        let _ = self.to_client.send(Message::Close(None));
    }

    /// Next text frame the client sent, parsed as JSON.
    pub(crate) async fn next_received(&mut self) -> serde_json::Value {
        let text = tokio::time::timeout(TIMEOUT, self.from_client.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("backend task ended");
        serde_json::from_str(&text).expect("client sent valid JSON")
    }
}

/// Config pointing at `url`, with fast reading delays.
pub(crate) fn fast_config(url: &str) -> NeuroConfig {
    let mut config = NeuroConfig::default();
    config.socket.url = url.to_owned();
    config.socket.connect_timeout_ms = 2_000;
    config.playback.reading_base_ms = 20;
    config.playback.reading_per_char_ms = 1;
    config.audio.enabled = false;
    config
}

/// Avatar and subtitle calls, rendered as strings in call order.
#[derive(Clone, Default)]
pub(crate) struct Screen {
    log: Arc<Mutex<Vec<String>>>,
}

impl Screen {
    pub(crate) fn log(&self) -> Vec<String> {
        self.log.lock().expect("screen log").clone()
    }

    pub(crate) fn subtitles(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|l| l.strip_prefix("subtitle:").map(str::to_owned))
            .collect()
    }
}

impl AvatarSink for Screen {
    fn show_expression(&self, expression: &Expression, active: bool) {
        self.log
            .lock()
            .expect("screen log")
            .push(format!("expression:{}:{active}", expression.name));
    }

    fn reset_expression(&self) {
        self.log.lock().expect("screen log").push("reset".into());
    }
}

impl SubtitleSink for Screen {
    fn set_subtitle(&self, text: &str) {
        self.log
            .lock()
            .expect("screen log")
            .push(format!("subtitle:{text}"));
    }
}

/// Sinks backed by a [`Screen`] and an in-memory history, no audio.
pub(crate) fn recording_sinks() -> (SessionSinks, Screen, Arc<ConversationHistory>) {
    let screen = Screen::default();
    let history = Arc::new(ConversationHistory::new());
    let sinks = SessionSinks {
        avatar: Arc::new(screen.clone()),
        subtitles: Arc::new(screen.clone()),
        history: history.clone(),
        audio: None,
    };
    (sinks, screen, history)
}

/// Poll `condition` every 10 ms until it holds or [`TIMEOUT`] elapses.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {TIMEOUT:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A `ws://` URL on a port nothing listens on.
pub(crate) fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    format!("ws://127.0.0.1:{port}/ws")
}
