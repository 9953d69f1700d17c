//! One overlay session: a backend connection plus the playback state it
//! drives, from [`Session::open`] to [`Session::close`].
//!
//! The session loop handles one event at a time, in receipt order, whether
//! it comes from the backend or from the user.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

use crate::config::NeuroConfig;
use crate::controller::{FileUpload, SessionController};
use crate::error::{NeuroError, Result};
use crate::playback::{AudioOutput, ExpressionController, PlaybackQueue};
use crate::runtime::RuntimeEvent;
use crate::sinks::{AvatarSink, HistorySink, SubtitleSink};
use crate::socket::{ConnectionStatus, Outbound, SocketEvent, SocketSession};

/// External surfaces the session drives.
#[derive(Clone)]
pub struct SessionSinks {
    pub avatar: Arc<dyn AvatarSink>,
    pub subtitles: Arc<dyn SubtitleSink>,
    pub history: Arc<dyn HistorySink>,
    /// Speaker output. `None` plays every utterance as a reading pause.
    pub audio: Option<Arc<dyn AudioOutput>>,
}

/// Something the user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    SubmitText(String),
    SubmitFile(FileUpload),
    /// Microphone capture started.
    BeginRecording,
    /// Microphone capture finished with these WAV bytes.
    SubmitRecording(Bytes),
    Interrupt,
    Shutdown,
}

/// Why [`Session::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user asked to quit, or the action channel closed.
    Shutdown,
    /// The backend connection failed or dropped. There is no reconnect.
    Disconnected { reason: String },
}

impl SessionEnd {
    /// # Errors
    ///
    /// Returns [`NeuroError::Connection`] for a disconnect.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Shutdown => Ok(()),
            Self::Disconnected { reason } => Err(NeuroError::Connection(reason)),
        }
    }
}

pub struct Session {
    socket: Arc<SocketSession>,
    socket_events: mpsc::UnboundedReceiver<SocketEvent>,
    controller: SessionController,
    events: Option<broadcast::Sender<RuntimeEvent>>,
    closed: bool,
}

impl Session {
    /// Connect to the configured backend and set up playback.
    ///
    /// A failed connection does not fail `open`; the session starts closed
    /// and [`run`](Self::run) returns [`SessionEnd::Disconnected`] at once.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NeuroError::Config`] if `config` is invalid.
    pub async fn open(
        config: &NeuroConfig,
        sinks: SessionSinks,
        events: Option<broadcast::Sender<RuntimeEvent>>,
    ) -> Result<Self> {
        config.validate()?;

        emit(&events, RuntimeEvent::Connection(ConnectionStatus::Connecting));
        let (socket, socket_events) = SocketSession::open(&config.socket).await;
        let socket = Arc::new(socket);
        emit(&events, RuntimeEvent::Connection(socket.status()));

        let expressions = ExpressionController::new(&config.expression, sinks.avatar);
        let queue = PlaybackQueue::new(
            config.playback.clone(),
            expressions,
            sinks.subtitles,
            sinks.audio,
        );
        let outbound: Arc<dyn Outbound> = socket.clone();
        let controller = SessionController::new(queue, outbound, sinks.history, events.clone());

        Ok(Self {
            socket,
            socket_events,
            controller,
            events,
            closed: false,
        })
    }

    pub fn status(&self) -> ConnectionStatus {
        self.socket.status()
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Process backend messages and user actions until shutdown or
    /// disconnect, then close the session.
    pub async fn run(&mut self, mut actions: mpsc::Receiver<UserAction>) -> SessionEnd {
        let end = loop {
            tokio::select! {
                event = self.socket_events.recv() => match event {
                    Some(SocketEvent::Message(message)) => {
                        self.controller.handle_server_message(message);
                    }
                    Some(SocketEvent::Closed { reason }) => {
                        let reason = reason.unwrap_or_else(|| "connection closed".to_owned());
                        self.controller.connection_lost(&reason);
                        break SessionEnd::Disconnected { reason };
                    }
                    None => {
                        let reason = "connection task ended".to_owned();
                        self.controller.connection_lost(&reason);
                        break SessionEnd::Disconnected { reason };
                    }
                },
                action = actions.recv() => match action {
                    Some(UserAction::Shutdown) | None => break SessionEnd::Shutdown,
                    Some(action) => self.apply(action),
                },
            }
        };

        info!(?end, "session ended");
        self.close().await;
        end
    }

    fn apply(&mut self, action: UserAction) {
        match action {
            UserAction::SubmitText(text) => self.controller.submit_text(&text),
            UserAction::SubmitFile(file) => self.controller.submit_file(file),
            UserAction::BeginRecording => self.controller.begin_recording(),
            UserAction::SubmitRecording(bytes) => self.controller.submit_recording(bytes),
            UserAction::Interrupt => self.controller.interrupt(),
            UserAction::Shutdown => {}
        }
    }

    /// Stop playback and close the connection. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.controller.queue().interrupt();
        self.socket.close().await;
        emit(&self.events, RuntimeEvent::Connection(self.socket.status()));
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // The socket closes through its own Drop; spawned drain tasks do not.
        if !self.closed {
            self.controller.queue().interrupt();
        }
    }
}

fn emit(events:&Option<broadcast::Sender<RuntimeEvent>>, event: RuntimeEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}
