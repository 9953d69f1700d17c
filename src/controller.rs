//! Session controller: maps backend messages onto assistant state and the
//! playback queue, and user actions onto outbound messages.
//!
//! Any new user turn implicitly interrupts the assistant turn in progress.
//! Text submissions only interrupt when something is actually playing; file
//! and voice submissions always do.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::playback::{PlaybackQueue, Utterance};
use crate::protocol::{AudioChunk, ClientMessage, ServerMessage};
use crate::runtime::RuntimeEvent;
use crate::sinks::{HistoryEntry, HistorySink, Role};
use crate::socket::Outbound;

/// Assistant state as last reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AssistantState {
    #[default]
    Idle,
    Thinking,
    Speaking,
    /// Any other value the backend sends, kept verbatim.
    Other(String),
}

impl AssistantState {
    pub fn parse(state: &str) -> Self {
        match state {
            "idle" => Self::Idle,
            "thinking" => Self::Thinking,
            "speaking" => Self::Speaking,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "idle",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for AssistantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file handed over by the upload or microphone surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub name: String,
    /// Declared media type, e.g. `image/png` or `audio/wav`.
    pub media_type: String,
    pub bytes: Bytes,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Wrap a finished microphone recording.
    pub fn recording(bytes: Bytes) -> Self {
        Self::new("voice_command.wav", "audio/wav", bytes)
    }

    pub fn is_audio(&self) -> bool {
        self.media_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("audio/")
    }
}

pub struct SessionController {
    state: AssistantState,
    queue: PlaybackQueue,
    outbound: Arc<dyn Outbound>,
    history: Arc<dyn HistorySink>,
    events: Option<broadcast::Sender<RuntimeEvent>>,
}

impl SessionController {
    pub fn new(
        queue: PlaybackQueue,
        outbound: Arc<dyn Outbound>,
        history: Arc<dyn HistorySink>,
        events: Option<broadcast::Sender<RuntimeEvent>>,
    ) -> Self {
        Self {
            state: AssistantState::Idle,
            queue,
            outbound,
            history,
            events,
        }
    }

    pub fn state(&self) -> &AssistantState {
        &self.state
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    /// True while the assistant is speaking or anything is queued.
    pub fn is_busy(&self) -> bool {
        self.state == AssistantState::Speaking || !self.queue.is_idle()
    }

    /// React to one inbound message.
    pub fn handle_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::StateUpdate { state } => {
                self.set_state(AssistantState::parse(&state));
            }
            ServerMessage::AudioChunk(chunk) => {
                self.set_state(AssistantState::Idle);
                self.record(Role::Assistant, chunk.text.clone());
                self.queue.enqueue(utterance_from(chunk));
            }
            ServerMessage::Canceled => {
                debug!("backend acknowledged interrupt");
            }
            ServerMessage::Error { info } => {
                warn!("backend reported an error: {info}");
                self.record(Role::System, format!("Error: {info}"));
                self.set_state(AssistantState::Idle);
            }
            ServerMessage::TextInput { text } => {
                self.record(Role::User, text);
            }
            ServerMessage::Unknown { kind } => {
                warn!(kind, "ignoring unknown message type");
            }
        }
    }

    /// Send typed input. Blank input is ignored.
    pub fn submit_text(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        if self.is_busy() {
            self.interrupt();
        }
        self.record(Role::User, text.to_owned());
        self.outbound.send(&ClientMessage::TextInput {
            text: text.to_owned(),
            image_base64: None,
        });
    }

    /// Send an uploaded file. Audio goes up as `audio_input`, anything else
    /// as an image attachment on a `text_input`.
    pub fn submit_file(&mut self, file: FileUpload) {
        self.interrupt();

        let encoded = STANDARD.encode(&file.bytes);
        let message = if file.is_audio() {
            ClientMessage::AudioInput {
                audio_base64: encoded,
                format: file.media_type.clone(),
            }
        } else {
            ClientMessage::TextInput {
                text: format!("[Uploaded file: {}]", file.name),
                image_base64: Some(encoded),
            }
        };

        info!(
            name = %file.name,
            media_type = %file.media_type,
            size = file.bytes.len(),
            "submitting file"
        );
        self.record(Role::User, format!("[Uploaded file: {}]", file.name));
        self.outbound.send(&message);
    }

    /// Microphone capture started: stop the assistant so it does not talk
    /// over the user.
    pub fn begin_recording(&mut self) {
        self.interrupt();
    }

    pub fn submit_recording(&mut self, bytes: Bytes) {
        self.submit_file(FileUpload::recording(bytes));
    }

    /// Stop local playback and tell the backend to abandon its turn.
    pub fn interrupt(&mut self) {
        let was_busy = self.is_busy();
        self.queue.interrupt();
        self.outbound.send(&ClientMessage::Interrupt {});
        if was_busy {
            self.emit(RuntimeEvent::Interrupted);
        }
    }

    /// The backend connection is gone for good.
    pub fn connection_lost(&mut self, reason: &str) {
        self.record(Role::System, format!("Connection lost: {reason}"));
        self.set_state(AssistantState::Idle);
    }

    fn set_state(&mut self, next: AssistantState) {
        if self.state == next {
            return;
        }
        debug!(from = %self.state, to = %next, "assistant state");
        self.state = next.clone();
        self.emit(RuntimeEvent::AssistantState(next));
    }

    fn record(&self, role: Role, content: String) {
        self.history.append(HistoryEntry::new(role, content));
    }

    fn emit(&self, event: RuntimeEvent) {
        if let Some(ref tx) = self.events {
            // No receivers is fine.
            let _ = tx.send(event);
        }
    }
}

fn utterance_from(chunk: AudioChunk) -> Utterance {
    let mut utterance = Utterance::new(chunk.text);
    if let Some(encoded) = chunk.audio_base64.filter(|a| !a.is_empty()) {
        match STANDARD.decode(encoded.as_bytes()) {
            Ok(audio) => utterance = utterance.with_audio(Bytes::from(audio)),
            Err(e) => warn!("invalid audio in audio_chunk, using reading delay: {e}"),
        }
    }
    if let Some(expression) = chunk.expression.filter(|e| !e.is_empty()) {
        utterance = utterance.with_expression(expression);
    }
    utterance
}
