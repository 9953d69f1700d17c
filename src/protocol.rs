//! Wire protocol between the overlay and the assistant backend.
//!
//! Every frame is a JSON text message shaped `{"type": <kind>, "payload": {...}}`.
//! Outbound messages are [`ClientMessage`] values, inbound ones decode into
//! [`ServerMessage`]. Both are built fresh per frame and never mutated.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Messages sent from the overlay to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Typed user input, optionally carrying an image attachment.
    TextInput {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_base64: Option<String>,
    },
    /// Recorded or uploaded audio, base64-encoded, with its media type.
    AudioInput { audio_base64: String, format: String },
    /// Ask the backend to abandon the current turn.
    Interrupt {},
}

impl ClientMessage {
    /// Wire tag of this message.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TextInput { .. } => "text_input",
            Self::AudioInput { .. } => "audio_input",
            Self::Interrupt {} => "interrupt",
        }
    }
}

/// Payload of an `audio_chunk` message: one spoken sentence of the reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioChunk {
    pub text: String,
    #[serde(default)]
    pub audio_base64: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
}

/// Messages received from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Assistant state as reported by the backend (`idle`, `thinking`, ...).
    StateUpdate { state: String },
    /// A reply sentence with optional speech audio and expression.
    AudioChunk(AudioChunk),
    /// Acknowledges an earlier `interrupt`.
    Canceled,
    /// Backend-side failure for the current turn.
    Error { info: String },
    /// Transcript of submitted speech, echoed back by the backend.
    TextInput { text: String },
    /// Any kind this client does not understand.
    Unknown { kind: String },
}

impl ServerMessage {
    /// Wire tag of this message.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::StateUpdate { .. } => "state_update",
            Self::AudioChunk(_) => "audio_chunk",
            Self::Canceled => "canceled",
            Self::Error { .. } => "error",
            Self::TextInput { .. } => "text_input",
            Self::Unknown { kind } => kind,
        }
    }
}

/// Reasons an inbound frame is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Not JSON, or JSON that is not an object.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// No string `type` field.
    #[error("frame has no message type")]
    MissingKind,
    /// A known kind whose payload does not have the expected shape.
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: String, reason: String },
}

#[derive(Deserialize)]
struct StatePayload {
    state: String,
}

#[derive(Deserialize)]
struct ErrorPayload {
    info: String,
}

#[derive(Deserialize)]
struct TextPayload {
    text: String,
}

/// Serialize an outbound message to its wire text.
///
/// # Errors
///
/// Only fails if serde_json cannot serialize the value, which does not
/// happen for the message shapes defined here.
pub fn encode(message: &ClientMessage) -> serde_json::Result<String> {
    serde_json::to_string(message)
}

/// Parse one inbound wire frame.
///
/// A missing or `null` payload is treated as an empty object.
///
/// # Errors
///
/// Returns a [`DecodeError`] when the frame is not a JSON object, has no
/// `type`, or carries a payload that does not match its kind.
pub fn decode(text: &str) -> Result<ServerMessage, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let Value::Object(mut envelope) = value else {
        return Err(DecodeError::Malformed("expected a JSON object".into()));
    };

    let kind = match envelope.remove("type") {
        Some(Value::String(kind)) => kind,
        _ => return Err(DecodeError::MissingKind),
    };

    let payload = match envelope.remove("payload") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(payload) => payload,
    };

    let message = match kind.as_str() {
        "state_update" => {
            let p: StatePayload = parse_payload(&kind, payload)?;
            ServerMessage::StateUpdate { state: p.state }
        }
        "audio_chunk" => ServerMessage::AudioChunk(parse_payload(&kind, payload)?),
        "canceled" => ServerMessage::Canceled,
        "error" => {
            let p: ErrorPayload = parse_payload(&kind, payload)?;
            ServerMessage::Error { info: p.info }
        }
        "text_input" => {
            let p: TextPayload = parse_payload(&kind, payload)?;
            ServerMessage::TextInput { text: p.text }
        }
        _ => ServerMessage::Unknown { kind },
    };
    Ok(message)
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    kind: &str,
    payload: Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(payload).map_err(|e| DecodeError::InvalidPayload {
        kind: kind.to_owned(),
        reason: e.to_string(),
    })
}
