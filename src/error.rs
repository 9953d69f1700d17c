//! Error types for the overlay orchestrator.

use crate::protocol::DecodeError;

/// Top-level error type for the overlay client.
#[derive(Debug, thiserror::Error)]
pub enum NeuroError {
    /// Inbound frame could not be decoded into a server message.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Socket failed to open or dropped.
    #[error("connection error: {0}")]
    Connection(String),

    /// Audio resource failed while playing an utterance.
    #[error("playback error: {0}")]
    Playback(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, NeuroError>;
