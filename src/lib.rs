//! Neuro: streaming response orchestrator for an avatar overlay chat client.
//!
//! The overlay exchanges text, audio and images with an assistant backend
//! over one WebSocket and plays the spoken replies back in lockstep with
//! subtitles and avatar expressions:
//! User action → Session → Socket → backend → Socket → Controller → Playback
//!
//! # Architecture
//!
//! - **Protocol**: `{type, payload}` JSON envelopes ([`protocol`])
//! - **Socket**: one connection, typed inbound event channel, fire-and-forget sends
//! - **Playback**: FIFO utterance queue driving audio, subtitles and expressions
//! - **Controller**: maps backend messages and user actions onto the above
//! - **Session**: owns the socket and controller, runs the event loop
//!
//! Rendering the avatar, capturing the microphone and drawing the UI are left
//! to the implementations of the [`sinks`] traits.

pub mod config;
pub mod controller;
pub mod error;
pub mod neuro_dirs;
pub mod playback;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod sinks;
pub mod socket;


pub use config::NeuroConfig;
pub use controller::{AssistantState, FileUpload, SessionController};
pub use error::{NeuroError, Result};
pub use playback::{PlaybackQueue, Utterance};
pub use protocol::{ClientMessage, DecodeError, ServerMessage};
pub use runtime::RuntimeEvent;
pub use session::{Session, SessionEnd, SessionSinks, UserAction};
pub use socket::{ConnectionStatus, SocketSession};
