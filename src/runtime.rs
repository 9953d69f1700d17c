//! Runtime events emitted by the session for UI and observability.
//!
//! Emitted without waiting on receivers; a missing or lagging receiver never
//! affects playback.

use crate::controller::AssistantState;
use crate::socket::ConnectionStatus;

/// Events that describe what the session is doing "right now".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// Assistant state changed (drives the "thinking..." indicator).
    AssistantState(AssistantState),
    /// Backend connection changed.
    Connection(ConnectionStatus),
    /// Playback was cut short by an interrupt.
    Interrupted,
}
