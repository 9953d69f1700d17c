//! Collaborators the orchestrator drives but does not own.
//!
//! The avatar renderer, the subtitle surface and the conversation history
//! panel live outside this crate. They are reached through the traits below;
//! implementations must not call back into the playback queue from inside a
//! sink method.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A resolved avatar expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    /// Name used by the backend (e.g. `吐舌`).
    pub name: String,
    /// Model parameter the renderer toggles for this expression.
    pub parameter: String,
}

/// Avatar renderer.
pub trait AvatarSink: Send + Sync {
    /// Switch `expression` on (`active = true`) or off.
    fn show_expression(&self, expression: &Expression, active: bool);

    /// Return the avatar to its neutral face.
    fn reset_expression(&self);
}

/// Subtitle surface.
pub trait SubtitleSink: Send + Sync {
    /// Replace the visible subtitle. An empty string hides it.
    fn set_subtitle(&self, text: &str);
}

/// Who authored a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    /// Failures and notices rendered to the user.
    System,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One line of the conversation history panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Conversation history panel.
pub trait HistorySink: Send + Sync {
    fn append(&self, entry: HistoryEntry);
}

/// In-memory history, used by the terminal front-end and in tests.
#[derive(Debug, Default)]
pub struct ConversationHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl ConversationHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all entries in append order.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        match self.entries.lock() {
            Ok(e) => e.clone(),
            Err(p) => p.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(e) => e.len(),
            Err(p) => p.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistorySink for ConversationHistory {
    fn append(&self, entry: HistoryEntry) {
        let mut entries = match self.entries.lock() {
            Ok(e) => e,
            Err(p) => p.into_inner(),
        };
        entries.push(entry);
    }
}
