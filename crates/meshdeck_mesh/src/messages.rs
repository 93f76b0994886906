//! Text message log — append-only record of mesh chatter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// One text message observed on the mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMessage {
    /// Sender's display name at the time the message arrived.
    pub from: String,
    /// Sender's transport id.
    pub from_id: NodeId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only ordered log of observed text messages.
///
/// The full log is kept for export; late-joining observers get only the
/// recent window.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<TextMessage>,
}

impl MessageLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a message.
    pub fn push(&mut self, message: TextMessage) {
        self.entries.push(message);
    }

    /// Total number of messages observed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent `window` messages, oldest first.
    pub fn recent(&self, window: usize) -> Vec<TextMessage> {
        let start = self.entries.len().saturating_sub(window);
        self.entries[start..].to_vec()
    }

    /// The full log, cloned for export.
    pub fn snapshot(&self) -> Vec<TextMessage> {
        self.entries.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
