//! Message Models
//!
//! Entries in the chat timeline and the filter modes applied to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a timeline entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// What kind of entry this is
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Conversational content
    Chat,
    /// A command submission
    Command,
    /// System status lines
    System,
    /// An error surfaced to the user
    Error,
    /// A streaming thought, convertible to Chat on finalization
    Thought,
}

/// An entry in the chat timeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message with a generated id
    pub fn new(role: MessageRole, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            kind,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a message with a caller-supplied id
    pub fn with_id(
        id: impl Into<String>,
        role: MessageRole,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            kind,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Partial update applied to a message through the message store
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    /// Replace the content outright
    pub content: Option<String>,
    /// Append to the existing content (streaming thoughts)
    pub append: Option<String>,
    pub kind: Option<MessageKind>,
    /// Re-stamp the timestamp (thought finalization)
    pub restamp: bool,
}

/// Timeline filter modes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    All,
    Chat,
    Command,
}

impl FilterMode {
    /// Classifier for a single message under this mode
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            FilterMode::All => true,
            FilterMode::Chat => matches!(message.kind, MessageKind::Chat | MessageKind::Thought),
            FilterMode::Command => matches!(
                message.kind,
                MessageKind::Command | MessageKind::System | MessageKind::Error
            ),
        }
    }
}

impl std::fmt::Display for FilterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterMode::All => write!(f, "all"),
            FilterMode::Chat => write!(f, "chat"),
            FilterMode::Command => write!(f, "command"),
        }
    }
}

impl std::str::FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(FilterMode::All),
            "chat" => Ok(FilterMode::Chat),
            "command" => Ok(FilterMode::Command),
            _ => Err(format!("Unknown filter mode: {}", s)),
        }
    }
}
