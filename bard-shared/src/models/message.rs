use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

use super::Timestamp;

/// Display name attached to assistant messages created on the client.
pub const ASSISTANT_DISPLAY_NAME: &str = "Bard";

/// Author of a message in a thread.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message typed by the person using the client.
    User,
    /// Message generated by the backend model.
    Assistant,
}

impl MessageRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl TryFrom<&str> for MessageRole {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err("invalid message role"),
        }
    }
}

impl Display for MessageRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A single entry of a thread's message log.
///
/// The serialized form matches the backend's message records
/// (`{id, role, content, name, created_at}`). Identifiers are opaque strings: the backend
/// issues its own ids while the client mints UUIDv4 strings for optimistic entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Identifier, unique within the thread.
    pub id: String,
    /// Who wrote the message.
    pub role: MessageRole,
    /// Message text. Grows in place while the message is an in-flight assistant placeholder.
    pub content: String,
    /// Name shown next to the message.
    #[serde(rename = "name")]
    pub display_name: String,
    /// When the message was created.
    pub created_at: Timestamp,
}

impl Message {
    /// Builds an optimistic user message stamped with a fresh id and the current time.
    #[must_use]
    pub fn user(content: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: MessageRole::User,
            content: content.into(),
            display_name: display_name.into(),
            created_at: Timestamp::now(),
        }
    }

    /// Builds an empty assistant message that a stream fills in.
    #[must_use]
    pub fn assistant_placeholder() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: MessageRole::Assistant,
            content: String::new(),
            display_name: ASSISTANT_DISPLAY_NAME.to_string(),
            created_at: Timestamp::now(),
        }
    }

    #[must_use]
    pub const fn is_user(&self) -> bool {
        matches!(self.role, MessageRole::User)
    }
}
