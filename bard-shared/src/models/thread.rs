use serde::{Deserialize, Serialize};

use super::{
    Message,
    session::{InvalidSessionId, SessionIdentity},
};

/// Title given to a thread the server has not summarised yet.
pub const NEW_THREAD_TITLE: &str = "New Thread";

/// Sidebar entry for one conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadSummary {
    pub id: SessionIdentity,
    pub title: String,
    pub owner: String,
    /// Set only on the client-synthesised entry for an open thread the server does not list yet.
    #[serde(default)]
    pub is_pending_local: bool,
}

impl ThreadSummary {
    /// The local placeholder entry for a thread whose first message is not persisted yet.
    #[must_use]
    pub fn pending(id: SessionIdentity, owner: impl Into<String>) -> Self {
        Self {
            id,
            title: NEW_THREAD_TITLE.to_string(),
            owner: owner.into(),
            is_pending_local: true,
        }
    }
}

/// Session record as the backend serialises it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionData {
    pub id: String,
    pub title: String,
    pub username: String,
}

impl TryFrom<SessionData> for ThreadSummary {
    type Error = InvalidSessionId;

    fn try_from(value: SessionData) -> Result<Self, Self::Error> {
        Ok(Self {
            id: SessionIdentity::parse(&value.id)?,
            title: value.title,
            owner: value.username,
            is_pending_local: false,
        })
    }
}

/// Payload of the single-session endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionResponse {
    #[serde(default)]
    pub session: Option<SessionData>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// A thread as fetched from the backend: its summary, if the server knows it, and its history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadRecord {
    pub summary: Option<ThreadSummary>,
    pub messages: Vec<Message>,
}

impl ThreadRecord {
    /// The neutral value returned when a thread cannot be fetched.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}
