use serde::{Deserialize, Serialize};

use super::SessionIdentity;

/// A model the backend can generate with.
///
/// The inventory endpoint returns `{name, model, ...details}`; only the first two fields are
/// kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Human readable name.
    pub name: String,
    /// Value sent back in completion requests.
    #[serde(rename = "model")]
    pub identifier: String,
}

/// Body of the streaming completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Display name of the person submitting.
    #[serde(rename = "name")]
    pub owner_name: String,
    pub session_id: SessionIdentity,
    pub content: String,
    pub model: String,
}
