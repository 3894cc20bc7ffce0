use shared::models::InvalidSessionId;
use thiserror::Error;

/// Failures talking to the chat backend.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend responded with status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body failed after the stream opened.
    #[error("stream interrupted: {0}")]
    Stream(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Mutations the message store refuses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("message {0} already exists")]
    DuplicateId(String),

    #[error("no message with id {0}")]
    UnknownId(String),
}

/// Reasons a submission is rejected before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message is empty")]
    EmptyContent,

    #[error("message is {actual} characters long; the limit is {max}")]
    ContentTooLong { max: usize, actual: usize },

    #[error("no model selected")]
    MissingModel,

    #[error(transparent)]
    InvalidSessionId(#[from] InvalidSessionId),
}

/// Why `submit` did not produce an assistant reply.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("a reply is already streaming")]
    Busy,

    #[error("completion failed: {0}")]
    Stream(#[source] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
