//! # Stream consumer
//!
//! Drives one completion from request to a terminal state, writing the growing reply into the
//! assistant placeholder of the [`MessageStore`].
//!
//! ```text
//! Idle -> Requesting -> Streaming -> Completed
//!             |             |------> Failed
//!             |             '------> Cancelled
//!             '----> Failed | Cancelled
//! ```

use futures_util::StreamExt;
use shared::models::CompletionRequest;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    errors::GatewayError,
    gateway::{Backend, ByteStream},
    store::MessageStore,
};

/// Most bytes of an error response kept for the error message.
const MAX_ERROR_BODY: usize = 512;

/// Position of a [`StreamConsumer`] in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Created, not yet run.
    Idle,
    /// Waiting for the response head.
    Requesting,
    /// Reading the body into the placeholder.
    Streaming,
    /// The body ended normally.
    Completed,
    /// The request or the body failed.
    Failed,
    /// The token fired first.
    Cancelled,
}

impl StreamState {
    /// No transition leaves a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// How a stream ended.
#[derive(Debug)]
pub enum StreamOutcome {
    /// End of data. `content` is the full decoded reply.
    Completed { content: String },
    /// The request or the body failed. The placeholder has been removed.
    Failed(GatewayError),
    /// The token fired. Partial content stays in the store unless it was empty.
    Cancelled { partial: String },
}

/// Incremental UTF-8 decoder.
///
/// A multi-byte sequence split across chunks is held back until it completes. Bytes that can
/// never form valid UTF-8 become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes as much of `pending + chunk` as is complete.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    if let Some(invalid) = err.error_len() {
                        out.push(char::REPLACEMENT_CHARACTER);
                        self.pending.drain(..valid + invalid);
                    } else {
                        // Incomplete sequence at the end; wait for the next chunk.
                        self.pending.drain(..valid);
                        break;
                    }
                }
            }
        }

        out
    }

    /// Flushes bytes left over at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Consumes one completion stream into the placeholder message `placeholder_id`.
#[derive(Debug)]
pub struct StreamConsumer<'a> {
    store: &'a MessageStore,
    placeholder_id: String,
    accumulator: String,
    decoder: Utf8Decoder,
    state: StreamState,
    chunks: usize,
}

impl<'a> StreamConsumer<'a> {
    /// The placeholder must already be in `store`.
    #[must_use]
    pub fn new(store: &'a MessageStore, placeholder_id: impl Into<String>) -> Self {
        Self {
            store,
            placeholder_id: placeholder_id.into(),
            accumulator: String::new(),
            decoder: Utf8Decoder::new(),
            state: StreamState::Idle,
            chunks: 0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> StreamState {
        self.state
    }

    #[must_use]
    pub fn placeholder_id(&self) -> &str {
        &self.placeholder_id
    }

    /// Runs the stream to a terminal state.
    pub async fn run(
        &mut self,
        backend: &dyn Backend,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        self.transition(StreamState::Requesting);

        let response = match backend.stream_completion(request, cancel.clone()).await {
            Ok(Some(response)) => response,
            Ok(None) => return self.cancelled(),
            Err(err) => return self.failed(err),
        };

        if !response.status.is_success() {
            let body = read_error_body(response.body).await;
            if cancel.is_cancelled() {
                return self.cancelled();
            }
            return self.failed(GatewayError::Status {
                status: response.status.as_u16(),
                body,
            });
        }

        self.transition(StreamState::Streaming);
        let mut body = response.body;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return self.cancelled(),
                next = body.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    self.chunks += 1;
                    let text = self.decoder.decode(&bytes);
                    if !text.is_empty() && !self.push(&text) {
                        return self.cancelled();
                    }
                }
                Some(Err(err)) => return self.failed(err),
                None => break,
            }
        }

        // The gateway ends the body quietly when the token fires.
        if cancel.is_cancelled() {
            return self.cancelled();
        }

        let tail = self.decoder.finish();
        if !tail.is_empty() && !self.push(&tail) {
            return self.cancelled();
        }

        self.transition(StreamState::Completed);
        debug!(
            message_id = %self.placeholder_id,
            chunks = self.chunks,
            bytes = self.accumulator.len(),
            "completion stream finished"
        );
        StreamOutcome::Completed {
            content: self.accumulator.clone(),
        }
    }

    /// Appends decoded text and republishes the placeholder. Returns `false` once the
    /// placeholder is gone from the store, which only happens when the log was replaced.
    fn push(&mut self, text: &str) -> bool {
        self.accumulator.push_str(text);
        self.store
            .update_content(&self.placeholder_id, self.accumulator.clone())
            .is_ok()
    }

    fn failed(&mut self, err: GatewayError) -> StreamOutcome {
        // Already gone if the log was reset underneath us.
        let _ = self.store.remove(&self.placeholder_id);
        self.transition(StreamState::Failed);
        StreamOutcome::Failed(err)
    }

    fn cancelled(&mut self) -> StreamOutcome {
        if self.accumulator.is_empty() {
            let _ = self.store.remove(&self.placeholder_id);
        }
        self.transition(StreamState::Cancelled);
        StreamOutcome::Cancelled {
            partial: self.accumulator.clone(),
        }
    }

    fn transition(&mut self, next: StreamState) {
        trace!(message_id = %self.placeholder_id, from = ?self.state, to = ?next, "stream transition");
        self.state = next;
    }
}

async fn read_error_body(mut body: ByteStream) -> String {
    let mut bytes = Vec::new();
    while bytes.len() < MAX_ERROR_BODY {
        match body.next().await {
            Some(Ok(chunk)) => bytes.extend_from_slice(&chunk),
            _ => break,
        }
    }
    bytes.truncate(MAX_ERROR_BODY);
    String::from_utf8_lossy(&bytes).trim().to_string()
}
