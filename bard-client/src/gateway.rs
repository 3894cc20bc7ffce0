//! # Backend gateway
//!
//! A narrow client over the four backend endpoints. Reads fail soft: any transport, status, or
//! decoding problem is logged and replaced by an empty value. The completion stream fails loud
//! and treats cancellation as a normal end.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::{Client, StatusCode, header::HeaderMap};
use serde::de::DeserializeOwned;
use shared::{
    config::ClientConfig,
    models::{
        CompletionRequest, ModelDescriptor, SessionData, SessionIdentity, SessionResponse,
        ThreadRecord, ThreadSummary,
    },
};
use std::{fmt, pin::Pin, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::GatewayError;

/// Number of threads kept from the server's list when nothing else is configured.
pub const DEFAULT_THREAD_LIMIT: usize = 15;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw body of a completion response, in arrival order.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, GatewayError>> + Send>>;

/// An opened completion stream. The status has not been checked yet.
pub struct CompletionResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl CompletionResponse {
    /// Wraps an in-memory chunk sequence as a successful response.
    #[must_use]
    pub fn from_stream(status: StatusCode, body: ByteStream) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }
}

impl fmt::Debug for CompletionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// The backend operations the session engine depends on.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Threads owned by `owner`, in server order, truncated to the configured limit.
    /// Failure yields an empty list.
    async fn list_threads(
        &self,
        owner: &str,
        current: Option<SessionIdentity>,
    ) -> Vec<ThreadSummary>;

    /// One thread and its history. Failure yields [`ThreadRecord::empty`].
    async fn fetch_thread(&self, id: SessionIdentity) -> ThreadRecord;

    /// The model inventory. Failure yields an empty list.
    async fn list_models(&self) -> Vec<ModelDescriptor>;

    /// Opens the completion stream.
    ///
    /// Returns `Ok(None)` when `cancel` fires before the backend answers. Once a response is
    /// returned its body ends quietly as soon as `cancel` fires.
    ///
    /// # Errors
    /// Returns a [`GatewayError`] when the request cannot be sent.
    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<Option<CompletionResponse>, GatewayError>;
}

/// [`Backend`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    base_url: Url,
    client: Client,
    thread_limit: usize,
    read_timeout: Duration,
}

impl HttpGateway {
    /// Creates a gateway rooted at `base_url`.
    ///
    /// # Errors
    /// Returns [`GatewayError::Transport`] if the HTTP client cannot be built.
    pub fn new(mut base_url: Url) -> Result<Self, GatewayError> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder().cookie_store(true).build()?;

        Ok(Self {
            base_url,
            client,
            thread_limit: DEFAULT_THREAD_LIMIT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// Creates a gateway from the client configuration.
    ///
    /// # Errors
    /// Returns a [`GatewayError`] if the backend URL is malformed or the client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self, GatewayError> {
        Ok(Self::new(config.backend_url()?)?
            .with_thread_limit(config.thread_list_limit)
            .with_read_timeout(config.request_timeout()))
    }

    #[must_use]
    pub const fn with_thread_limit(mut self, limit: usize) -> Self {
        self.thread_limit = limit;
        self
    }

    /// Bounds the read endpoints. The completion stream is never timed out.
    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        Ok(self.base_url.join(path)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, GatewayError> {
        let response = self
            .client
            .get(url)
            .timeout(self.read_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| GatewayError::Decode(err.to_string()))
    }

    async fn try_list_threads(&self, owner: &str) -> Result<Vec<ThreadSummary>, GatewayError> {
        let mut url = self.endpoint("sessions")?;
        url.query_pairs_mut().append_pair("name", owner);

        let mut sessions: Vec<SessionData> = self.get_json(url).await?;
        sessions.truncate(self.thread_limit);

        Ok(sessions
            .into_iter()
            .filter_map(|data| match ThreadSummary::try_from(data) {
                Ok(summary) => Some(summary),
                Err(err) => {
                    warn!(%err, "skipping thread with invalid identifier");
                    None
                }
            })
            .collect())
    }

    async fn try_fetch_thread(&self, id: SessionIdentity) -> Result<ThreadRecord, GatewayError> {
        let mut url = self.endpoint("session")?;
        url.query_pairs_mut()
            .append_pair("session_id", &id.to_string());

        let response: SessionResponse = self.get_json(url).await?;
        let summary = match response.session.map(ThreadSummary::try_from).transpose() {
            Ok(summary) => summary,
            Err(err) => {
                warn!(session_id = %id, %err, "thread summary has an invalid identifier");
                None
            }
        };

        Ok(ThreadRecord {
            summary,
            messages: response.messages,
        })
    }
}

#[async_trait]
impl Backend for HttpGateway {
    async fn list_threads(
        &self,
        owner: &str,
        current: Option<SessionIdentity>,
    ) -> Vec<ThreadSummary> {
        match self.try_list_threads(owner).await {
            Ok(threads) => {
                debug!(owner, count = threads.len(), current = ?current, "listed threads");
                threads
            }
            Err(err) => {
                warn!(owner, %err, "failed to list threads");
                Vec::new()
            }
        }
    }

    async fn fetch_thread(&self, id: SessionIdentity) -> ThreadRecord {
        self.try_fetch_thread(id).await.unwrap_or_else(|err| {
            warn!(session_id = %id, %err, "failed to fetch thread");
            ThreadRecord::empty()
        })
    }

    async fn list_models(&self) -> Vec<ModelDescriptor> {
        let result = match self.endpoint("models") {
            Ok(url) => self.get_json(url).await,
            Err(err) => Err(err),
        };
        result.unwrap_or_else(|err| {
            warn!(%err, "failed to list models");
            Vec::new()
        })
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<Option<CompletionResponse>, GatewayError> {
        let url = self.endpoint("stream")?;
        let send = self.client.post(url).json(request).send();

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(session_id = %request.session_id, "completion cancelled before response");
                return Ok(None);
            }
            response = send => response?,
        };

        let status = response.status();
        let headers = response.headers().clone();
        debug!(session_id = %request.session_id, status = status.as_u16(), "completion stream opened");

        // Dropping the reqwest body closes the connection.
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|err| GatewayError::Stream(err.to_string())))
            .take_until(cancel.cancelled_owned());

        Ok(Some(CompletionResponse {
            status,
            headers,
            body: Box::pin(body),
        }))
    }
}
