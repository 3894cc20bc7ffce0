//! In-memory [`Backend`] for engine tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use reqwest::StatusCode;
use shared::models::{
    CompletionRequest, ModelDescriptor, SessionIdentity, ThreadRecord, ThreadSummary,
};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    errors::GatewayError,
    gateway::{Backend, ByteStream, CompletionResponse},
};

pub const OWNER: &str = "Ada";
pub const MODEL: &str = "gemma3:1b";

/// What the next `stream_completion` call does.
#[derive(Debug)]
pub enum Script {
    /// Successful response with these body chunks.
    Chunks(Vec<Bytes>),
    /// Body yields these chunks, then a read error.
    FailAfter(Vec<Bytes>, &'static str),
    /// Non-success status with a text body.
    Status(StatusCode, &'static str),
    /// The request itself fails.
    Refuse(&'static str),
    /// Body yields these chunks, then never ends.
    Hang(Vec<Bytes>),
    /// Body yields whatever the test sends, ending when the sender is dropped.
    Feed(mpsc::UnboundedReceiver<Bytes>),
}

impl Script {
    pub fn chunks(parts: &[&'static [u8]]) -> Self {
        Self::Chunks(parts.iter().copied().map(Bytes::from_static).collect())
    }

    pub fn feed() -> (mpsc::UnboundedSender<Bytes>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self::Feed(receiver))
    }
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    threads: Mutex<Vec<ThreadSummary>>,
    records: Mutex<HashMap<SessionIdentity, ThreadRecord>>,
    models: Mutex<Vec<ModelDescriptor>>,
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    fetch_delay: Mutex<Option<Duration>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn set_threads(&self, threads: Vec<ThreadSummary>) {
        *self.threads.lock().unwrap() = threads;
    }

    pub fn set_record(&self, id: SessionIdentity, record: ThreadRecord) {
        self.records.lock().unwrap().insert(id, record);
    }

    pub fn set_models(&self, models: Vec<ModelDescriptor>) {
        *self.models.lock().unwrap() = models;
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Makes every `fetch_thread` call wait this long before answering.
    pub fn delay_fetch(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }
}

fn ok_chunks(chunks: Vec<Bytes>) -> impl futures_util::Stream<Item = Result<Bytes, GatewayError>> {
    stream::iter(chunks.into_iter().map(Ok))
}

#[async_trait]
impl Backend for FakeBackend {
    async fn list_threads(
        &self,
        _owner: &str,
        _current: Option<SessionIdentity>,
    ) -> Vec<ThreadSummary> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.threads.lock().unwrap().clone()
    }

    async fn fetch_thread(&self, id: SessionIdentity) -> ThreadRecord {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.records
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    async fn list_models(&self) -> Vec<ModelDescriptor> {
        self.models.lock().unwrap().clone()
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<Option<CompletionResponse>, GatewayError> {
        self.requests.lock().unwrap().push(request.clone());
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Chunks(Vec::new()));

        let (status, body): (StatusCode, ByteStream) = match script {
            Script::Chunks(chunks) => (StatusCode::OK, Box::pin(ok_chunks(chunks))),
            Script::FailAfter(chunks, message) => (
                StatusCode::OK,
                Box::pin(ok_chunks(chunks).chain(stream::once(async move {
                    Err(GatewayError::Stream(message.to_string()))
                }))),
            ),
            Script::Status(status, text) => (
                status,
                Box::pin(ok_chunks(vec![Bytes::from_static(text.as_bytes())])),
            ),
            Script::Refuse(message) => return Err(GatewayError::Stream(message.to_string())),
            Script::Hang(chunks) => (
                StatusCode::OK,
                Box::pin(ok_chunks(chunks).chain(stream::pending())),
            ),
            Script::Feed(receiver) => (
                StatusCode::OK,
                Box::pin(stream::unfold(receiver, |mut receiver| async move {
                    receiver
                        .recv()
                        .await
                        .map(|chunk| (Ok::<_, GatewayError>(chunk), receiver))
                })),
            ),
        };

        let body = body.take_until(cancel.cancelled_owned());
        Ok(Some(CompletionResponse::from_stream(status, Box::pin(body))))
    }
}

pub fn request(content: &str) -> CompletionRequest {
    CompletionRequest {
        owner_name: OWNER.to_string(),
        session_id: SessionIdentity::generate(),
        content: content.to_string(),
        model: MODEL.to_string(),
    }
}

pub fn summary(id: SessionIdentity, title: &str) -> ThreadSummary {
    ThreadSummary {
        id,
        title: title.to_string(),
        owner: OWNER.to_string(),
        is_pending_local: false,
    }
}
