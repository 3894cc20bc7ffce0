//! # Session controller
//!
//! Owns the open thread: its identity, its [`MessageStore`], and at most one in-flight
//! completion. `submit` runs the optimistic append, stream, and reconcile sequence.
//! Switching threads, calling [`SessionController::cancel`], dropping the `submit` future, or
//! dropping the controller all cancel the active stream.

use shared::{
    config::ClientConfig,
    models::{
        CompletionRequest, Message, ModelDescriptor, SessionIdentity, ThreadSummary,
    },
};
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    cache::{CachedValue, QueryCache, QueryKey},
    errors::{SubmitError, ValidationError},
    gateway::Backend,
    reconciler::ThreadListReconciler,
    scheduler::RefreshScheduler,
    store::{MessageStore, Snapshot},
    stream::{StreamConsumer, StreamOutcome},
};

/// Per-user settings the controller needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Display name, also the thread owner.
    pub owner_name: String,
    /// Longest accepted message, in characters.
    pub max_message_length: usize,
}

impl SessionSettings {
    /// Takes the username and message limit from `config`.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            owner_name: config.username.clone(),
            max_message_length: config.max_message_length,
        }
    }
}

/// A submission that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The reply finished streaming into the message with this id.
    Completed { message_id: String },
    /// The stream was cancelled. Any partial reply stays in the log.
    Cancelled,
}

/// Checks a submission without touching any state. Returns the model to use.
///
/// # Errors
/// Returns a [`ValidationError`] for blank content, content over `max_length` characters, or a
/// missing model.
pub fn validate_submission<'a>(
    content: &str,
    model: Option<&'a str>,
    max_length: usize,
) -> Result<&'a str, ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    let length = content.chars().count();
    if length > max_length {
        return Err(ValidationError::ContentTooLong {
            max: max_length,
            actual: length,
        });
    }
    model
        .map(str::trim)
        .filter(|model| !model.is_empty())
        .ok_or(ValidationError::MissingModel)
}

/// Clears the active-stream slot and cancels its token when the submission ends, however it
/// ends.
struct ActiveStream<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
    token: CancellationToken,
}

impl Drop for ActiveStream<'_> {
    fn drop(&mut self) {
        self.token.cancel();
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Drives one conversation view against a [`Backend`].
pub struct SessionController {
    backend: Arc<dyn Backend>,
    cache: Arc<QueryCache>,
    store: MessageStore,
    settings: SessionSettings,
    current: watch::Sender<SessionIdentity>,
    active: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("session_id", &*self.current.borrow())
            .field("settings", &self.settings)
            .field("messages", &self.store.len())
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Creates a controller on a brand-new, empty thread.
    #[must_use]
    pub fn new(
        backend: Arc<dyn Backend>,
        cache: Arc<QueryCache>,
        settings: SessionSettings,
    ) -> Self {
        let (current, _) = watch::channel(SessionIdentity::generate());
        Self {
            backend,
            cache,
            store: MessageStore::new(),
            settings,
            current,
            active: Mutex::new(None),
        }
    }

    /// The identity of the open thread.
    #[must_use]
    pub fn session_id(&self) -> SessionIdentity {
        *self.current.borrow()
    }

    /// The settings this controller was built with.
    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// The query cache shared with the refresh scheduler.
    #[must_use]
    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// The current message log.
    #[must_use]
    pub fn messages(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// Message log snapshots, one per mutation.
    #[must_use]
    pub fn subscribe_messages(&self) -> watch::Receiver<Snapshot> {
        self.store.subscribe()
    }

    /// The open thread's identity, updated on every switch.
    #[must_use]
    pub fn subscribe_session(&self) -> watch::Receiver<SessionIdentity> {
        self.current.subscribe()
    }

    /// Whether a completion is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Sends `content` to the backend and streams the reply into the log.
    ///
    /// The user's message and an empty assistant placeholder are appended before the request
    /// goes out. On failure the placeholder is removed and the user's message stays.
    ///
    /// # Errors
    /// * [`SubmitError::Validation`] for invalid input; nothing is appended or sent.
    /// * [`SubmitError::Busy`] while another reply is streaming.
    /// * [`SubmitError::Stream`] when the request or the stream fails.
    pub async fn submit(
        &self,
        content: &str,
        model: Option<&str>,
    ) -> Result<SubmitOutcome, SubmitError> {
        let model = validate_submission(content, model, self.settings.max_message_length)?;
        let active = self.begin()?;

        let session_id = self.session_id();
        let first_message = self.store.is_empty();

        self.store
            .append(Message::user(content, self.settings.owner_name.clone()))?;
        let placeholder = Message::assistant_placeholder();
        let placeholder_id = placeholder.id.clone();
        self.store.append(placeholder)?;

        let request = CompletionRequest {
            owner_name: self.settings.owner_name.clone(),
            session_id,
            content: content.to_string(),
            model: model.to_string(),
        };
        debug!(%session_id, message_id = %placeholder_id, model, "submitting message");

        let mut consumer = StreamConsumer::new(&self.store, placeholder_id.clone());
        let outcome = consumer
            .run(self.backend.as_ref(), &request, &active.token)
            .await;
        drop(active);

        match outcome {
            StreamOutcome::Completed { content } => {
                info!(%session_id, message_id = %placeholder_id, bytes = content.len(), "reply completed");
                self.cache.invalidate(&QueryKey::Session(session_id));
                if first_message {
                    // Pick up the server's title without waiting for the next poll.
                    self.cache
                        .invalidate(&QueryKey::Sessions(self.settings.owner_name.clone()));
                }
                Ok(SubmitOutcome::Completed {
                    message_id: placeholder_id,
                })
            }
            StreamOutcome::Failed(err) => {
                error!(%session_id, %err, "failed to send message");
                Err(SubmitError::Stream(err))
            }
            StreamOutcome::Cancelled { partial } => {
                info!(%session_id, kept = partial.len(), "reply cancelled");
                // The backend may have stored the message and part of the reply.
                self.cache.invalidate(&QueryKey::Session(session_id));
                Ok(SubmitOutcome::Cancelled)
            }
        }
    }

    fn begin(&self) -> Result<ActiveStream<'_>, SubmitError> {
        let mut slot = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(SubmitError::Busy);
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Ok(ActiveStream {
            slot: &self.active,
            token,
        })
    }

    /// Cancels the in-flight completion. Returns `false` if there was none.
    pub fn cancel(&self) -> bool {
        match self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Switches to the thread `candidate`, loading its history.
    ///
    /// The history comes from the cache when an entry exists, from the backend otherwise. A
    /// non-empty answer is cached until the next completion on that thread invalidates it.
    /// Returns the server's summary of the thread, if it has one.
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidSessionId`] when `candidate` is not a UUIDv4; nothing
    /// changes in that case.
    pub async fn open_thread(
        &self,
        candidate: &str,
    ) -> Result<Option<ThreadSummary>, ValidationError> {
        let id = SessionIdentity::parse(candidate)?;
        if self.cancel() {
            info!(session_id = %self.session_id(), "cancelling reply before switching threads");
        }

        let record = if let Some(record) = self.cache.thread(id) {
            debug!(session_id = %id, "thread served from cache");
            record
        } else {
            let record = Arc::new(self.backend.fetch_thread(id).await);
            if record.summary.is_some() || !record.messages.is_empty() {
                self.cache
                    .insert(QueryKey::Session(id), CachedValue::Thread(record.clone()));
            }
            record
        };

        // A submission may have started while the history was loading.
        if self.cancel() {
            info!(session_id = %self.session_id(), "cancelling reply started during the switch");
        }
        self.current.send_replace(id);
        self.store.reset(record.messages.clone());
        debug!(session_id = %id, messages = self.store.len(), "opened thread");
        Ok(record.summary.clone())
    }

    /// Starts a brand-new, empty thread.
    pub fn new_thread(&self) -> SessionIdentity {
        self.cancel();
        let id = SessionIdentity::generate();
        self.current.send_replace(id);
        self.store.reset(Vec::new());
        debug!(session_id = %id, "started new thread");
        id
    }

    /// The model inventory. A non-empty answer is cached; an empty one is retried next time.
    pub async fn models(&self) -> Arc<[ModelDescriptor]> {
        if let Some(models) = self.cache.models().filter(|models| !models.is_empty()) {
            return models;
        }
        let models: Arc<[ModelDescriptor]> = self.backend.list_models().await.into();
        if !models.is_empty() {
            self.cache
                .insert(QueryKey::Models, CachedValue::Models(models.clone()));
        }
        models
    }

    /// A reconciler over this controller's backend.
    #[must_use]
    pub fn reconciler(&self) -> ThreadListReconciler {
        ThreadListReconciler::new(self.backend.clone())
    }

    /// The reconciled thread list, fetched once.
    pub async fn threads(&self) -> Vec<ThreadSummary> {
        self.reconciler()
            .refresh(&self.settings.owner_name, Some(self.session_id()))
            .await
    }

    /// Starts background refresh of the thread list, following this controller's open thread.
    #[must_use]
    pub fn spawn_refresh(&self, interval: Duration) -> RefreshScheduler {
        RefreshScheduler::spawn(
            self.reconciler(),
            self.cache.clone(),
            self.settings.owner_name.clone(),
            self.subscribe_session(),
            interval,
        )
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::GatewayError,
        testing::{FakeBackend, MODEL, OWNER, Script, summary},
    };
    use bytes::Bytes;
    use reqwest::StatusCode;
    use shared::models::{MessageRole, ThreadRecord};

    const WAIT: Duration = Duration::from_secs(2);

    fn controller() -> (Arc<FakeBackend>, SessionController) {
        let backend = Arc::new(FakeBackend::new());
        let controller = SessionController::new(
            backend.clone(),
            Arc::new(QueryCache::new()),
            SessionSettings {
                owner_name: OWNER.to_string(),
                max_message_length: 4000,
            },
        );
        (backend, controller)
    }

    async fn wait_for_messages(
        receiver: &mut watch::Receiver<Snapshot>,
        predicate: impl FnMut(&Snapshot) -> bool,
    ) -> Snapshot {
        tokio::time::timeout(WAIT, receiver.wait_for(predicate))
            .await
            .unwrap()
            .unwrap()
            .clone()
    }

    fn drain(receiver: &mut tokio::sync::broadcast::Receiver<QueryKey>) -> Vec<QueryKey> {
        std::iter::from_fn(|| receiver.try_recv().ok()).collect()
    }

    #[test]
    fn validation_rules() {
        assert_eq!(
            validate_submission("", Some(MODEL), 10),
            Err(ValidationError::EmptyContent)
        );
        assert_eq!(
            validate_submission(" \n\t", Some(MODEL), 10),
            Err(ValidationError::EmptyContent)
        );
        assert_eq!(
            validate_submission("ééééé", Some(MODEL), 4),
            Err(ValidationError::ContentTooLong { max: 4, actual: 5 })
        );
        assert_eq!(
            validate_submission("ééééé", Some(MODEL), 5),
            Ok(MODEL)
        );
        assert_eq!(
            validate_submission("Hello", None, 10),
            Err(ValidationError::MissingModel)
        );
        assert_eq!(
            validate_submission("Hello", Some("  "), 10),
            Err(ValidationError::MissingModel)
        );
    }

    #[tokio::test]
    async fn optimistic_echo_then_streamed_reply() {
        let (backend, controller) = controller();
        let (feed, script) = Script::feed();
        backend.script(script);
        let mut messages = controller.subscribe_messages();

        let submit = controller.submit("Hello", Some(MODEL));
        let drive = async {
            let echo = wait_for_messages(&mut messages, |log| log.len() == 2).await;
            assert_eq!(echo[0].role, MessageRole::User);
            assert_eq!(echo[0].content, "Hello");
            assert_eq!(echo[0].display_name, OWNER);
            assert_eq!(echo[1].role, MessageRole::Assistant);
            assert_eq!(echo[1].content, "");

            feed.send(Bytes::from_static(b"Hi")).unwrap();
            wait_for_messages(&mut messages, |log| log[1].content == "Hi").await;
            feed.send(Bytes::from_static(b" there")).unwrap();
            drop(feed);
        };
        let (outcome, ()) = tokio::join!(submit, drive);

        let SubmitOutcome::Completed { message_id } = outcome.unwrap() else {
            panic!("expected completion");
        };
        let log = controller.messages();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].id, message_id);
        assert_eq!(log[1].content, "Hi there");
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn request_carries_owner_session_and_model() {
        let (backend, controller) = controller();
        backend.script(Script::chunks(&[b"ok"]));

        controller.submit("Hello", Some(MODEL)).await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].owner_name, OWNER);
        assert_eq!(requests[0].session_id, controller.session_id());
        assert_eq!(requests[0].content, "Hello");
        assert_eq!(requests[0].model, MODEL);
    }

    #[tokio::test]
    async fn invalid_submission_touches_nothing() {
        let (backend, controller) = controller();

        let too_long = "x".repeat(4001);
        let err = controller.submit(&too_long, Some(MODEL)).await.unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Validation(ValidationError::ContentTooLong {
                max: 4000,
                actual: 4001
            })
        ));

        let err = controller.submit("Hello", None).await.unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Validation(ValidationError::MissingModel)
        ));

        assert!(controller.messages().is_empty());
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn failed_stream_keeps_user_message_only() {
        let (backend, controller) = controller();
        backend.script(Script::Status(StatusCode::BAD_GATEWAY, "upstream down"));

        let err = controller.submit("Hello", Some(MODEL)).await.unwrap_err();

        assert!(matches!(
            err,
            SubmitError::Stream(GatewayError::Status { status: 502, .. })
        ));
        let log = controller.messages();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].content, "Hello");
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn second_submit_while_streaming_is_busy() {
        let (backend, controller) = controller();
        backend.script(Script::Hang(Vec::new()));

        let first = controller.submit("one", Some(MODEL));
        let second = async {
            tokio::time::timeout(WAIT, async {
                while !controller.is_busy() {
                    tokio::task::yield_now().await;
                }
            })
            .await
            .unwrap();

            let err = controller.submit("two", Some(MODEL)).await.unwrap_err();
            assert!(matches!(err, SubmitError::Busy));
            assert!(controller.cancel());
        };
        let (outcome, ()) = tokio::join!(first, second);

        assert_eq!(outcome.unwrap(), SubmitOutcome::Cancelled);
        assert_eq!(backend.requests().len(), 1);
        // The empty placeholder was dropped; the user's message stays.
        assert_eq!(controller.messages().len(), 1);
        assert!(!controller.is_busy());
        assert!(!controller.cancel());
    }

    #[tokio::test]
    async fn switching_threads_cancels_the_stream() {
        let (backend, controller) = controller();
        let other = SessionIdentity::generate();
        let history = vec![Message::user("Earlier", OWNER)];
        backend.set_record(
            other,
            ThreadRecord {
                summary: Some(summary(other, "Earlier chat")),
                messages: history.clone(),
            },
        );
        let (feed, script) = Script::feed();
        backend.script(script);
        let mut messages = controller.subscribe_messages();

        let submit = controller.submit("Hello", Some(MODEL));
        let switch = async {
            feed.send(Bytes::from_static(b"Hi")).unwrap();
            wait_for_messages(&mut messages, |log| {
                log.get(1).is_some_and(|message| message.content == "Hi")
            })
            .await;

            let opened = controller.open_thread(&other.to_string()).await.unwrap();
            assert_eq!(opened.unwrap().title, "Earlier chat");

            // Sending more after the switch must not reach the store.
            let _ = feed.send(Bytes::from_static(b" late"));
        };
        let (outcome, ()) = tokio::join!(submit, switch);

        assert_eq!(outcome.unwrap(), SubmitOutcome::Cancelled);
        assert_eq!(controller.session_id(), other);
        assert_eq!(&*controller.messages(), history.as_slice());
    }

    #[tokio::test]
    async fn open_thread_rejects_invalid_identifier() {
        let (backend, controller) = controller();
        backend.script(Script::chunks(&[b"ok"]));
        controller.submit("Hello", Some(MODEL)).await.unwrap();
        let before = controller.session_id();

        let err = controller.open_thread("not-a-uuid").await.unwrap_err();

        assert!(matches!(err, ValidationError::InvalidSessionId(_)));
        assert_eq!(controller.session_id(), before);
        assert_eq!(controller.messages().len(), 2);
    }

    #[tokio::test]
    async fn open_unknown_thread_yields_empty_log() {
        let (_, controller) = controller();
        let id = SessionIdentity::generate();

        let summary = controller.open_thread(&id.to_string()).await.unwrap();

        assert!(summary.is_none());
        assert!(controller.messages().is_empty());
        assert!(controller.cache().thread(id).is_none());
    }

    #[tokio::test]
    async fn reopening_a_thread_uses_the_cache_until_invalidated() {
        let (backend, controller) = controller();
        let other = SessionIdentity::generate();
        let history = vec![Message::user("Earlier", OWNER)];
        backend.set_record(
            other,
            ThreadRecord {
                summary: Some(summary(other, "Earlier chat")),
                messages: history.clone(),
            },
        );

        controller.open_thread(&other.to_string()).await.unwrap();
        controller.new_thread();
        let opened = controller.open_thread(&other.to_string()).await.unwrap();

        assert_eq!(backend.fetch_calls(), 1);
        assert_eq!(opened.unwrap().title, "Earlier chat");
        assert_eq!(&*controller.messages(), history.as_slice());

        backend.script(Script::chunks(&[b"ok"]));
        controller.submit("More", Some(MODEL)).await.unwrap();
        controller.open_thread(&other.to_string()).await.unwrap();

        assert_eq!(backend.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn submit_during_thread_load_is_cancelled_by_the_switch() {
        let (backend, controller) = controller();
        let other = SessionIdentity::generate();
        backend.delay_fetch(Duration::from_millis(100));
        backend.script(Script::Hang(Vec::new()));

        let other_id = other.to_string();
        let switch = controller.open_thread(&other_id);
        let submit = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tokio::time::timeout(WAIT, controller.submit("Hello", Some(MODEL))).await
        };
        let (opened, submitted) = tokio::join!(switch, submit);

        opened.unwrap();
        assert_eq!(submitted.unwrap().unwrap(), SubmitOutcome::Cancelled);
        assert_eq!(controller.session_id(), other);
        assert!(controller.messages().is_empty());
        assert!(!controller.is_busy());

        backend.script(Script::chunks(&[b"ok"]));
        let outcome = controller.submit("Again", Some(MODEL)).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn new_thread_resets_identity_and_log() {
        let (backend, controller) = controller();
        backend.script(Script::chunks(&[b"ok"]));
        controller.submit("Hello", Some(MODEL)).await.unwrap();
        let before = controller.session_id();
        let mut session = controller.subscribe_session();

        let id = controller.new_thread();

        assert_ne!(id, before);
        assert_eq!(*session.borrow_and_update(), id);
        assert!(controller.messages().is_empty());
    }

    #[tokio::test]
    async fn first_completion_invalidates_the_thread_list() {
        let (backend, controller) = controller();
        let mut invalidations = controller.cache().subscribe();
        let sessions = QueryKey::Sessions(OWNER.to_string());

        backend.script(Script::chunks(&[b"one"]));
        controller.submit("first", Some(MODEL)).await.unwrap();
        assert!(drain(&mut invalidations).contains(&sessions));

        backend.script(Script::chunks(&[b"two"]));
        controller.submit("second", Some(MODEL)).await.unwrap();
        let keys = drain(&mut invalidations);
        assert!(!keys.contains(&sessions));
        assert!(keys.contains(&QueryKey::Session(controller.session_id())));
    }

    #[tokio::test]
    async fn failed_first_message_does_not_invalidate() {
        let (backend, controller) = controller();
        let mut invalidations = controller.cache().subscribe();
        backend.script(Script::Refuse("connection refused"));

        let _ = controller.submit("first", Some(MODEL)).await;

        assert!(drain(&mut invalidations).is_empty());
    }

    #[tokio::test]
    async fn models_are_cached_once_non_empty() {
        let (backend, controller) = controller();

        assert!(controller.models().await.is_empty());

        backend.set_models(vec![ModelDescriptor {
            name: MODEL.to_string(),
            identifier: MODEL.to_string(),
        }]);
        assert_eq!(controller.models().await.len(), 1);

        backend.set_models(Vec::new());
        assert_eq!(controller.models().await.len(), 1);
    }

    #[tokio::test]
    async fn threads_include_pending_entry_for_new_thread() {
        let (backend, controller) = controller();
        let other = SessionIdentity::generate();
        backend.set_threads(vec![summary(other, "Older")]);

        let threads = controller.threads().await;

        assert_eq!(threads.len(), 2);
        assert_eq!(
            threads[0],
            ThreadSummary::pending(controller.session_id(), OWNER)
        );
    }

    #[tokio::test]
    async fn dropping_the_submit_future_frees_the_slot() {
        let (backend, controller) = controller();
        backend.script(Script::Hang(Vec::new()));

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            controller.submit("Hello", Some(MODEL)),
        )
        .await;

        assert!(result.is_err());
        assert!(!controller.is_busy());
    }
}
