#![cfg_attr(not(test), forbid(unsafe_code))]
#![warn(clippy::pedantic)]

//! Streaming chat session engine.
//!
//! [`controller::SessionController`] is the entry point. It appends the user's message and an
//! assistant placeholder to a [`store::MessageStore`], streams the reply through a
//! [`gateway::Backend`], and tells the [`cache::QueryCache`] when the thread list should be
//! refreshed. A [`scheduler::RefreshScheduler`] keeps the reconciled thread list current.

pub mod cache;
pub mod controller;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod reconciler;
pub mod scheduler;
pub mod store;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CachedValue, QueryCache, QueryKey};
pub use controller::{SessionController, SessionSettings, SubmitOutcome, validate_submission};
pub use errors::{GatewayError, StoreError, SubmitError, ValidationError};
pub use gateway::{Backend, ByteStream, CompletionResponse, HttpGateway};
pub use models::{ModelAvailability, ModelsChecker};
pub use reconciler::{ThreadListReconciler, reconcile};
pub use scheduler::{RefreshScheduler, ThreadList};
pub use store::{MessageStore, Snapshot};
pub use stream::{StreamConsumer, StreamOutcome, StreamState, Utf8Decoder};
