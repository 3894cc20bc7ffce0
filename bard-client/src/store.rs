use shared::models::Message;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

use crate::errors::StoreError;

/// An immutable view of the message log.
pub type Snapshot = Arc<[Message]>;

/// In-memory message log of the open thread.
///
/// Every successful mutation publishes a fresh [`Snapshot`]; observers never see a log that is
/// half way through a change. Rejected mutations publish nothing.
#[derive(Debug)]
pub struct MessageStore {
    sender: watch::Sender<Snapshot>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Snapshot::from(Vec::new()));
        Self { sender }
    }

    /// Replaces the whole log.
    pub fn reset(&self, messages: Vec<Message>) {
        trace!(count = messages.len(), "resetting message store");
        self.sender.send_replace(messages.into());
    }

    /// Adds `message` at the end of the log.
    ///
    /// # Errors
    /// Returns [`StoreError::DuplicateId`] if a message with the same id is present.
    pub fn append(&self, message: Message) -> Result<(), StoreError> {
        self.mutate(|messages| {
            if messages.iter().any(|existing| existing.id == message.id) {
                return Err(StoreError::DuplicateId(message.id));
            }
            messages.push(message);
            Ok(())
        })
    }

    /// Replaces the content of the message with `id`, keeping its position and other fields.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownId`] if no such message exists.
    pub fn update_content(&self, id: &str, content: impl Into<String>) -> Result<(), StoreError> {
        let content = content.into();
        self.mutate(|messages| {
            let message = messages
                .iter_mut()
                .find(|message| message.id == id)
                .ok_or_else(|| StoreError::UnknownId(id.to_string()))?;
            message.content = content;
            Ok(())
        })
    }

    /// Deletes the message with `id`.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownId`] if no such message exists.
    pub fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.mutate(|messages| {
            let position = messages
                .iter()
                .position(|message| message.id == id)
                .ok_or_else(|| StoreError::UnknownId(id.to_string()))?;
            messages.remove(position);
            Ok(())
        })
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.sender.borrow().clone()
    }

    /// A receiver that is notified after every successful mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sender.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sender.borrow().is_empty()
    }

    fn mutate(
        &self,
        change: impl FnOnce(&mut Vec<Message>) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mut outcome = Ok(());
        self.sender.send_if_modified(|snapshot| {
            let mut messages = snapshot.to_vec();
            outcome = change(&mut messages);
            if outcome.is_ok() {
                *snapshot = messages.into();
                true
            } else {
                false
            }
        });
        outcome
    }
}
