use shared::models::{SessionIdentity, ThreadSummary};
use std::{collections::HashSet, sync::Arc};
use tracing::debug;

use crate::gateway::Backend;

/// Keeps the sidebar list in step with the server, making sure the open thread is always
/// listed.
#[derive(Clone)]
pub struct ThreadListReconciler {
    backend: Arc<dyn Backend>,
}

impl std::fmt::Debug for ThreadListReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadListReconciler").finish_non_exhaustive()
    }
}

impl ThreadListReconciler {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Fetches the server list and reconciles it against `current`.
    pub async fn refresh(
        &self,
        owner: &str,
        current: Option<SessionIdentity>,
    ) -> Vec<ThreadSummary> {
        let server = self.backend.list_threads(owner, current).await;
        let threads = reconcile(server, owner, current);
        debug!(
            owner,
            count = threads.len(),
            pending = threads.first().is_some_and(|thread| thread.is_pending_local),
            "thread list reconciled"
        );
        threads
    }
}

/// Server order is kept; repeated ids keep their first occurrence. When `current` is absent
/// from the server list a pending entry for it goes first.
#[must_use]
pub fn reconcile(
    server: Vec<ThreadSummary>,
    owner: &str,
    current: Option<SessionIdentity>,
) -> Vec<ThreadSummary> {
    let mut seen = HashSet::with_capacity(server.len());
    let mut threads: Vec<ThreadSummary> = server
        .into_iter()
        .filter(|thread| !thread.is_pending_local && seen.insert(thread.id))
        .collect();

    if let Some(id) = current
        && !seen.contains(&id)
    {
        threads.insert(0, ThreadSummary::pending(id, owner));
    }

    threads
}
