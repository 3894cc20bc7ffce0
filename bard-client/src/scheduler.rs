use shared::models::{SessionIdentity, ThreadSummary};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast::error::RecvError, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    cache::{CachedValue, QueryCache, QueryKey},
    reconciler::ThreadListReconciler,
};

/// Shortest period between polls; shorter intervals, zero included, are raised to this.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// The reconciled thread list as last published.
pub type ThreadList = Arc<[ThreadSummary]>;

/// Background task that keeps the thread list fresh.
///
/// The list is rebuilt on every interval tick, whenever the open thread changes, and whenever
/// `QueryKey::Sessions(owner)` is invalidated. Each result is stored in the cache and published
/// to subscribers. Dropping the scheduler stops the task.
#[derive(Debug)]
pub struct RefreshScheduler {
    threads: watch::Receiver<ThreadList>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    /// Starts the task. The first refresh runs immediately.
    #[must_use]
    pub fn spawn(
        reconciler: ThreadListReconciler,
        cache: Arc<QueryCache>,
        owner: String,
        mut session: watch::Receiver<SessionIdentity>,
        interval: Duration,
    ) -> Self {
        let (publisher, threads) = watch::channel(ThreadList::from(Vec::new()));
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let mut invalidations = cache.subscribe();
        let key = QueryKey::Sessions(owner.clone());

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    changed = session.changed() => {
                        if changed.is_err() {
                            debug!(owner = %owner, "session closed, stopping thread refresh");
                            break;
                        }
                    }
                    received = invalidations.recv() => match received {
                        Ok(invalidated) if invalidated == key => {}
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "missed cache invalidations, refreshing");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = ticker.tick() => {}
                }

                let current = *session.borrow_and_update();
                let list: ThreadList = reconciler.refresh(&owner, Some(current)).await.into();
                cache.insert(key.clone(), CachedValue::Threads(list.clone()));
                publisher.send_replace(list);
            }
        });

        Self {
            threads,
            cancel,
            task: Some(task),
        }
    }

    /// A receiver notified after every refresh.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ThreadList> {
        self.threads.clone()
    }

    #[must_use]
    pub fn latest(&self) -> ThreadList {
        self.threads.borrow().clone()
    }

    /// Stops the task and waits for it to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            warn!(%err, "thread refresh task ended abnormally");
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
