//! Collapses concurrent identical requests into one shared operation.
//!
//! The first caller for a key registers a pending entry and spawns the
//! operation; callers arriving while that entry is younger than the timeout
//! await the same outcome. The entry is removed when the operation finishes,
//! but only if it is still the entry that operation registered.

use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use metrics::{counter, gauge};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

const METRIC_JOINED: &str = "inkpost_dedup_joined_total";
const METRIC_EXECUTED: &str = "inkpost_dedup_executed_total";
const METRIC_PENDING: &str = "inkpost_dedup_pending";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DedupError {
    #[error("deduplicated operation aborted: {0}")]
    Aborted(String),
}

type SharedOutcome<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct PendingEntry<T, E> {
    outcome: SharedOutcome<T, E>,
    registered_at: Instant,
    id: u64,
}

/// Per-process table of in-flight operations keyed by a dedup key.
pub struct RequestDeduplicator<T, E> {
    pending: Arc<DashMap<String, PendingEntry<T, E>>>,
    next_id: Arc<AtomicU64>,
    timeout: Duration,
}

impl<T, E> Clone for RequestDeduplicator<T, E> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
            next_id: Arc::clone(&self.next_id),
            timeout: self.timeout,
        }
    }
}

impl<T, E> RequestDeduplicator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<DedupError> + 'static,
{
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of registered entries, including expired ones not yet replaced.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Detach every pending entry so the next caller starts a fresh operation.
    ///
    /// Running operations are not aborted; their completions no longer match
    /// any registered entry.
    pub fn forget_all(&self) -> usize {
        let detached = self.pending.len();
        self.pending.clear();
        gauge!(METRIC_PENDING).set(0.0);
        detached
    }

    /// Run `operation` unless an identical request for `key` is already in
    /// flight, in which case its outcome is shared.
    ///
    /// The operation is spawned and runs to completion even if every caller
    /// is dropped.
    pub async fn dedupe<F, Fut>(&self, key: &str, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        // The entry guard holds the shard lock, so inspecting the age and
        // replacing the entry cannot interleave with another caller.
        let (outcome, registration) = match self.pending.entry(key.to_string()) {
            Entry::Occupied(entry) if entry.get().registered_at.elapsed() < self.timeout => {
                (entry.get().outcome.clone(), None)
            }
            entry => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel::<Result<T, E>>();
                let outcome = rx
                    .map(|received| {
                        received.unwrap_or_else(|_| {
                            Err(E::from(DedupError::Aborted(
                                "operation dropped before completing".to_string(),
                            )))
                        })
                    })
                    .boxed()
                    .shared();
                let pending = PendingEntry {
                    outcome: outcome.clone(),
                    registered_at: Instant::now(),
                    id,
                };
                match entry {
                    Entry::Occupied(mut stale) => {
                        debug!(target: "inkpost::cache", key, "replacing expired dedup entry");
                        stale.insert(pending);
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(pending);
                    }
                }
                (outcome, Some((id, tx)))
            }
        };

        match registration {
            Some((id, tx)) => {
                counter!(METRIC_EXECUTED).increment(1);
                gauge!(METRIC_PENDING).set(self.pending.len() as f64);
                self.spawn(key.to_string(), id, operation(), tx);
            }
            None => {
                counter!(METRIC_JOINED).increment(1);
                debug!(target: "inkpost::cache", key, "joined in-flight request");
            }
        }

        outcome.await
    }

    fn spawn<Fut>(&self, key: String, id: u64, operation: Fut, tx: oneshot::Sender<Result<T, E>>)
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            let result = match AssertUnwindSafe(operation).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(E::from(DedupError::Aborted(format!(
                    "operation for `{key}` panicked"
                )))),
            };
            pending.remove_if(&key, |_, entry| entry.id == id);
            gauge!(METRIC_PENDING).set(pending.len() as f64);
            let _ = tx.send(result);
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use futures::future::join_all;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Failed(String),
        Aborted(String),
    }

    impl From<DedupError> for TestError {
        fn from(err: DedupError) -> Self {
            match err {
                DedupError::Aborted(message) => Self::Aborted(message),
            }
        }
    }

    fn dedup() -> RequestDeduplicator<u32, TestError> {
        RequestDeduplicator::new(Duration::from_secs(5))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_execution() {
        let dedup = dedup();
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..16).map(|_| {
            let dedup = dedup.clone();
            let calls = Arc::clone(&calls);
            async move {
                dedup
                    .dedupe("posts:all", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(42)
                    })
                    .await
            }
        });
        let results = join_all(callers).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|result| *result == Ok(42)));
        assert_eq!(dedup.pending_len(), 0);
    }

    #[tokio::test]
    async fn failure_is_shared_and_not_retained() {
        let dedup = dedup();
        let calls = Arc::new(AtomicUsize::new(0));

        let attempt = |dedup: RequestDeduplicator<u32, TestError>, calls: Arc<AtomicUsize>| async move {
            dedup
                .dedupe("flaky", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Err(TestError::Failed("database down".into()))
                })
                .await
        };

        let (a, b) = tokio::join!(
            attempt(dedup.clone(), Arc::clone(&calls)),
            attempt(dedup.clone(), Arc::clone(&calls))
        );
        assert_eq!(a, Err(TestError::Failed("database down".into())));
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let again = attempt(dedup.clone(), Arc::clone(&calls)).await;
        assert!(again.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn sequential_calls_execute_fresh() {
        let dedup = dedup();
        let first = dedup.dedupe("k", || async { Ok(1) }).await;
        let second = dedup.dedupe("k", || async { Ok(2) }).await;
        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(2));
    }

    #[tokio::test]
    async fn distinct_keys_do_not_share() {
        let dedup = dedup();
        let (a, b) = tokio::join!(
            dedup.dedupe("a", || async { Ok(1) }),
            dedup.dedupe("b", || async { Ok(2) })
        );
        assert_eq!((a, b), (Ok(1), Ok(2)));
    }

    #[tokio::test]
    async fn expired_entry_is_replaced_and_not_removed_by_stale_completion() {
        let dedup: RequestDeduplicator<u32, TestError> =
            RequestDeduplicator::new(Duration::from_millis(20));
        let (release_first, first_gate) = oneshot::channel::<()>();
        let (release_second, second_gate) = oneshot::channel::<()>();

        let first = tokio::spawn({
            let dedup = dedup.clone();
            async move {
                dedup
                    .dedupe("slow", move || async move {
                        let _ = first_gate.await;
                        Ok(1)
                    })
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(40)).await;

        let second = tokio::spawn({
            let dedup = dedup.clone();
            async move {
                dedup
                    .dedupe("slow", move || async move {
                        let _ = second_gate.await;
                        Ok(2)
                    })
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let _ = release_first.send(());
        assert_eq!(first.await.expect("first task"), Ok(1));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(dedup.pending_len(), 1, "replacement entry must survive");

        let _ = release_second.send(());
        assert_eq!(second.await.expect("second task"), Ok(2));
        assert_eq!(dedup.pending_len(), 0);
    }

    #[tokio::test]
    async fn operation_completes_after_caller_is_dropped() {
        let dedup = dedup();
        let finished = Arc::new(AtomicBool::new(false));

        let caller = tokio::spawn({
            let dedup = dedup.clone();
            let finished = Arc::clone(&finished);
            async move {
                dedup
                    .dedupe("orphan", move || async move {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        finished.store(true, Ordering::SeqCst);
                        Ok(7)
                    })
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        caller.abort();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(dedup.pending_len(), 0);
    }

    #[tokio::test]
    async fn panicking_operation_reports_aborted() {
        let dedup = dedup();
        let result = dedup
            .dedupe("boom", || async {
                if true {
                    panic!("loader exploded");
                }
                Ok(0)
            })
            .await;
        assert!(matches!(result, Err(TestError::Aborted(_))));
        assert_eq!(dedup.pending_len(), 0);
    }

    #[tokio::test]
    async fn forgotten_entry_is_not_joined() {
        let dedup = dedup();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let slow = {
            let dedup = dedup.clone();
            tokio::spawn(async move {
                dedup
                    .dedupe("posts:all", move || async move {
                        let _ = release_rx.await;
                        Ok(1)
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        while dedup.pending_len() == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(dedup.forget_all(), 1);
        let fresh = dedup.dedupe("posts:all", || async { Ok(2) }).await;
        assert_eq!(fresh, Ok(2));

        let _ = release_tx.send(());
        assert_eq!(slow.await.expect("join"), Ok(1));
        assert_eq!(dedup.pending_len(), 0);
    }
}
