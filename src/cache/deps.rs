//! Tag collector for response-cache invalidation.
//!
//! Uses `tokio::task_local!` so services can record the tags a request read
//! without threading a collector through every call. The response cache
//! middleware opens the scope and stores the collected tags with the entry.

use std::cell::RefCell;
use std::collections::HashSet;

tokio::task_local! {
    static DEPS: RefCell<HashSet<String>>;
}

/// Record a tag dependency. Ignored when no collector is active.
///
/// Must be called on the request task itself; work spawned onto other tasks
/// does not see the collector.
pub fn record(tag: impl Into<String>) {
    let tag = tag.into();
    let _ = DEPS.try_with(|deps| {
        deps.borrow_mut().insert(tag);
    });
}

pub fn record_all<I, S>(tags: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    for tag in tags {
        record(tag);
    }
}

/// Snapshot of the tags recorded so far, or empty outside a collector.
pub fn collect() -> HashSet<String> {
    DEPS.try_with(|deps| deps.borrow().clone())
        .unwrap_or_default()
}

/// Run `f` with a fresh collector and return its output with the recorded tags.
pub async fn with_collector<F, R>(f: F) -> (R, HashSet<String>)
where
    F: std::future::Future<Output = R>,
{
    DEPS.scope(RefCell::new(HashSet::new()), async move {
        let result = f.await;
        (result, collect())
    })
    .await
}
