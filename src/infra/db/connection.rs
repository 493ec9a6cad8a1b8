//! Lazily established, process-wide database handle.
//!
//! [`ConnectionCache`] hands out one shared handle. Concurrent first callers
//! join a single in-flight connect attempt; a failed attempt is forgotten so
//! the next call retries; a handle that reports itself dead is replaced.

use std::{
    net::{IpAddr, SocketAddr},
    str::FromStr,
    sync::Mutex,
    time::Instant,
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use metrics::histogram;
use serde::Serialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::{cache::lock::mutex_lock, config::DatabaseSettings};

const SOURCE: &str = "infra::db::connection";
const METRIC_DB_CONNECT_MS: &str = "inkpost_db_connect_ms";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("database configuration error: {0}")]
    Configuration(String),
    #[error("database connection failed: {0}")]
    Connection(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Connected,
    Connecting,
    Disconnected,
    Failed,
}

/// Opens handles for a [`ConnectionCache`] and reports whether one is usable.
pub trait Connector: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Self::Handle, ConnectError>>;

    fn is_alive(&self, handle: &Self::Handle) -> bool;
}

type SharedAttempt<H> = Shared<BoxFuture<'static, Result<H, ConnectError>>>;

enum Slot<H> {
    Empty,
    Connecting {
        attempt: SharedAttempt<H>,
        generation: u64,
    },
    Ready {
        handle: H,
        created_at: OffsetDateTime,
    },
}

struct CacheState<H> {
    slot: Slot<H>,
    generation: u64,
    last_attempt_failed: bool,
}

pub struct ConnectionCache<C: Connector> {
    connector: C,
    url: Option<String>,
    state: Mutex<CacheState<C::Handle>>,
}

impl<C: Connector> ConnectionCache<C> {
    pub fn new(connector: C, url: Option<String>) -> Self {
        Self {
            connector,
            url,
            state: Mutex::new(CacheState {
                slot: Slot::Empty,
                generation: 0,
                last_attempt_failed: false,
            }),
        }
    }

    /// Return the cached handle, connecting (or joining a pending connect) if needed.
    pub async fn get_connection(&self) -> Result<C::Handle, ConnectError> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| ConnectError::Configuration("database.url is not set".to_string()))?;

        let (attempt, generation) = {
            let mut state = mutex_lock(&self.state, SOURCE, "get_connection");

            if let Slot::Ready { handle, .. } = &state.slot {
                if self.connector.is_alive(handle) {
                    return Ok(handle.clone());
                }
                warn!(target: "inkpost::db", "cached database handle is dead; reconnecting");
                state.slot = Slot::Empty;
            }

            match &state.slot {
                Slot::Connecting {
                    attempt,
                    generation,
                } => (attempt.clone(), *generation),
                _ => {
                    state.generation += 1;
                    let generation = state.generation;
                    let attempt = self.connector.connect(url).shared();
                    state.slot = Slot::Connecting {
                        attempt: attempt.clone(),
                        generation,
                    };
                    debug!(target: "inkpost::db", generation, "starting database connect attempt");
                    (attempt, generation)
                }
            }
        };

        let outcome = attempt.await;

        let mut state = mutex_lock(&self.state, SOURCE, "get_connection.settle");
        let still_current = matches!(
            &state.slot,
            Slot::Connecting { generation: current, .. } if *current == generation
        );

        match outcome {
            Ok(handle) => {
                if still_current {
                    state.slot = Slot::Ready {
                        handle: handle.clone(),
                        created_at: OffsetDateTime::now_utc(),
                    };
                    state.last_attempt_failed = false;
                }
                Ok(handle)
            }
            Err(err) => {
                if still_current {
                    state.slot = Slot::Empty;
                    state.last_attempt_failed = true;
                    warn!(target: "inkpost::db", error = %err, "database connect attempt failed");
                }
                Err(err)
            }
        }
    }

    pub fn readiness(&self) -> Readiness {
        let state = mutex_lock(&self.state, SOURCE, "readiness");
        match &state.slot {
            Slot::Ready { handle, .. } if self.connector.is_alive(handle) => Readiness::Connected,
            Slot::Ready { .. } => Readiness::Disconnected,
            Slot::Connecting { .. } => Readiness::Connecting,
            Slot::Empty if state.last_attempt_failed => Readiness::Failed,
            Slot::Empty => Readiness::Disconnected,
        }
    }

    /// When the current handle was established.
    pub fn connected_since(&self) -> Option<OffsetDateTime> {
        match &mutex_lock(&self.state, SOURCE, "connected_since").slot {
            Slot::Ready { created_at, .. } => Some(*created_at),
            _ => None,
        }
    }
}

/// Opens a `PgPool` with the configured limits and timeouts.
#[derive(Debug, Clone)]
pub struct PgConnector {
    settings: DatabaseSettings,
}

impl PgConnector {
    pub fn new(settings: DatabaseSettings) -> Self {
        Self { settings }
    }
}

impl Connector for PgConnector {
    type Handle = PgPool;

    fn connect(&self, url: &str) -> BoxFuture<'static, Result<PgPool, ConnectError>> {
        let settings = self.settings.clone();
        let url = url.to_string();
        async move {
            let started_at = Instant::now();
            let mut options = PgConnectOptions::from_str(&url).map_err(|err| {
                ConnectError::Configuration(format!("invalid database url: {err}"))
            })?;
            if settings.prefer_ipv4 {
                options = pin_ipv4(options).await;
            }

            // sqlx has no driver-level write retry; the flag only documents intent.
            debug!(
                target: "inkpost::db",
                retry_reads = settings.retry_reads,
                retry_writes = settings.retry_writes,
                max_connections = settings.max_connections.get(),
                "opening database pool"
            );

            let pool = PgPoolOptions::new()
                .max_connections(settings.max_connections.get())
                .acquire_timeout(settings.connect_timeout)
                .idle_timeout(Some(settings.idle_timeout))
                .test_before_acquire(settings.retry_reads)
                .connect_with(options)
                .await
                .map_err(|err| ConnectError::Connection(err.to_string()))?;

            let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
            histogram!(METRIC_DB_CONNECT_MS).record(elapsed_ms);
            info!(target: "inkpost::db", elapsed_ms, "database pool ready");
            Ok(pool)
        }
        .boxed()
    }

    fn is_alive(&self, pool: &PgPool) -> bool {
        !pool.is_closed()
    }
}

async fn pin_ipv4(options: PgConnectOptions) -> PgConnectOptions {
    let host = options.get_host().to_string();
    if host.starts_with('/') || host.parse::<IpAddr>().is_ok() {
        return options;
    }

    match tokio::net::lookup_host((host.as_str(), options.get_port())).await {
        Ok(mut addrs) => {
            match addrs.find(SocketAddr::is_ipv4) {
                Some(addr) => {
                    debug!(target: "inkpost::db", %host, ip = %addr.ip(), "pinned IPv4 address");
                    options.host(&addr.ip().to_string())
                }
                None => options,
            }
        }
        Err(err) => {
            debug!(target: "inkpost::db", %host, error = %err, "host lookup failed; leaving host as is");
            options
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use futures::future::join_all;

    use super::*;

    #[derive(Clone, Default)]
    struct FakeConnector {
        attempts: Arc<AtomicUsize>,
        failing: Arc<AtomicBool>,
    }

    #[derive(Clone)]
    struct FakeHandle {
        id: usize,
        alive: Arc<AtomicBool>,
    }

    impl Connector for FakeConnector {
        type Handle = FakeHandle;

        fn connect(&self, _url: &str) -> BoxFuture<'static, Result<FakeHandle, ConnectError>> {
            let id = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let failing = self.failing.load(Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                if failing {
                    Err(ConnectError::Connection("auth failed".into()))
                } else {
                    Ok(FakeHandle {
                        id,
                        alive: Arc::new(AtomicBool::new(true)),
                    })
                }
            }
            .boxed()
        }

        fn is_alive(&self, handle: &FakeHandle) -> bool {
            handle.alive.load(Ordering::SeqCst)
        }
    }

    fn cache(connector: FakeConnector) -> Arc<ConnectionCache<FakeConnector>> {
        Arc::new(ConnectionCache::new(
            connector,
            Some("postgres://localhost/inkpost".into()),
        ))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_attempt() {
        let connector = FakeConnector::default();
        let cache = cache(connector.clone());

        let handles = join_all((0..12).map(|_| {
            let cache = Arc::clone(&cache);
            async move { cache.get_connection().await }
        }))
        .await;

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert!(handles.iter().all(|h| h.as_ref().map(|h| h.id).ok() == Some(1)));
        assert_eq!(cache.readiness(), Readiness::Connected);
        assert!(cache.connected_since().is_some());
    }

    #[tokio::test]
    async fn missing_url_fails_without_attempt() {
        let connector = FakeConnector::default();
        let cache = ConnectionCache::new(connector.clone(), None);

        let err = cache.get_connection().await.err().expect("must fail");
        assert!(matches!(err, ConnectError::Configuration(_)));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
        assert_eq!(cache.readiness(), Readiness::Disconnected);
    }

    #[tokio::test]
    async fn failure_is_not_cached() {
        let connector = FakeConnector::default();
        connector.failing.store(true, Ordering::SeqCst);
        let cache = cache(connector.clone());

        let (a, b) = tokio::join!(cache.get_connection(), cache.get_connection());
        assert!(matches!(a, Err(ConnectError::Connection(_))));
        assert!(b.is_err());
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(cache.readiness(), Readiness::Failed);

        connector.failing.store(false, Ordering::SeqCst);
        let handle = cache.get_connection().await.ok().expect("retry succeeds");
        assert_eq!(handle.id, 2);
        assert_eq!(cache.readiness(), Readiness::Connected);
    }

    #[tokio::test]
    async fn cached_handle_is_reused() {
        let connector = FakeConnector::default();
        let cache = cache(connector.clone());

        for _ in 0..3 {
            cache.get_connection().await.ok().expect("connect");
        }
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dead_handle_is_replaced() {
        let connector = FakeConnector::default();
        let cache = cache(connector.clone());

        let first = cache.get_connection().await.ok().expect("connect");
        first.alive.store(false, Ordering::SeqCst);
        assert_eq!(cache.readiness(), Readiness::Disconnected);

        let second = cache.get_connection().await.ok().expect("reconnect");
        assert_eq!(second.id, 2);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn readiness_reports_connecting_during_attempt() {
        let connector = FakeConnector::default();
        let cache = cache(connector);

        let pending = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_connection().await.is_ok() })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.readiness(), Readiness::Connecting);
        assert!(pending.await.expect("task"));
    }
}
