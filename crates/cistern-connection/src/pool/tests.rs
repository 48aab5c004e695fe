//! Tests for connection pool functionality

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cistern_core::{CisternError, Connection, Result};
use futures::poll;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rstest::rstest;

use super::config::{PoolConfig, PoolStrategy};
use super::factory::ConnectionFactory;
use super::handle::PooledConnection;
use super::monitor::MonitorPool;
use super::pool::{ConnectionPool, open_pool};
use super::stats::PoolStats;

/// Mock connection that can be killed or made to hang on liveness checks
struct MockConnection {
    #[allow(dead_code)]
    id: usize,
    alive: AtomicBool,
    stalled: AtomicBool,
    closed: AtomicBool,
}

impl MockConnection {
    fn new(id: usize) -> Self {
        Self {
            id,
            alive: AtomicBool::new(true),
            stalled: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn is_valid(&self, _timeout: Duration) -> bool {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Mock factory that counts and keeps every connection it creates
struct MockConnectionFactory {
    counter: AtomicUsize,
    refuse: AtomicBool,
    stall_create: AtomicBool,
    created: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockConnectionFactory {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            counter: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            stall_create: AtomicBool::new(false),
            created: Mutex::new(Vec::new()),
        })
    }

    fn count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Make `create` hang until the caller gives up
    fn stall_create(&self, stall: bool) {
        self.stall_create.store(stall, Ordering::SeqCst);
    }

    /// Make liveness checks on existing connections hang
    fn stall_validation(&self, stall: bool) {
        for conn in self.created.lock().iter() {
            conn.stalled.store(stall, Ordering::SeqCst);
        }
    }

    fn kill_all(&self) {
        for conn in self.created.lock().iter() {
            conn.kill();
        }
    }

    fn created(&self, index: usize) -> Arc<MockConnection> {
        self.created.lock()[index].clone()
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        if self.stall_create.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(CisternError::Connection("connection refused".into()));
        }
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        let conn = Arc::new(MockConnection::new(id));
        self.created.lock().push(conn.clone());
        Ok(conn)
    }
}

async fn mock_pool(
    strategy: PoolStrategy,
    initial_size: usize,
    max_active: usize,
    factory: &Arc<MockConnectionFactory>,
) -> Arc<dyn ConnectionPool> {
    let config = PoolConfig::new(initial_size, max_active)
        .with_wait_timeout_ms(200)
        .with_validation_timeout_ms(50)
        .with_strategy(strategy);
    open_pool(config, factory.clone())
        .await
        .expect("pool should open")
}

// =============================================================================
// PoolConfig tests
// =============================================================================

#[test]
fn test_pool_config_creation() {
    let config = PoolConfig::new(2, 10);
    assert_eq!(config.initial_size(), 2);
    assert_eq!(config.max_active(), 10);
    assert_eq!(config.validation_timeout(), Duration::from_millis(2_000));
    assert_eq!(config.wait_timeout(), Duration::from_millis(3_000));
    assert_eq!(config.strategy(), PoolStrategy::LockFree);
}

#[test]
fn test_pool_config_default() {
    let config = PoolConfig::default();
    assert_eq!(config.initial_size(), 10);
    assert_eq!(config.max_active(), 100);
}

#[test]
#[should_panic(expected = "max_active must be greater than 0")]
fn test_pool_config_invalid_max_active() {
    PoolConfig::new(0, 0);
}

#[test]
#[should_panic(expected = "initial_size (10) cannot exceed max_active (5)")]
fn test_pool_config_initial_exceeds_max() {
    PoolConfig::new(10, 5);
}

#[test]
fn test_pool_config_validate() {
    assert!(PoolConfig::new(1, 5).validate().is_ok());

    let err = PoolConfig::new(1, 5)
        .with_initial_size(6)
        .validate()
        .unwrap_err();
    assert!(matches!(err, CisternError::Configuration(_)));

    let err = PoolConfig::new(0, 5).with_max_active(0).validate().unwrap_err();
    assert!(matches!(err, CisternError::Configuration(_)));
}

#[test]
fn test_pool_config_from_toml() {
    let config = PoolConfig::from_toml_str(
        r#"
        initial_size = 2
        max_active = 8
        wait_timeout_ms = 500
        strategy = "monitor"
        "#,
    )
    .unwrap();

    assert_eq!(config.initial_size(), 2);
    assert_eq!(config.max_active(), 8);
    assert_eq!(config.wait_timeout(), Duration::from_millis(500));
    assert_eq!(config.validation_timeout(), Duration::from_millis(2_000));
    assert_eq!(config.strategy(), PoolStrategy::Monitor);
}

#[test]
fn test_pool_config_from_toml_rejects_bad_sizes() {
    let err = PoolConfig::from_toml_str("initial_size = 20\nmax_active = 10").unwrap_err();
    assert!(matches!(err, CisternError::Configuration(_)));

    let err = PoolConfig::from_toml_str("strategy = \"spinlock\"").unwrap_err();
    assert!(matches!(err, CisternError::Configuration(_)));
}

#[test]
fn test_pool_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pool.toml");
    std::fs::write(&path, "max_active = 3\ninitial_size = 1\n").unwrap();

    let config = PoolConfig::from_file(&path).unwrap();
    assert_eq!(config.max_active(), 3);
    assert_eq!(config.initial_size(), 1);

    let missing = PoolConfig::from_file(dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(missing, CisternError::Io(_)));
}

#[test]
fn test_pool_config_serialization() {
    let config = PoolConfig::new(2, 10)
        .with_wait_timeout_ms(5000)
        .with_strategy(PoolStrategy::Monitor);

    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"strategy\":\"monitor\""));
    let deserialized: PoolConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(config, deserialized);
}

#[test]
fn test_pool_strategy_display() {
    assert_eq!(PoolStrategy::Monitor.to_string(), "monitor");
    assert_eq!(PoolStrategy::LockFree.to_string(), "lock_free");
}

// =============================================================================
// PoolStats tests
// =============================================================================

#[test]
fn test_pool_stats_utilization() {
    assert_eq!(PoolStats::default().utilization(), 0.0);
    assert_eq!(PoolStats::new(4, 2, 2, 0, 0).utilization(), 0.5);
    assert_eq!(PoolStats::new(4, 0, 4, 0, 3).utilization(), 1.0);
}

#[test]
fn test_pool_stats_is_full() {
    assert!(!PoolStats::default().is_full());
    assert!(!PoolStats::new(4, 1, 3, 0, 0).is_full());
    assert!(PoolStats::new(4, 0, 4, 0, 1).is_full());
}

// =============================================================================
// PooledConnection tests
// =============================================================================

#[tokio::test]
async fn test_pooled_connection_replace_keeps_id() {
    let stale = Arc::new(MockConnection::new(0));
    let mut conn = PooledConnection::new(stale.clone());
    let id = conn.id();

    let previous = conn.replace(Arc::new(MockConnection::new(1)));
    assert_eq!(conn.id(), id);
    assert!(Arc::ptr_eq(&previous, &(stale as Arc<dyn Connection>)));
    assert_eq!(conn.driver_name(), "mock");
}

// =============================================================================
// Engine tests (both strategies)
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_open_pool_warms_up(
    #[values(PoolStrategy::Monitor, PoolStrategy::LockFree)] strategy: PoolStrategy,
) {
    let factory = MockConnectionFactory::new();
    let pool = mock_pool(strategy, 3, 5, &factory).await;

    assert_eq!(pool.strategy(), strategy);
    assert_eq!(factory.count(), 3);
    assert_eq!(pool.snapshot(), PoolStats::new(3, 3, 0, 0, 0));
}

#[rstest]
#[tokio::test]
async fn test_open_pool_fails_when_warm_up_fails(
    #[values(PoolStrategy::Monitor, PoolStrategy::LockFree)] strategy: PoolStrategy,
) {
    let factory = MockConnectionFactory::new();
    factory.refuse(true);
    let config = PoolConfig::new(2, 5).with_strategy(strategy);

    let result = open_pool(config, factory.clone()).await;
    assert!(matches!(result, Err(CisternError::Connection(_))));
}

#[rstest]
#[tokio::test]
async fn test_acquire_reuses_idle(
    #[values(PoolStrategy::Monitor, PoolStrategy::LockFree)] strategy: PoolStrategy,
) {
    let factory = MockConnectionFactory::new();
    let pool = mock_pool(strategy, 1, 5, &factory).await;

    let conn = pool.acquire().await.unwrap();
    assert_eq!(factory.count(), 1);
    assert_eq!(pool.snapshot(), PoolStats::new(1, 0, 1, 0, 0));

    let id = conn.id();
    pool.release(conn);
    assert_eq!(pool.snapshot(), PoolStats::new(1, 1, 0, 0, 0));

    let again = pool.acquire().await.unwrap();
    assert_eq!(again.id(), id);
    assert_eq!(factory.count(), 1);
    pool.release(again);
}

#[rstest]
#[tokio::test]
async fn test_acquire_grows_up_to_max(
    #[values(PoolStrategy::Monitor, PoolStrategy::LockFree)] strategy: PoolStrategy,
) {
    let factory = MockConnectionFactory::new();
    let pool = mock_pool(strategy, 0, 2, &factory).await;
    assert_eq!(pool.snapshot().logical_size(), 0);

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(factory.count(), 2);
    assert_eq!(pool.snapshot(), PoolStats::new(2, 0, 2, 0, 0));

    pool.release(a);
    pool.release(b);
    assert_eq!(pool.snapshot(), PoolStats::new(2, 2, 0, 0, 0));
}

#[rstest]
#[tokio::test]
async fn test_creation_failure_gives_back_capacity(
    #[values(PoolStrategy::Monitor, PoolStrategy::LockFree)] strategy: PoolStrategy,
) {
    let factory = MockConnectionFactory::new();
    let pool = mock_pool(strategy, 0, 1, &factory).await;

    factory.refuse(true);
    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, CisternError::Connection(_)));
    assert_eq!(pool.snapshot(), PoolStats::default());

    // The failed attempt must not have used up the only slot
    factory.refuse(false);
    let conn = pool.acquire().await.unwrap();
    assert_eq!(pool.snapshot().logical_size(), 1);
    pool.release(conn);
}

#[rstest]
#[tokio::test]
async fn test_dead_idle_connection_is_replaced_in_place(
    #[values(PoolStrategy::Monitor, PoolStrategy::LockFree)] strategy: PoolStrategy,
) {
    let factory = MockConnectionFactory::new();
    let pool = mock_pool(strategy, 1, 1, &factory).await;

    let conn = pool.acquire().await.unwrap();
    let id = conn.id();
    pool.release(conn);

    factory.kill_all();
    let conn = pool.acquire().await.unwrap();
    assert_eq!(conn.id(), id);
    assert_eq!(factory.count(), 2);
    assert!(conn.is_valid(Duration::from_millis(10)).await);
    assert_eq!(pool.snapshot(), PoolStats::new(1, 0, 1, 0, 0));

    // Replaced slot is still recognised on release
    pool.release(conn);
    assert_eq!(pool.snapshot(), PoolStats::new(1, 1, 0, 0, 0));
}

#[rstest]
#[tokio::test]
async fn test_failed_replacement_discards_slot(
    #[values(PoolStrategy::Monitor, PoolStrategy::LockFree)] strategy: PoolStrategy,
) {
    let factory = MockConnectionFactory::new();
    let pool = mock_pool(strategy, 1, 1, &factory).await;

    factory.kill_all();
    factory.refuse(true);
    assert!(pool.acquire().await.is_err());
    assert_eq!(pool.snapshot(), PoolStats::default());

    factory.refuse(false);
    let conn = pool.acquire().await.unwrap();
    assert_eq!(pool.snapshot(), PoolStats::new(1, 0, 1, 0, 0));
    pool.release(conn);
}

#[rstest]
#[tokio::test]
async fn test_release_of_foreign_connection_is_ignored(
    #[values(PoolStrategy::Monitor, PoolStrategy::LockFree)] strategy: PoolStrategy,
) {
    let factory = MockConnectionFactory::new();
    let pool = mock_pool(strategy, 1, 2, &factory).await;
    let other = mock_pool(strategy, 1, 2, &factory).await;

    let foreign = other.acquire().await.unwrap();
    pool.release(foreign);
    assert_eq!(pool.snapshot(), PoolStats::new(1, 1, 0, 0, 0));
    assert_eq!(other.snapshot(), PoolStats::new(1, 0, 1, 0, 0));
}

#[rstest]
#[tokio::test]
async fn test_close_idle(
    #[values(PoolStrategy::Monitor, PoolStrategy::LockFree)] strategy: PoolStrategy,
) {
    let factory = MockConnectionFactory::new();
    let pool = mock_pool(strategy, 3, 5, &factory).await;

    let held = pool.acquire().await.unwrap();
    assert_eq!(pool.close_idle().await, 2);
    assert_eq!(pool.snapshot(), PoolStats::new(1, 0, 1, 0, 0));

    let closed = (0..3).filter(|&i| factory.created(i).is_closed()).count();
    assert_eq!(closed, 2);
    assert!(!held.is_closed());

    pool.release(held);
    assert_eq!(pool.close_idle().await, 1);
    assert_eq!(pool.snapshot(), PoolStats::default());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_wait_times_out_when_exhausted(
    #[values(PoolStrategy::Monitor, PoolStrategy::LockFree)] strategy: PoolStrategy,
) {
    let factory = MockConnectionFactory::new();
    let pool = mock_pool(strategy, 1, 1, &factory).await;
    let held = pool.acquire().await.unwrap();

    let start = tokio::time::Instant::now();
    let err = pool.acquire().await.unwrap_err();
    assert!(err.is_timeout());
    assert!(start.elapsed() >= Duration::from_millis(200));
    assert_eq!(factory.count(), 1);

    // Nobody is waiting any more, so the release goes to idle
    pool.release(held);
    let stats = pool.snapshot();
    assert_eq!(stats.idle(), 1);
    assert_eq!(stats.active(), 0);
    assert_eq!(stats.in_transit(), 0);
}

#[rstest]
#[tokio::test]
async fn test_release_hands_off_to_waiter(
    #[values(PoolStrategy::Monitor, PoolStrategy::LockFree)] strategy: PoolStrategy,
) {
    let factory = MockConnectionFactory::new();
    let pool = mock_pool(strategy, 1, 1, &factory).await;
    let held = pool.acquire().await.unwrap();
    let id = held.id();

    let mut waiter = pool.acquire();
    assert!(poll!(&mut waiter).is_pending());
    assert_eq!(pool.snapshot().waiting(), 1);

    pool.release(held);
    assert_eq!(pool.snapshot(), PoolStats::new(1, 0, 1, 1, 0));

    let conn = waiter.await.unwrap();
    assert_eq!(conn.id(), id);
    assert_eq!(pool.snapshot(), PoolStats::new(1, 0, 1, 0, 0));
    pool.release(conn);
}

#[rstest]
#[tokio::test]
async fn test_cancelled_waiter_returns_handoff(
    #[values(PoolStrategy::Monitor, PoolStrategy::LockFree)] strategy: PoolStrategy,
) {
    let factory = MockConnectionFactory::new();
    let pool = mock_pool(strategy, 1, 1, &factory).await;
    let held = pool.acquire().await.unwrap();

    let mut waiter = pool.acquire();
    assert!(poll!(&mut waiter).is_pending());
    pool.release(held);
    assert_eq!(pool.snapshot().in_transit(), 1);

    drop(waiter);
    assert_eq!(pool.snapshot(), PoolStats::new(1, 1, 0, 0, 0));

    let conn = pool.acquire().await.unwrap();
    pool.release(conn);
}

#[rstest]
#[tokio::test]
async fn test_cancelled_waiter_is_skipped(
    #[values(PoolStrategy::Monitor, PoolStrategy::LockFree)] strategy: PoolStrategy,
) {
    let factory = MockConnectionFactory::new();
    let pool = mock_pool(strategy, 1, 1, &factory).await;
    let held = pool.acquire().await.unwrap();

    let mut gone = pool.acquire();
    assert!(poll!(&mut gone).is_pending());
    drop(gone);

    let mut next = pool.acquire();
    assert!(poll!(&mut next).is_pending());

    pool.release(held);
    let conn = next.await.unwrap();
    let stats = pool.snapshot();
    assert_eq!(stats.active(), 1);
    assert_eq!(stats.idle(), 0);
    assert_eq!(stats.in_transit(), 0);
    pool.release(conn);
}

#[rstest]
#[tokio::test]
async fn test_handed_off_dead_connection_is_replaced(
    #[values(PoolStrategy::Monitor, PoolStrategy::LockFree)] strategy: PoolStrategy,
) {
    let factory = MockConnectionFactory::new();
    let pool = mock_pool(strategy, 1, 1, &factory).await;
    let held = pool.acquire().await.unwrap();
    let id = held.id();

    let mut waiter = pool.acquire();
    assert!(poll!(&mut waiter).is_pending());

    factory.kill_all();
    pool.release(held);

    let conn = waiter.await.unwrap();
    assert_eq!(conn.id(), id);
    assert_eq!(factory.count(), 2);
    assert!(conn.is_valid(Duration::from_millis(10)).await);
    pool.release(conn);
}

#[rstest]
#[tokio::test]
async fn test_cancelled_open_gives_back_capacity(
    #[values(PoolStrategy::Monitor, PoolStrategy::LockFree)] strategy: PoolStrategy,
) {
    let factory = MockConnectionFactory::new();
    let pool = mock_pool(strategy, 0, 1, &factory).await;

    factory.stall_create(true);
    let mut opening = pool.acquire();
    assert!(poll!(&mut opening).is_pending());
    assert_eq!(pool.snapshot().logical_size(), 1);

    drop(opening);
    assert_eq!(pool.snapshot(), PoolStats::default());

    factory.stall_create(false);
    let conn = pool.acquire().await.unwrap();
    assert_eq!(pool.snapshot(), PoolStats::new(1, 0, 1, 0, 0));
    pool.release(conn);
}

#[rstest]
#[tokio::test]
async fn test_cancelled_idle_revalidation_gives_back_capacity(
    #[values(PoolStrategy::Monitor, PoolStrategy::LockFree)] strategy: PoolStrategy,
) {
    let factory = MockConnectionFactory::new();
    let pool = mock_pool(strategy, 1, 1, &factory).await;

    factory.stall_validation(true);
    let mut checking = pool.acquire();
    assert!(poll!(&mut checking).is_pending());
    assert_eq!(pool.snapshot().idle(), 0);

    drop(checking);
    assert_eq!(pool.snapshot(), PoolStats::default());

    let conn = pool.acquire().await.unwrap();
    assert_eq!(factory.count(), 2);
    assert_eq!(pool.snapshot(), PoolStats::new(1, 0, 1, 0, 0));
    pool.release(conn);
}

#[rstest]
#[tokio::test]
async fn test_cancelled_handoff_revalidation_gives_back_capacity(
    #[values(PoolStrategy::Monitor, PoolStrategy::LockFree)] strategy: PoolStrategy,
) {
    let factory = MockConnectionFactory::new();
    let pool = mock_pool(strategy, 1, 1, &factory).await;
    let held = pool.acquire().await.unwrap();

    let mut waiter = pool.acquire();
    assert!(poll!(&mut waiter).is_pending());

    factory.stall_validation(true);
    pool.release(held);
    // Picks up the handoff, then hangs in the liveness check
    assert!(poll!(&mut waiter).is_pending());
    assert_eq!(pool.snapshot().in_transit(), 0);

    drop(waiter);
    let stats = pool.snapshot();
    assert_eq!(stats.logical_size(), 0);
    assert_eq!(stats.active(), 0);
    assert_eq!(stats.idle(), 0);

    let conn = pool.acquire().await.unwrap();
    assert_eq!(pool.snapshot().logical_size(), 1);
    pool.release(conn);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_prunes_departed_waiters() {
    let factory = MockConnectionFactory::new();
    let config = PoolConfig::new(1, 1)
        .with_wait_timeout_ms(10)
        .with_strategy(PoolStrategy::Monitor);
    let pool = MonitorPool::new(config, factory.clone()).await.unwrap();
    let held = pool.acquire().await.unwrap();

    for _ in 0..5 {
        assert!(pool.acquire().await.unwrap_err().is_timeout());
    }
    // Only the sender of the latest departed caller is left over
    assert_eq!(pool.queued_waiters(), 1);
    assert_eq!(pool.snapshot().waiting(), 0);

    pool.release(held);
    assert_eq!(pool.queued_waiters(), 0);
    assert_eq!(pool.snapshot().idle(), 1);
}
