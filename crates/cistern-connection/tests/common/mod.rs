//! Shared fixtures for pool integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cistern_connection::{ConnectionPool, DriverConnectionFactory, PoolConfig, PoolStrategy, open_pool};
use cistern_core::ConnectionConfig;
use cistern_drivers::SimulatedDriver;

/// Initialize logging for tests if not already initialized
///
/// Honours `RUST_LOG`; quiet by default.
pub fn initialize_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Open a pool over a fresh simulated backend
pub async fn sim_pool(
    strategy: PoolStrategy,
    config: PoolConfig,
) -> anyhow::Result<(Arc<dyn ConnectionPool>, Arc<SimulatedDriver>)> {
    sim_pool_with(strategy, config, SimulatedDriver::new()).await
}

pub async fn sim_pool_with(
    strategy: PoolStrategy,
    config: PoolConfig,
    driver: SimulatedDriver,
) -> anyhow::Result<(Arc<dyn ConnectionPool>, Arc<SimulatedDriver>)> {
    initialize_logging();
    let driver = Arc::new(driver);
    let factory = DriverConnectionFactory::new(
        driver.clone(),
        ConnectionConfig::new("sim", "sim://scenarios").with_credentials("app", "secret"),
    );
    let pool = open_pool(config.with_strategy(strategy), factory).await?;
    Ok((pool, driver))
}

/// Poll `condition` until it holds, failing the test after one second
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
