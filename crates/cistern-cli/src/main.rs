//! cistern-bench: drive a pool with many concurrent callers and report how it coped

mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use cistern_connection::{ConnectionPool, PoolConfig, PoolRegistry, PoolStrategy};
use cistern_core::CisternError;
use cistern_drivers::{DriverRegistry, SimulatedDriver, sim::SIM_SCHEME};
use comfy_table::{Cell, Table, presets::UTF8_FULL};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Monitor,
    LockFree,
}

impl From<StrategyArg> for PoolStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Monitor => PoolStrategy::Monitor,
            StrategyArg::LockFree => PoolStrategy::LockFree,
        }
    }
}

/// Hammer a connection pool backed by the simulated driver
#[derive(Debug, Parser)]
#[command(name = "cistern-bench", version, about)]
struct Args {
    /// Number of concurrent callers
    #[arg(long, default_value_t = 300)]
    tasks: usize,

    /// How long each caller holds its connection, in milliseconds
    #[arg(long, default_value_t = 50)]
    hold_ms: u64,

    /// Connections opened when the pool is created
    #[arg(long)]
    initial_size: Option<usize>,

    /// Ceiling on connections owned by the pool
    #[arg(long)]
    max_active: Option<usize>,

    /// How long a caller waits for a released connection, in milliseconds
    #[arg(long)]
    wait_timeout_ms: Option<u64>,

    /// Pool engine
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Fraction of connects the simulated backend refuses
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,

    /// Simulated connect latency, in milliseconds
    #[arg(long, default_value_t = 0)]
    connect_latency_ms: u64,

    /// TOML file with pool settings; flags override it
    #[arg(long, env = "CISTERN_POOL_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn pool_config(&self) -> anyhow::Result<PoolConfig> {
        let mut config = match &self.config {
            Some(path) => PoolConfig::from_file(path)
                .with_context(|| format!("loading pool config from {}", path.display()))?,
            None => PoolConfig::default(),
        };

        if let Some(initial_size) = self.initial_size {
            config = config.with_initial_size(initial_size);
        }
        if let Some(max_active) = self.max_active {
            config = config.with_max_active(max_active);
            if self.initial_size.is_none() && config.initial_size() > max_active {
                config = config.with_initial_size(max_active);
            }
        }
        if let Some(timeout) = self.wait_timeout_ms {
            config = config.with_wait_timeout_ms(timeout);
        }
        if let Some(strategy) = self.strategy {
            config = config.with_strategy(strategy.into());
        }

        config.validate()?;
        Ok(config)
    }
}

/// What happened to one caller
enum Outcome {
    Served { waited: Duration },
    TimedOut,
    Failed,
}

#[derive(Default)]
struct Tally {
    served: usize,
    timed_out: usize,
    failed: usize,
    max_wait: Duration,
}

impl Tally {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Served { waited } => {
                self.served += 1;
                self.max_wait = self.max_wait.max(waited);
            }
            Outcome::TimedOut => self.timed_out += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

async fn run_caller(pool: Arc<dyn ConnectionPool>, hold: Duration) -> Outcome {
    let started = Instant::now();
    match pool.acquire().await {
        Ok(conn) => {
            let waited = started.elapsed();
            tokio::time::sleep(hold).await;
            pool.release(conn);
            Outcome::Served { waited }
        }
        Err(CisternError::Timeout(_)) => Outcome::TimedOut,
        Err(e) => {
            tracing::debug!(error = %e, "caller could not get a connection");
            Outcome::Failed
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(logging::LoggingConfig {
        json: args.json_logs,
        ..Default::default()
    })?;

    let config = args.pool_config()?;
    let strategy = config.strategy();
    let initial_size = config.initial_size();

    let driver = Arc::new(
        SimulatedDriver::new()
            .with_failure_rate(args.failure_rate)
            .with_connect_latency(Duration::from_millis(args.connect_latency_ms)),
    );
    let drivers = DriverRegistry::new();
    drivers.register(driver.clone());
    let registry = PoolRegistry::with_config(drivers, config);

    let url = format!("{SIM_SCHEME}bench");
    let pool = registry
        .get_pool("sim", &url, "bench", "", initial_size)
        .await
        .context("creating pool")?;

    tracing::info!(tasks = args.tasks, hold_ms = args.hold_ms, %strategy, "starting load");
    let hold = Duration::from_millis(args.hold_ms);
    let started = Instant::now();
    let handles: Vec<_> = (0..args.tasks)
        .map(|_| tokio::spawn(run_caller(Arc::clone(&pool), hold)))
        .collect();

    let mut tally = Tally::default();
    for handle in handles {
        tally.record(handle.await?);
    }
    let elapsed = started.elapsed();
    let stats = pool.snapshot();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![Cell::new("Metric"), Cell::new("Value")]);
    let rows: Vec<(&str, String)> = vec![
        ("strategy", strategy.to_string()),
        ("tasks", args.tasks.to_string()),
        ("served", tally.served.to_string()),
        ("timed out", tally.timed_out.to_string()),
        ("failed", tally.failed.to_string()),
        ("elapsed", format!("{elapsed:.2?}")),
        ("max wait", format!("{:.2?}", tally.max_wait)),
        ("logical size", stats.logical_size().to_string()),
        ("idle", stats.idle().to_string()),
        ("active", stats.active().to_string()),
        ("in transit", stats.in_transit().to_string()),
        ("waiting", stats.waiting().to_string()),
        ("connections opened", driver.opened().to_string()),
        ("connect failures", driver.failed().to_string()),
    ];
    for (metric, value) in rows {
        table.add_row(vec![Cell::new(metric), Cell::new(value)]);
    }
    println!("{table}");

    Ok(())
}
