//! Logging setup for the load harness
//!
//! Logs go to stderr so the report on stdout stays clean. `RUST_LOG` takes
//! precedence over the built-in filter.

use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Emit one JSON object per event instead of human-readable lines
    pub json: bool,

    /// Whether to log span open/close (timing of each acquire)
    pub enable_spans: bool,

    /// Default log level filter
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            enable_spans: false,
            default_filter: "warn,cistern_cli=info,cistern_connection=info,cistern_drivers=info"
                .to_string(),
        }
    }
}

/// Initialize the global subscriber
pub fn init(config: LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = if config.json {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_span_events(span_events)
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry().with(layer).try_init()?;

    tracing::debug!(json = config.json, "logging initialized");
    Ok(())
}
