//! Tracing subscriber setup for embedding applications
//!
//! The host itself only emits `tracing` events; installing a subscriber is
//! left to the application. These helpers cover the common setups.

use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-line
    Pretty,

    /// Single line per event
    Compact,

    /// JSON lines (recommended for production)
    Json,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive (e.g. "debug" or "model_plugin_host=trace").
    ///
    /// If None, uses RUST_LOG or defaults to "info".
    pub filter: Option<String>,

    pub format: LogFormat,

    /// Include timestamps in output
    pub timestamps: bool,

    /// Include target module names in output
    pub target: bool,

    /// Include thread IDs in output
    pub thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: None,
            format: LogFormat::Compact,
            timestamps: true,
            target: true,
            thread_ids: false,
        }
    }
}

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

fn env_filter(directive: Option<&str>) -> EnvFilter {
    match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

fn fmt_layer(config: &LoggingConfig) -> BoxedLayer {
    let layer = tracing_subscriber::fmt::layer()
        .with_target(config.target)
        .with_thread_ids(config.thread_ids);

    match (config.format, config.timestamps) {
        (LogFormat::Pretty, true) => layer.pretty().boxed(),
        (LogFormat::Pretty, false) => layer.pretty().without_time().boxed(),
        (LogFormat::Compact, true) => layer.compact().boxed(),
        (LogFormat::Compact, false) => layer.compact().without_time().boxed(),
        (LogFormat::Json, true) => layer.json().boxed(),
        (LogFormat::Json, false) => layer.json().without_time().boxed(),
    }
}

/// Install a subscriber with the given configuration
///
/// Fails if a global subscriber is already set.
pub fn try_init_subscriber(config: &LoggingConfig) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter(config.filter.as_deref()))
        .with(fmt_layer(config))
        .try_init()
}

/// Install a compact subscriber filtered by RUST_LOG (default "info")
///
/// Does nothing if a global subscriber is already set.
pub fn init_subscriber() {
    init_subscriber_with_config(&LoggingConfig::default());
}

/// Like [`try_init_subscriber`], ignoring an already-installed subscriber
pub fn init_subscriber_with_config(config: &LoggingConfig) {
    if let Err(e) = try_init_subscriber(config) {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
}
