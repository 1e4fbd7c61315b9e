//! Tracing and logging support.
//!
//! The dispatcher emits `tracing` events at debug and trace level; nothing
//! is printed unless the program installs a subscriber. This module offers a
//! one-call setup with sensible defaults and customization options.

use std::str::FromStr;

use thiserror::Error;

#[cfg(feature = "logging")]
use tracing_subscriber::{
    layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Environment variable selecting the output format for [`TracingConfig::from_env`].
pub const LOG_FORMAT_ENV: &str = "CMDTREE_LOG_FORMAT";

/// A global subscriber could not be installed, usually because one already is.
#[derive(Debug, Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct InitError(String);

/// Tracing output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable format with colors (default for development).
    #[default]
    Pretty,

    /// Compact format without colors.
    Compact,

    /// JSON format (recommended for production).
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log format {0:?} (expected pretty, compact or json)")]
pub struct UnknownFormat(String);

impl FromStr for TracingFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(TracingFormat::Pretty),
            "compact" => Ok(TracingFormat::Compact),
            "json" => Ok(TracingFormat::Json),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level filter.
    ///
    /// If None, uses RUST_LOG environment variable or defaults to "info".
    pub level: Option<tracing::Level>,

    pub format: TracingFormat,

    /// Include timestamps in output.
    pub timestamps: bool,

    /// Include target module names in output.
    pub target: bool,

    /// Include thread IDs in output.
    pub thread_ids: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: TracingFormat::Pretty,
            timestamps: true,
            target: true,
            thread_ids: false,
        }
    }
}

impl TracingConfig {
    /// Defaults, with the format taken from `CMDTREE_LOG_FORMAT` when it is
    /// set to a known value.
    pub fn from_env() -> Self {
        Self::with_format_var(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }

    fn with_format_var(value: Option<&str>) -> Self {
        let format = match value.map(str::parse::<TracingFormat>) {
            Some(Ok(format)) => format,
            Some(Err(e)) => {
                tracing::warn!("{e}; using pretty output");
                TracingFormat::Pretty
            }
            None => TracingFormat::Pretty,
        };
        Self {
            format,
            ..Self::default()
        }
    }
}

/// Initialize tracing subscriber with default settings.
///
/// Uses RUST_LOG environment variable for level filtering.
/// Defaults to "info" level if RUST_LOG is not set.
///
/// # Example
///
/// ```no_run
/// cmdtree::init_subscriber().ok();
/// ```
///
/// # Environment Variables
///
/// - `RUST_LOG=debug` - Show routing decisions and init hooks
/// - `RUST_LOG=cmdtree=trace` - Also show flag declaration and descent
/// - `CMDTREE_LOG_FORMAT=json` - Output format (`pretty`, `compact`, `json`)
#[cfg(feature = "logging")]
pub fn init_subscriber() -> Result<(), InitError> {
    init_subscriber_with_config(TracingConfig::from_env())
}

/// Initialize tracing subscriber with custom configuration.
///
/// # Example
///
/// ```no_run
/// use cmdtree::{init_subscriber_with_config, TracingConfig, TracingFormat};
///
/// let config = TracingConfig {
///     format: TracingFormat::Json,
///     timestamps: true,
///     ..Default::default()
/// };
/// init_subscriber_with_config(config).expect("subscriber");
/// ```
#[cfg(feature = "logging")]
pub fn init_subscriber_with_config(config: TracingConfig) -> Result<(), InitError> {
    let filter = match config.level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::registry()
        .with(fmt_layer(&config))
        .with(filter)
        .try_init()
        .map_err(|e| InitError(e.to_string()))
}

#[cfg(feature = "logging")]
fn fmt_layer<S>(config: &TracingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let base = tracing_subscriber::fmt::layer()
        .with_target(config.target)
        .with_thread_ids(config.thread_ids);

    match (config.format, config.timestamps) {
        (TracingFormat::Pretty, true) => base.pretty().boxed(),
        (TracingFormat::Pretty, false) => base.pretty().without_time().boxed(),
        (TracingFormat::Compact, true) => base.compact().boxed(),
        (TracingFormat::Compact, false) => base.compact().without_time().boxed(),
        (TracingFormat::Json, true) => base.json().boxed(),
        (TracingFormat::Json, false) => base.json().without_time().boxed(),
    }
}

// Fallback when the logging feature is disabled
#[cfg(not(feature = "logging"))]
pub fn init_subscriber() -> Result<(), InitError> {
    Ok(())
}
