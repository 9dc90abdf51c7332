//! Logging subscriber setup.
//!
//! Hermes logs every dispatch inside a `dispatch` span carrying
//! `request_id`, `path` and `instance`, so the JSON output can be filtered
//! per request.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Filter directive (e.g. "info", "hermes_host=debug").
    pub level: String,

    /// Whether to output JSON lines.
    pub json_format: bool,

    /// Whether to emit span open/close events.
    pub span_events: bool,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include the target (module path).
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            span_events: false,
            file_line_info: false,
            include_target: true,
        }
    }
}

impl LogConfig {
    /// Human-readable output at debug level with span lifecycle events.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            json_format: false,
            span_events: true,
            file_line_info: true,
            include_target: true,
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Installs the global logging subscriber.
///
/// Does nothing when logging is disabled.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidConfig`] for an empty level and
/// [`TelemetryError::LoggingInit`] if the filter is invalid or a global
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }
    if config.level.trim().is_empty() {
        return Err(TelemetryError::InvalidConfig(
            "log level must not be empty".to_string(),
        ));
    }

    let filter = create_env_filter(&config.level)?;

    let base = tracing_subscriber::fmt::layer()
        .with_span_events(config.span_events())
        .with_file(config.file_line_info)
        .with_line_number(config.file_line_info)
        .with_target(config.include_target);
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if config.json_format {
        base.json().boxed()
    } else {
        base.pretty().boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    Ok(())
}

/// Installs a compact subscriber that writes through the test harness.
///
/// Honors `RUST_LOG` and defaults to `debug`. Safe to call from every test:
/// only the first call installs anything.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .compact()
        .try_init();
}

/// Creates an env filter from a directive string.
///
/// # Errors
///
/// Returns an error if the directive string is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter).map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
