//! Structured logging for Hermes.
//!
//! The host itself only emits `tracing` events and spans. This crate wires a
//! `tracing-subscriber` registry for embedders that want those events
//! printed, either as JSON lines or in a human-readable form.
//!
//! # Example
//!
//! ```rust,ignore
//! use hermes_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(path = "/echo", "Dispatching");
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, init_test_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
