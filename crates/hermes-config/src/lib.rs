//! Typed configuration for Hermes.
//!
//! Configuration is layered: built-in defaults, then an optional TOML or JSON
//! file, then environment variables of the form `PREFIX__SECTION__KEY`.
//!
//! # Configuration File Format
//!
//! ```toml
//! [host]
//! instance_name = "chat-tests"
//! disable_writes = false
//!
//! [logging]
//! enabled = true
//! level = "hermes_host=debug,info"
//! format = "pretty"
//! ```
//!
//! # Example
//!
//! ```no_run
//! use hermes_config::ConfigLoader;
//!
//! # fn main() -> Result<(), hermes_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("hermes.toml")?
//!     .with_env_prefix("HERMES")
//!     .load()?;
//!
//! println!("instance: {:?}", config.host.instance_name);
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;

pub use config::{HermesConfig, HostConfig, LogFormat, LoggingConfig};
pub use error::ConfigError;
pub use loader::ConfigLoader;
