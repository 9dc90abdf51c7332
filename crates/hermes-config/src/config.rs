//! Configuration types.

use hermes_telemetry::LogConfig;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Complete Hermes configuration.
///
/// # Example
///
/// ```
/// use hermes_config::HermesConfig;
///
/// let config = HermesConfig::default();
/// assert!(config.host.instance_name.is_none());
/// assert!(!config.host.disable_writes);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct HermesConfig {
    /// Host settings.
    #[serde(default)]
    pub host: HostConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HermesConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - `host.instance_name` is set but blank
    /// - `logging.level` is blank while logging is enabled
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.host.instance_name {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    "host.instance_name",
                    "must not be blank",
                ));
            }
        }

        if self.logging.enabled && self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "logging.level",
                "must not be blank when logging is enabled",
            ));
        }

        Ok(())
    }
}

/// Settings applied to a memory host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Label used in log spans. Derived from the process when unset.
    #[serde(default)]
    pub instance_name: Option<String>,

    /// Default for `disable_writes` on `get`/`post` dispatches.
    #[serde(default)]
    pub disable_writes: bool,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(ConfigError::invalid_value(
                "logging.format",
                format!("expected 'json' or 'pretty', got '{other}'"),
            )),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Whether logging is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive.
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_level(),
            format: LogFormat::Json,
        }
    }
}

impl LoggingConfig {
    /// Converts this section into a subscriber configuration.
    #[must_use]
    pub fn to_log_config(&self) -> LogConfig {
        match self.format {
            LogFormat::Json => LogConfig {
                enabled: self.enabled,
                level: self.level.clone(),
                ..LogConfig::default()
            },
            LogFormat::Pretty => LogConfig {
                enabled: self.enabled,
                level: self.level.clone(),
                ..LogConfig::development()
            },
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(HermesConfig::default().validate().is_ok());
    }

    #[test]
    fn test_blank_instance_name_rejected() {
        let mut config = HermesConfig::default();
        config.host.instance_name = Some("   ".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("host.instance_name"));
    }

    #[test]
    fn test_blank_level_allowed_when_disabled() {
        let mut config = HermesConfig::default();
        config.logging.level = String::new();
        assert!(config.validate().is_err());

        config.logging.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_to_log_config() {
        let section = LoggingConfig {
            enabled: true,
            level: "debug".to_string(),
            format: LogFormat::Pretty,
        };
        let log = section.to_log_config();
        assert!(!log.json_format);
        assert_eq!(log.level, "debug");

        let json = LoggingConfig::default().to_log_config();
        assert!(json.json_format);
        assert_eq!(json.level, "info");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<HermesConfig, _> = toml::from_str("[host]\nport = 80\n");
        assert!(result.is_err());
    }
}
