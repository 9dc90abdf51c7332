//! Layered configuration loader.

use std::env;
use std::fs;
use std::io;
use std::path::Path;

use crate::{ConfigError, HermesConfig};

/// Configuration loader.
///
/// Layers, later overriding earlier:
/// 1. Default values
/// 2. Configuration file or string (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```
/// use hermes_config::ConfigLoader;
///
/// let toml = r#"
///     [host]
///     instance_name = "unit-tests"
/// "#;
///
/// let config = ConfigLoader::new()
///     .with_string(toml, "toml")
///     .unwrap()
///     .load()
///     .unwrap();
///
/// assert_eq!(config.host.instance_name.as_deref(), Some("unit-tests"));
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: HermesConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Creates a loader starting from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file, picking the format from its extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file does not exist, cannot be read, has
    /// an unsupported extension or fails to parse.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        self.config = parse(&content, &extension)
            .map_err(|err| match err {
                ConfigError::UnsupportedFormat(_) => {
                    ConfigError::UnsupportedFormat(path.display().to_string())
                }
                other => other,
            })?;

        Ok(self)
    }

    /// Loads configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads configuration from a string in the given format ("toml" or "json").
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the format is unknown or parsing fails.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = parse(content, &format.to_lowercase())?;
        Ok(self)
    }

    /// Enables environment overrides of the form `PREFIX__SECTION__KEY`.
    ///
    /// Recognised keys:
    /// - `PREFIX__HOST__INSTANCE_NAME`
    /// - `PREFIX__HOST__DISABLE_WRITES`
    /// - `PREFIX__LOGGING__ENABLED`
    /// - `PREFIX__LOGGING__LEVEL`
    /// - `PREFIX__LOGGING__FORMAT`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Loads variables from a `.env` file (searched from the current directory
    /// upwards) into the process environment.
    ///
    /// A missing `.env` file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Dotenv`] if the file exists but cannot be read
    /// or contains a malformed line.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        accept_missing(dotenvy::dotenv())?;
        Ok(self)
    }

    /// Loads variables from the given env file, if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Dotenv`] if the file exists but cannot be read
    /// or contains a malformed line.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        accept_missing(dotenvy::from_path(path.as_ref()))?;
        Ok(self)
    }

    /// Applies environment overrides and validates the result.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or validation
    /// fails.
    pub fn load(mut self) -> Result<HermesConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without env overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> HermesConfig {
        self.config
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let marker = format!("{prefix}__");
        let mut vars: Vec<(String, String)> =
            env::vars().filter(|(k, _)| k.starts_with(&marker)).collect();
        vars.sort();

        for (key, value) in vars {
            self.apply_env_var(&key, &value, &marker)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, marker: &str) -> Result<(), ConfigError> {
        let rest = key
            .strip_prefix(marker)
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;
        let parts: Vec<&str> = rest.split("__").collect();

        match parts.as_slice() {
            ["HOST", "INSTANCE_NAME"] => {
                self.config.host.instance_name = Some(value.to_string());
            }
            ["HOST", "DISABLE_WRITES"] => {
                self.config.host.disable_writes = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["LOGGING", "ENABLED"] => {
                self.config.logging.enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["LOGGING", "LEVEL"] => {
                self.config.logging.level = value.to_string();
            }
            ["LOGGING", "FORMAT"] => {
                self.config.logging.format = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected 'json' or 'pretty'"))?;
            }
            _ => {
                return Err(ConfigError::env_parse_error(key, "unknown configuration key"));
            }
        }

        Ok(())
    }
}

fn parse(content: &str, format: &str) -> Result<HermesConfig, ConfigError> {
    match format {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

fn accept_missing<T>(result: Result<T, dotenvy::Error>) -> Result<(), ConfigError> {
    match result {
        Ok(_) => Ok(()),
        Err(dotenvy::Error::Io(err)) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogFormat;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, HermesConfig::default());
    }

    #[test]
    fn test_json_string() {
        let json = r#"{"host": {"disable_writes": true}, "logging": {"format": "pretty"}}"#;
        let config = ConfigLoader::new()
            .with_string(json, "JSON")
            .unwrap()
            .load()
            .unwrap();
        assert!(config.host.disable_writes);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_unknown_format() {
        let err = ConfigLoader::new().with_string("", "yaml").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(f) if f == "yaml"));
    }

    #[test]
    fn test_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[host]\ninstance_name = \"from-file\"").unwrap();

        let config = ConfigLoader::new()
            .with_file(file.path())
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.host.instance_name.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::new()
            .with_file("/definitely/not/here.toml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_optional_missing_file() {
        let config = ConfigLoader::new()
            .with_optional_file("/definitely/not/here.toml")
            .unwrap()
            .load_unvalidated();
        assert_eq!(config, HermesConfig::default());
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = ConfigLoader::new().with_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("HERMES_ENV_OK__HOST__INSTANCE_NAME", "env-host");
        env::set_var("HERMES_ENV_OK__HOST__DISABLE_WRITES", "yes");
        env::set_var("HERMES_ENV_OK__LOGGING__FORMAT", "pretty");

        let config = ConfigLoader::new()
            .with_env_prefix("hermes_env_ok")
            .load()
            .unwrap();

        assert_eq!(config.host.instance_name.as_deref(), Some("env-host"));
        assert!(config.host.disable_writes);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_env_bad_bool() {
        env::set_var("HERMES_ENV_BAD__LOGGING__ENABLED", "maybe");
        let err = ConfigLoader::new()
            .with_env_prefix("HERMES_ENV_BAD")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvParseError { .. }));
    }

    #[test]
    fn test_env_unknown_key() {
        env::set_var("HERMES_ENV_UNKNOWN__HOST__PORT", "80");
        let err = ConfigLoader::new()
            .with_env_prefix("HERMES_ENV_UNKNOWN")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("unknown configuration key"));
    }

    #[test]
    fn test_dotenv_file_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "HERMES_DOTENV_OK__HOST__INSTANCE_NAME=from-dotenv").unwrap();

        let config = ConfigLoader::new()
            .with_dotenv_file(file.path())
            .unwrap()
            .with_env_prefix("HERMES_DOTENV_OK")
            .load()
            .unwrap();
        assert_eq!(config.host.instance_name.as_deref(), Some("from-dotenv"));
    }

    #[test]
    fn test_dotenv_missing_file_ignored() {
        let loader = ConfigLoader::new().with_dotenv_file("/definitely/not/here.env");
        assert!(loader.is_ok());
    }

    #[test]
    fn test_dotenv_malformed_file_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "NOT A VALID LINE").unwrap();

        let err = ConfigLoader::new()
            .with_dotenv_file(file.path())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Dotenv(_)));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
