//! Config loading, validation, and utility operations.

use super::model::Config;
use super::types::DEFAULT_CONFIG_FILE;
use crate::error::{Result, WardenError};
use std::path::Path;
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(WardenError::ConfigError)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            WardenError::ConfigError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load the config the CLI should use.
    ///
    /// An explicit path must exist. Without one, `lockwarden.yaml` in the
    /// working directory is used if present, otherwise the defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse config from a YAML string.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| WardenError::ConfigError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            WardenError::ConfigError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `resource` and `log_level` must be non-empty
    /// - `retry.max_attempts` must be positive
    /// - `retry.multiplier` must be at least 1
    /// - `retry.max_wait_ms`, when set, must not be below `retry.wait_ms`
    pub fn validate(&self) -> Result<()> {
        if self.resource.trim().is_empty() {
            return Err(invalid("resource must not be empty"));
        }

        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be greater than 0"));
        }

        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(WardenError::ConfigError(format!(
                "config validation failed: retry.multiplier must be at least 1.0 (found {})",
                self.retry.multiplier
            )));
        }

        if let Some(max_wait_ms) = self.retry.max_wait_ms
            && max_wait_ms < self.retry.wait_ms
        {
            return Err(WardenError::ConfigError(format!(
                "config validation failed: retry.max_wait_ms ({}) is below retry.wait_ms ({})",
                max_wait_ms, self.retry.wait_ms
            )));
        }

        if self.log_level.trim().is_empty() {
            return Err(invalid("log_level must not be empty"));
        }

        Ok(())
    }

    /// SQLite busy timeout as a duration.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn invalid(message: &str) -> WardenError {
    WardenError::ConfigError(format!("config validation failed: {}", message))
}
