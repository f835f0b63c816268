//! Adapter configuration.
//!
//! Loaded from TOML, with environment overrides applied on top. Every field
//! has a default so an empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CloudError, CloudResult};

/// Default values.
pub mod defaults {
    pub const EVENT_CHECK_INTERVAL_SECS: u64 = 5;
    pub const MODEL_ID: &str = "dtmi:com:example:azuresphere:thermometer;1";
    pub const UPLOAD_ENABLED_PROPERTY: &str = "telemetryUploadEnabled";
    pub const CHANNEL_CAPACITY: usize = 64;
}

/// Environment variable names.
pub mod env_vars {
    pub const EVENT_INTERVAL_SECS: &str = "TWINSYNC_EVENT_INTERVAL_SECS";
    pub const MODEL_ID: &str = "TWINSYNC_MODEL_ID";
    pub const SERIAL_NUMBER: &str = "TWINSYNC_SERIAL_NUMBER";
}

/// Cloud adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CloudConfig {
    /// Period of the pending-event retry tick, in seconds
    pub event_check_interval_secs: u64,
    /// Device model identifier announced to the backend
    pub model_id: String,
    /// Desired property carrying the upload-enabled state
    pub upload_enabled_property: String,
    /// Serial number reported on every established connection
    pub serial_number: Option<String>,
    /// Capacity of the runtime request channel
    pub channel_capacity: usize,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            event_check_interval_secs: defaults::EVENT_CHECK_INTERVAL_SECS,
            model_id: defaults::MODEL_ID.to_string(),
            upload_enabled_property: defaults::UPLOAD_ENABLED_PROPERTY.to_string(),
            serial_number: None,
            channel_capacity: defaults::CHANNEL_CAPACITY,
        }
    }
}

impl CloudConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> CloudResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> CloudResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CloudError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(self) -> CloudResult<Self> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn apply_overrides<F>(mut self, lookup: F) -> CloudResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(env_vars::EVENT_INTERVAL_SECS) {
            self.event_check_interval_secs = value.trim().parse().map_err(|_| {
                CloudError::config(format!(
                    "{} must be a whole number of seconds, got {:?}",
                    env_vars::EVENT_INTERVAL_SECS,
                    value
                ))
            })?;
        }
        if let Some(value) = lookup(env_vars::MODEL_ID) {
            self.model_id = value;
        }
        if let Some(value) = lookup(env_vars::SERIAL_NUMBER) {
            self.serial_number = Some(value);
        }
        Ok(self)
    }

    /// Set the retry tick period.
    pub fn with_event_check_interval_secs(mut self, secs: u64) -> Self {
        self.event_check_interval_secs = secs;
        self
    }

    /// Set the serial number.
    pub fn with_serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    /// Set the recognized desired property.
    pub fn with_upload_enabled_property(mut self, property: impl Into<String>) -> Self {
        self.upload_enabled_property = property.into();
        self
    }

    pub fn event_check_interval(&self) -> Duration {
        Duration::from_secs(self.event_check_interval_secs)
    }

    /// Check the values the adapter relies on.
    ///
    /// A zero tick period is left to timer creation, which reports it as an
    /// event timer failure.
    pub fn validate(&self) -> CloudResult<()> {
        if self.model_id.trim().is_empty() {
            return Err(CloudError::config("model_id must not be empty"));
        }
        if self.upload_enabled_property.trim().is_empty() {
            return Err(CloudError::config(
                "upload_enabled_property must not be empty",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(CloudError::config("channel_capacity must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = CloudConfig::default();

        assert_eq!(config.event_check_interval_secs, 5);
        assert_eq!(config.event_check_interval(), Duration::from_secs(5));
        assert_eq!(config.model_id, defaults::MODEL_ID);
        assert_eq!(config.upload_enabled_property, "telemetryUploadEnabled");
        assert!(config.serial_number.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config = CloudConfig::from_toml_str("").unwrap();
        assert_eq!(config, CloudConfig::default());
    }

    #[test]
    fn test_config_from_toml() {
        let config = CloudConfig::from_toml_str(
            r#"
            event_check_interval_secs = 10
            serial_number = "SN-1"
            "#,
        )
        .unwrap();

        assert_eq!(config.event_check_interval_secs, 10);
        assert_eq!(config.serial_number.as_deref(), Some("SN-1"));
        assert_eq!(config.model_id, defaults::MODEL_ID);
    }

    #[test]
    fn test_config_invalid_toml() {
        let result = CloudConfig::from_toml_str("event_check_interval_secs = \"soon\"");
        assert!(matches!(result, Err(CloudError::Config(_))));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (env_vars::EVENT_INTERVAL_SECS, "2"),
            (env_vars::SERIAL_NUMBER, "SN-ENV"),
        ]);

        let config = CloudConfig::default()
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.event_check_interval_secs, 2);
        assert_eq!(config.serial_number.as_deref(), Some("SN-ENV"));
    }

    #[test]
    fn test_overrides_reject_bad_interval() {
        let result = CloudConfig::default().apply_overrides(|name| {
            (name == env_vars::EVENT_INTERVAL_SECS).then(|| "five".to_string())
        });
        assert!(matches!(result, Err(CloudError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_property() {
        let config = CloudConfig::default().with_upload_enabled_property(" ");
        assert!(config.validate().is_err());
    }
}
