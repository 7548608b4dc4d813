//! Settings persistence for the telemetry bridge
//!
//! Settings live in a JSON file next to the host's other plugin settings.
//! Loading merges missing keys from the defaults, including the nested
//! `enabled_sensors` keys, so a partial or older file never fails to load.

use crate::protocol::SensorCategory;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Settings file name inside the settings directory
pub const SETTINGS_FILE: &str = "settings.json";

/// Environment variable pointing at the host's settings directory
pub const SETTINGS_DIR_ENV: &str = "DECKY_PLUGIN_SETTINGS_DIR";

/// Placeholder returned instead of a stored password
pub const PASSWORD_MASK: &str = "****";

/// Hostname used when the system does not report one
pub const FALLBACK_HOSTNAME: &str = "steamdeck";

/// Persisted bridge settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Broker host; empty means stay disconnected
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: String,
    pub mqtt_password: String,
    /// Device hostname used for topics and entity names
    pub hostname: String,
    /// Seconds between telemetry publications
    pub publish_interval: u64,
    pub enabled_sensors: EnabledSensors,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mqtt_host: String::new(),
            mqtt_port: 1883,
            mqtt_username: String::new(),
            mqtt_password: String::new(),
            hostname: default_hostname(),
            publish_interval: 30,
            enabled_sensors: EnabledSensors::default(),
        }
    }
}

/// Per-category enablement; missing keys default to enabled
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnabledSensors {
    pub battery: bool,
    pub disk: bool,
    pub network: bool,
    pub game: bool,
    pub download: bool,
}

impl Default for EnabledSensors {
    fn default() -> Self {
        Self {
            battery: true,
            disk: true,
            network: true,
            game: true,
            download: true,
        }
    }
}

impl EnabledSensors {
    pub fn is_enabled(&self, category: SensorCategory) -> bool {
        match category {
            SensorCategory::Battery => self.battery,
            SensorCategory::Disk => self.disk,
            SensorCategory::Network => self.network,
            SensorCategory::Game => self.game,
            SensorCategory::Download => self.download,
        }
    }

    pub fn set(&mut self, category: SensorCategory, enabled: bool) {
        match category {
            SensorCategory::Battery => self.battery = enabled,
            SensorCategory::Disk => self.disk = enabled,
            SensorCategory::Network => self.network = enabled,
            SensorCategory::Game => self.game = enabled,
            SensorCategory::Download => self.download = enabled,
        }
    }
}

/// Connection parameters handed to the MQTT client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    /// Raw device hostname; sanitized by the client
    pub hostname: String,
}

impl ConnectionSettings {
    /// Credentials are only sent when both parts are present
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match self.password.as_deref() {
            Some(password) if !self.username.is_empty() && !password.is_empty() => {
                Some((self.username.as_str(), password))
            }
            _ => None,
        }
    }
}

/// Settings loading and saving errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access settings file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse settings JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Settings {
    /// Load settings from a JSON file, filling missing keys from defaults
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings, keeping defaults when the file is absent or unreadable
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!(path = %path.display(), "No settings file, using defaults");
            return Self::default();
        }

        match Self::load_from_file(path) {
            Ok(settings) => {
                info!(path = %path.display(), "Settings loaded successfully");
                settings
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Error loading settings, keeping defaults");
                Self::default()
            }
        }
    }

    /// Write settings as pretty-printed JSON, creating the directory if needed
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!(path = %path.display(), "Settings saved successfully");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.publish_interval == 0 {
            return Err(ConfigError::InvalidConfig(
                "publish_interval must be at least 1 second".to_string(),
            ));
        }
        if self.mqtt_port == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt_port must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy with the password replaced by [`PASSWORD_MASK`] when one is stored
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.mqtt_password = if self.mqtt_password.is_empty() {
            String::new()
        } else {
            PASSWORD_MASK.to_string()
        };
        copy
    }

    /// A masked password coming back from the host keeps the stored one
    pub fn restore_masked_password(&mut self, previous: &Settings) {
        if self.mqtt_password == PASSWORD_MASK {
            self.mqtt_password = previous.mqtt_password.clone();
        }
    }

    /// True when a broker host is configured
    pub fn has_broker(&self) -> bool {
        !self.mqtt_host.trim().is_empty()
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval.max(1))
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            host: self.mqtt_host.trim().to_string(),
            port: self.mqtt_port,
            username: self.mqtt_username.clone(),
            password: if self.mqtt_password.is_empty() {
                None
            } else {
                Some(self.mqtt_password.clone())
            },
            hostname: self.hostname.clone(),
        }
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_settings() -> Self {
        Self {
            mqtt_host: "localhost".to_string(),
            hostname: "Test Deck".to_string(),
            ..Default::default()
        }
    }
}

/// Default settings path: `$DECKY_PLUGIN_SETTINGS_DIR/settings.json`, else `./settings.json`
pub fn default_settings_path() -> PathBuf {
    match std::env::var(SETTINGS_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir).join(SETTINGS_FILE),
        _ => PathBuf::from(SETTINGS_FILE),
    }
}

/// System hostname, or `steamdeck` when unavailable
pub fn default_hostname() -> String {
    sysinfo::System::host_name()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_HOSTNAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.mqtt_host, "");
        assert_eq!(settings.mqtt_port, 1883);
        assert_eq!(settings.publish_interval, 30);
        assert!(!settings.hostname.is_empty());
        for category in SensorCategory::ALL {
            assert!(settings.enabled_sensors.is_enabled(category));
        }
    }

    #[test]
    fn test_partial_json_merges_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{"mqtt_host": "broker.lan", "enabled_sensors": {"game": false}}"#,
        )
        .unwrap();

        assert_eq!(settings.mqtt_host, "broker.lan");
        assert_eq!(settings.mqtt_port, 1883);
        assert_eq!(settings.publish_interval, 30);
        assert!(!settings.enabled_sensors.game);
        assert!(settings.enabled_sensors.battery);
        assert!(settings.enabled_sensors.download);
    }

    #[test]
    fn test_redacted_masks_password() {
        let mut settings = Settings::test_settings();
        assert_eq!(settings.redacted().mqtt_password, "");

        settings.mqtt_password = "hunter2".to_string();
        assert_eq!(settings.redacted().mqtt_password, PASSWORD_MASK);
        assert_eq!(settings.mqtt_password, "hunter2");
    }

    #[test]
    fn test_restore_masked_password() {
        let mut previous = Settings::test_settings();
        previous.mqtt_password = "hunter2".to_string();

        let mut incoming = previous.redacted();
        incoming.restore_masked_password(&previous);
        assert_eq!(incoming.mqtt_password, "hunter2");

        let mut changed = previous.redacted();
        changed.mqtt_password = "newpass".to_string();
        changed.restore_masked_password(&previous);
        assert_eq!(changed.mqtt_password, "newpass");
    }

    #[test]
    fn test_credentials_require_both_parts() {
        let mut settings = Settings::test_settings();
        assert!(settings.connection_settings().credentials().is_none());

        settings.mqtt_username = "deck".to_string();
        assert!(settings.connection_settings().credentials().is_none());

        settings.mqtt_password = "secret".to_string();
        assert_eq!(
            settings.connection_settings().credentials(),
            Some(("deck", "secret"))
        );
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut settings = Settings::test_settings();
        settings.publish_interval = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_has_broker_ignores_whitespace() {
        let mut settings = Settings::test_settings();
        assert!(settings.has_broker());
        settings.mqtt_host = "   ".to_string();
        assert!(!settings.has_broker());
    }

    #[test]
    fn test_enabled_sensors_set() {
        let mut sensors = EnabledSensors::default();
        sensors.set(SensorCategory::Disk, false);
        assert!(!sensors.is_enabled(SensorCategory::Disk));
        assert!(sensors.is_enabled(SensorCategory::Network));
    }
}
