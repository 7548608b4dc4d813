//! Pure connection state management for the MQTT client
//!
//! Connection state, reconnection backoff, error types and the translation
//! of bridge settings into `rumqttc` options. Nothing here performs I/O.

use crate::config::ConnectionSettings;
use crate::protocol::{sanitize_identifier, TopicBuilder, PAYLOAD_OFFLINE, STATE_TOPIC_PREFIX};
use rumqttc::v5::mqttbytes::v5::LastWill;
use rumqttc::v5::{mqttbytes::QoS, MqttOptions};
use std::time::Duration;
use thiserror::Error;

/// Keep-alive interval negotiated with the broker
pub const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Connection state for the MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// No connection has been attempted yet
    Idle,
    /// Handshake in progress
    Connecting,
    /// Broker acknowledged the handshake
    Connected,
    /// Disconnected with reason
    Disconnected(String),
    /// Attempting to reconnect (attempt count)
    Reconnecting(u32),
}

impl ConnectionState {
    /// Short label for status reporting
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected(_) => "disconnected",
            ConnectionState::Reconnecting(_) => "reconnecting",
        }
    }
}

/// Reconnection configuration for dropped sessions
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Backoff pattern in milliseconds
    pub backoff_pattern: Vec<u64>,
    /// Delay once the pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: vec![25, 50, 100, 250],
            sustained_delay: 250,
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay for the given 1-based attempt
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker address: {0}")]
    InvalidBroker(String),
    #[error("MQTT client is not configured")]
    NotConfigured,
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("No status topic configured")]
    NoStatusTopic,
    #[error("Publish request not accepted within {0:?}")]
    PublishTimeout(Duration),
    #[error("No ConnAck received within {0:?}")]
    ConnAckTimeout(Duration),
    #[error("Serialization error")]
    SerializationError(#[source] serde_json::Error),
    #[error("Connection failed: {0}")]
    ConnectionFailedStr(String),
}

/// Connection parameters plus the identifiers derived from the hostname
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub settings: ConnectionSettings,
    /// Sanitized hostname; `None` when the hostname is empty
    pub device_id: Option<String>,
    /// `steamdeck/{device}/status`; `None` when the hostname is empty
    pub status_topic: Option<String>,
}

impl SessionConfig {
    /// Derive identifiers from the settings hostname
    pub fn from_settings(settings: ConnectionSettings) -> Self {
        let device_id = Some(sanitize_identifier(settings.hostname.trim()))
            .filter(|device_id| !device_id.is_empty());
        let status_topic = device_id.as_deref().map(TopicBuilder::build_status_topic);
        Self {
            settings,
            device_id,
            status_topic,
        }
    }

    /// Configuration for a throwaway connectivity check.
    ///
    /// Carries no status topic, so the check registers no last will and
    /// never publishes presence for the device.
    pub fn connection_check(settings: ConnectionSettings) -> Self {
        let mut config = Self::from_settings(settings);
        config.status_topic = None;
        config
    }
}

/// Client id unique per connection attempt: `steamdeck-{device}-{suffix}`
pub fn generate_client_id(device_id: Option<&str>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{STATE_TOPIC_PREFIX}-{}-{}",
        device_id.unwrap_or("device"),
        &suffix[..8]
    )
}

/// Build `rumqttc` options from a session configuration.
///
/// The last will (`offline`, QoS 1, retained) is registered here so it is
/// part of the CONNECT packet.
pub fn configure_mqtt_options(config: &SessionConfig) -> Result<MqttOptions, MqttError> {
    let host = config.settings.host.trim();
    if host.is_empty() {
        return Err(MqttError::InvalidBroker("broker host is empty".to_string()));
    }
    if host.contains(char::is_whitespace) || host.contains('/') {
        return Err(MqttError::InvalidBroker(host.to_string()));
    }
    if config.settings.port == 0 {
        return Err(MqttError::InvalidBroker(format!("{host}:0")));
    }

    let client_id = generate_client_id(config.device_id.as_deref());
    let mut mqtt_options = MqttOptions::new(client_id, host, config.settings.port);

    if let Some((username, password)) = config.settings.credentials() {
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_keep_alive(KEEP_ALIVE);

    if let Some(status_topic) = &config.status_topic {
        let lwt = LastWill::new(status_topic, PAYLOAD_OFFLINE, QoS::AtLeastOnce, true, None);
        mqtt_options.set_last_will(lwt);
    }

    Ok(mqtt_options)
}
