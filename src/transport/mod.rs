//! Transport layer for the telemetry bridge
//!
//! [`Transport`] is the seam between the bridge logic and the broker: the
//! MQTT client implements it for production and
//! [`crate::testing::mocks::MockTransport`] records traffic for tests.

use crate::config::ConnectionSettings;
use crate::protocol::{SensorCategory, TopicBuilder};
use serde::Serialize;

pub mod mqtt;

pub use mqtt::{ConnectionState, MqttError, QoS};

/// Connection lifecycle and publishing for one device session
///
/// All methods take `&self`; implementations keep their session behind
/// interior mutability so one instance can be shared by the publication
/// cycle, the event reconciler and the control API.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Store connection parameters and derive the device identifiers. No I/O.
    fn configure(&self, settings: ConnectionSettings);

    /// Establish a session, replacing any existing one.
    ///
    /// Succeeds only once the broker has acknowledged the handshake.
    async fn connect(&self) -> Result<(), MqttError>;

    /// Publish `offline` if connected, then close the session.
    ///
    /// Safe to call when never connected and idempotent.
    async fn disconnect(&self);

    /// Publish a payload; fails without wire traffic when not connected
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
        qos: QoS,
    ) -> Result<(), MqttError>;

    /// Republish `online` on the status topic
    async fn publish_heartbeat(&self) -> Result<(), MqttError>;

    /// Connect and disconnect a separate short-lived client.
    ///
    /// Must not touch this transport's session or presence.
    async fn test_connection(&self, settings: ConnectionSettings) -> Result<(), MqttError>;

    /// Check if the broker has acknowledged the current session
    fn is_connected(&self) -> bool;

    /// Get current connection state
    fn connection_state(&self) -> ConnectionState;

    /// Sanitized hostname, once configured with a non-empty hostname
    fn device_id(&self) -> Option<String>;

    /// Presence topic, once configured with a non-empty hostname
    fn status_topic(&self) -> Option<String>;

    /// Number of accepted handshakes so far
    fn session_generation(&self) -> u64;
}

/// Type alias for the production transport
pub type MqttTransport = mqtt::MqttClient;

/// Serialize a payload and publish it on the category's telemetry topic.
///
/// Hardware categories are retained, game and download are not. Telemetry is
/// published at QoS 0.
pub async fn publish_state<T, P>(
    transport: &T,
    category: SensorCategory,
    payload: &P,
) -> Result<(), MqttError>
where
    T: Transport + ?Sized,
    P: Serialize + Sync,
{
    let device_id = transport.device_id().ok_or(MqttError::NotConfigured)?;
    let topic = TopicBuilder::build_telemetry_topic(&device_id, category);
    let body = serde_json::to_vec(payload).map_err(MqttError::SerializationError)?;
    transport
        .publish(&topic, body, category.is_retained(), QoS::AtMostOnce)
        .await
}
