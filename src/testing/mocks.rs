//! Mock implementations for testing
//!
//! Provides a mock [`Transport`] that records every publish and a mock
//! [`TelemetrySource`] with settable readings, so the bridge can be tested
//! without a broker or real hardware.

use crate::config::ConnectionSettings;
use crate::protocol::{BatteryInfo, DiskInfo, NetworkInfo, PAYLOAD_OFFLINE, PAYLOAD_ONLINE};
use crate::telemetry::{TelemetryError, TelemetrySource};
use crate::transport::mqtt::SessionConfig;
use crate::transport::{ConnectionState, MqttError, QoS, Transport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

/// One message handed to the mock transport
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
    pub qos: QoS,
}

impl PublishedMessage {
    /// Payload as UTF-8 text
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or_default()
    }

    /// Payload parsed as JSON
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

/// Mock transport for testing
#[derive(Debug, Default)]
pub struct MockTransport {
    config: RwLock<Option<SessionConfig>>,
    connected: AtomicBool,
    generation: AtomicU64,
    pub published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    pub should_fail_connect: bool,
    pub test_connection_error: Option<String>,
    test_connection_calls: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `connect` is refused
    pub fn with_connect_failure() -> Self {
        Self {
            should_fail_connect: true,
            ..Default::default()
        }
    }

    /// `test_connection` reports the given error
    pub fn with_test_connection_error(message: &str) -> Self {
        Self {
            test_connection_error: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub async fn get_published_messages(&self) -> Vec<PublishedMessage> {
        self.published_messages.lock().await.clone()
    }

    /// Messages published on `topic`, oldest first
    pub async fn messages_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published_messages
            .lock()
            .await
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub async fn clear_history(&self) {
        self.published_messages.lock().await.clear();
    }

    pub fn test_connection_calls(&self) -> usize {
        self.test_connection_calls.load(Ordering::SeqCst)
    }

    /// Drop the session as a broker failure would, without publishing `offline`
    pub fn simulate_connection_loss(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Accept a new handshake as the event loop does after a dropped session
    pub async fn simulate_reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.record_presence(PAYLOAD_ONLINE).await;
    }

    fn session_config(&self) -> Option<SessionConfig> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn record(&self, topic: &str, payload: Vec<u8>, retain: bool, qos: QoS) {
        self.published_messages.lock().await.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            retain,
            qos,
        });
    }

    async fn record_presence(&self, payload: &str) {
        if let Some(topic) = self.status_topic() {
            self.record(&topic, payload.as_bytes().to_vec(), true, QoS::AtLeastOnce)
                .await;
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn configure(&self, settings: ConnectionSettings) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) =
            Some(SessionConfig::from_settings(settings));
    }

    async fn connect(&self) -> Result<(), MqttError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.record_presence(PAYLOAD_OFFLINE).await;
        }
        if self.session_config().is_none() {
            return Err(MqttError::NotConfigured);
        }
        if self.should_fail_connect {
            return Err(MqttError::ConnectionFailedStr(
                "Mock connection failure".to_string(),
            ));
        }
        self.simulate_reconnect().await;
        Ok(())
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.record_presence(PAYLOAD_OFFLINE).await;
        }
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
        qos: QoS,
    ) -> Result<(), MqttError> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected {
                state: self.connection_state(),
            });
        }
        self.record(topic, payload, retain, qos).await;
        Ok(())
    }

    async fn publish_heartbeat(&self) -> Result<(), MqttError> {
        let topic = self.status_topic().ok_or(MqttError::NoStatusTopic)?;
        self.publish(&topic, PAYLOAD_ONLINE.as_bytes().to_vec(), true, QoS::AtLeastOnce)
            .await
    }

    async fn test_connection(&self, _settings: ConnectionSettings) -> Result<(), MqttError> {
        self.test_connection_calls.fetch_add(1, Ordering::SeqCst);
        match &self.test_connection_error {
            Some(message) => Err(MqttError::ConnectionFailedStr(message.clone())),
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connection_state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else if self.generation.load(Ordering::SeqCst) > 0 {
            ConnectionState::Disconnected("Mock disconnection".to_string())
        } else {
            ConnectionState::Idle
        }
    }

    fn device_id(&self) -> Option<String> {
        self.session_config().and_then(|config| config.device_id)
    }

    fn status_topic(&self) -> Option<String> {
        self.session_config().and_then(|config| config.status_topic)
    }

    fn session_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// Telemetry source returning fixed readings
#[derive(Debug, Default)]
pub struct MockTelemetrySource {
    pub battery: std::sync::Mutex<BatteryInfo>,
    pub disk: std::sync::Mutex<DiskInfo>,
    pub network: std::sync::Mutex<NetworkInfo>,
    pub fail_network: AtomicBool,
    calls: AtomicUsize,
}

impl MockTelemetrySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A plausible handheld on Wi-Fi with no SD card
    pub fn handheld() -> Self {
        let source = Self::default();
        source.set_battery(BatteryInfo {
            percent: Some(80),
            charging: false,
            time_remaining_min: Some(150),
        });
        source.set_disk(DiskInfo {
            internal_free_gb: Some(100.0),
            internal_total_gb: Some(512.0),
            internal_percent_used: Some(80.5),
            ..Default::default()
        });
        source.set_network(NetworkInfo {
            ip_wifi: Some("192.168.1.42".to_string()),
            ip_ethernet: None,
            ip_primary: Some("192.168.1.42".to_string()),
        });
        source
    }

    pub fn set_battery(&self, info: BatteryInfo) {
        *self.battery.lock().unwrap_or_else(PoisonError::into_inner) = info;
    }

    pub fn set_disk(&self, info: DiskInfo) {
        *self.disk.lock().unwrap_or_else(PoisonError::into_inner) = info;
    }

    pub fn set_network(&self, info: NetworkInfo) {
        *self.network.lock().unwrap_or_else(PoisonError::into_inner) = info;
    }

    /// Number of readings taken across all categories
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetrySource for MockTelemetrySource {
    async fn battery(&self) -> Result<BatteryInfo, TelemetryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .battery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn disk(&self) -> Result<DiskInfo, TelemetryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .disk
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn network(&self) -> Result<NetworkInfo, TelemetryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_network.load(Ordering::SeqCst) {
            return Err(TelemetryError::CommandFailed(
                "Mock network failure".to_string(),
            ));
        }
        Ok(self
            .network
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            host: "localhost".to_string(),
            port: 1883,
            username: String::new(),
            password: None,
            hostname: "Test Deck".to_string(),
        }
    }

    #[tokio::test]
    async fn test_connect_disconnect_presence_order() {
        let transport = MockTransport::new();
        transport.configure(settings());
        transport.connect().await.unwrap();
        transport.disconnect().await;
        transport.disconnect().await;

        let messages = transport.messages_on("steamdeck/test_deck/status").await;
        let payloads: Vec<&str> = messages.iter().map(|m| m.payload_str()).collect();
        assert_eq!(payloads, vec!["online", "offline"]);
        assert!(messages.iter().all(|m| m.retain && m.qos == QoS::AtLeastOnce));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_unconfigured_connect_fails() {
        let transport = MockTransport::new();
        assert!(matches!(
            transport.connect().await,
            Err(MqttError::NotConfigured)
        ));
        assert_eq!(transport.connection_state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_publish_requires_connection() {
        let transport = MockTransport::new();
        transport.configure(settings());
        let result = transport
            .publish("a/b", b"x".to_vec(), false, QoS::AtMostOnce)
            .await;
        assert!(matches!(result, Err(MqttError::NotConnected { .. })));
        assert!(transport.get_published_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_generation_counts_handshakes() {
        let transport = MockTransport::new();
        transport.configure(settings());
        transport.connect().await.unwrap();
        transport.simulate_connection_loss();
        transport.simulate_reconnect().await;
        assert_eq!(transport.session_generation(), 2);
    }

    #[tokio::test]
    async fn test_mock_telemetry_failure_flag() {
        let source = MockTelemetrySource::handheld();
        source.fail_network.store(true, Ordering::SeqCst);
        assert!(source.network().await.is_err());
        assert_eq!(source.battery().await.unwrap().percent, Some(80));
        assert_eq!(source.calls(), 2);
    }
}
