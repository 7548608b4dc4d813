//! MQTT client for the telemetry bridge
//!
//! Pure functions are kept apart from I/O so the interesting decisions can be
//! tested without a broker.
//!
//! # Architecture
//!
//! - [`connection`] - Connection state, options and last-will registration
//! - [`message_handler`] - Routing of `rumqttc` events
//! - [`session_monitor`] - State transitions and retry decisions
//! - [`client`] - Session lifecycle, event loop task and publishing
//!
//! # Usage
//!
//! ```rust,no_run
//! use steamdeck_mqtt::config::Settings;
//! use steamdeck_mqtt::transport::mqtt::MqttClient;
//!
//! # tokio_test::block_on(async {
//! let settings = Settings {
//!     mqtt_host: "broker.lan".to_string(),
//!     ..Default::default()
//! };
//!
//! let client = MqttClient::new();
//! client.configure(settings.connection_settings());
//! client.connect().await?;
//! client.disconnect().await;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;
pub mod session_monitor;

pub use client::MqttClient;
pub use connection::{ConnectionState, MqttError, ReconnectConfig, SessionConfig};
pub use message_handler::{EventRoute, MessageHandler};
pub use rumqttc::v5::mqttbytes::QoS;
pub use session_monitor::{RetryDecision, SessionEvent, SessionMonitor, StopReason};
