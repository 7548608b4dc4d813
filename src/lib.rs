//! Steam Deck telemetry bridge for Home Assistant
//!
//! Publishes battery, storage, network, game and download state from a
//! handheld to an MQTT broker, announces the sensors through Home Assistant
//! MQTT discovery and keeps an `online`/`offline` presence topic backed by a
//! last will.
//!
//! # Overview
//!
//! - [`transport`]: MQTT session with last will, presence and reconnect
//! - [`discovery`]: discovery descriptors for every enabled sensor category
//! - [`reconciler`]: event-driven game and download state
//! - [`bridge`]: host operations and the periodic publication cycle
//! - [`control`]: local HTTP API over the bridge operations
//!
//! # Quick Start
//!
//! ```rust
//! use steamdeck_mqtt::protocol::{sanitize_identifier, SensorCategory, TopicBuilder};
//!
//! let device_id = sanitize_identifier("Steam Deck");
//! assert_eq!(device_id, "steam_deck");
//! assert_eq!(
//!     TopicBuilder::build_telemetry_topic(&device_id, SensorCategory::Battery),
//!     "steamdeck/steam_deck/telemetry/battery"
//! );
//! ```

pub mod bridge;
pub mod config;
pub mod control;
pub mod discovery;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod reconciler;
pub mod telemetry;
pub mod testing;
pub mod transport;

pub use bridge::{Bridge, DeckBridge};
pub use config::{EnabledSensors, Settings};
pub use error::{BridgeError, BridgeResult};
pub use protocol::*;
pub use transport::mqtt::MqttClient;
