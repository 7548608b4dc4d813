//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use steamdeck_mqtt::bridge::Bridge;
use steamdeck_mqtt::config::Settings;
use steamdeck_mqtt::testing::mocks::{MockTelemetrySource, MockTransport};

pub type TestBridge = Bridge<MockTransport, MockTelemetrySource>;

pub const STATUS_TOPIC: &str = "steamdeck/living_room_deck/status";
pub const GAME_TOPIC: &str = "steamdeck/living_room_deck/telemetry/game";
pub const DOWNLOAD_TOPIC: &str = "steamdeck/living_room_deck/telemetry/download";

/// Settings pointing at a local broker for a deck called "Living-Room Deck"
pub fn test_settings() -> Settings {
    Settings {
        mqtt_host: "localhost".to_string(),
        hostname: "Living-Room Deck".to_string(),
        ..Default::default()
    }
}

pub fn test_bridge(settings: Settings) -> Arc<TestBridge> {
    Arc::new(Bridge::new(
        settings,
        None,
        Arc::new(MockTransport::new()),
        Arc::new(MockTelemetrySource::handheld()),
    ))
}

/// Bridge that has connected and registered, with the history cleared
pub async fn connected_bridge(settings: Settings) -> Arc<TestBridge> {
    let bridge = test_bridge(settings);
    bridge.connect().await.unwrap();
    bridge.transport().clear_history().await;
    bridge
}
