//! The production bridge with no reachable broker
//!
//! Nothing listens on 127.0.0.1:1, so every connection attempt is refused
//! quickly and the bridge has to stay usable.

use serde_json::json;
use steamdeck_mqtt::config::Settings;
use steamdeck_mqtt::transport::ConnectionState;
use steamdeck_mqtt::{BridgeError, DeckBridge};

fn unreachable_settings() -> Settings {
    Settings {
        mqtt_host: "127.0.0.1".to_string(),
        mqtt_port: 1,
        hostname: "Offline Deck".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_connect_failure_leaves_bridge_disconnected() {
    let bridge = DeckBridge::system(unreachable_settings(), None);

    assert!(bridge.connect().await.is_err());

    let status = bridge.connection_status();
    assert!(!status.connected);
    assert!(matches!(
        bridge.transport().connection_state(),
        ConnectionState::Disconnected(_) | ConnectionState::Idle
    ));
    assert!(matches!(
        bridge.publish_now().await,
        Err(BridgeError::NotConnected)
    ));
}

#[tokio::test]
async fn test_events_and_snapshot_work_offline() {
    let bridge = DeckBridge::system(unreachable_settings(), None);

    bridge
        .ingest_event(&json!({"type": "download_started", "app_id": 730}))
        .await
        .unwrap();

    let snapshot = bridge.get_telemetry().await;
    assert!(snapshot.download.downloading);
    assert_eq!(snapshot.download.download_progress, Some(0.0));
}

#[tokio::test]
async fn test_disconnect_without_session_is_idempotent() {
    let bridge = DeckBridge::system(unreachable_settings(), None);
    bridge.disconnect().await;
    bridge.disconnect().await;
    assert!(!bridge.connection_status().connected);
}

#[tokio::test]
async fn test_connection_check_against_unreachable_broker() {
    let bridge = DeckBridge::system(Settings::default(), None);

    let result = bridge.test_connection(Some(unreachable_settings())).await;

    assert!(result.is_err());
    assert!(!bridge.connection_status().connected);
    assert_eq!(bridge.transport().session_generation(), 0);
}
