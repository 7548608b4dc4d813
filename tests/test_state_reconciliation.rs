//! Event-driven game and download state tests
//!
//! Host events go in as raw JSON through the bridge; assertions are on what
//! reaches the transport.

mod test_helpers;

use serde_json::json;
use std::time::Duration;
use steamdeck_mqtt::reconciler::DOWNLOAD_CLEAR_DELAY;
use test_helpers::{connected_bridge, test_settings, DOWNLOAD_TOPIC, GAME_TOPIC};

#[tokio::test]
async fn test_game_session_publishes_transient_state() {
    let bridge = connected_bridge(test_settings()).await;

    bridge
        .ingest_event(&json!({"type": "game_started", "app_id": 1091500, "timestamp": 1700000000000i64}))
        .await
        .unwrap();
    bridge
        .ingest_event(&json!({"type": "game_stopped", "app_id": 1091500}))
        .await
        .unwrap();

    let messages = bridge.transport().messages_on(GAME_TOPIC).await;
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| !m.retain));
    assert_eq!(
        messages[0].json(),
        json!({"game_name": null, "app_id": 1091500, "is_running": true})
    );
    assert_eq!(
        messages[1].json(),
        json!({"game_name": null, "app_id": null, "is_running": false})
    );
}

#[tokio::test(start_paused = true)]
async fn test_download_completion_grace_period() {
    let bridge = connected_bridge(test_settings()).await;

    for event in [
        json!({"type": "download_started", "app_id": 620}),
        json!({"type": "download_progress", "progress": 25.0, "rate": 40.0}),
        json!({"type": "download_progress", "progress": 75.0, "rate": 38.5}),
        json!({"type": "download_completed", "app_id": 620}),
    ] {
        bridge.ingest_event(&event).await.unwrap();
    }

    let messages = bridge.transport().messages_on(DOWNLOAD_TOPIC).await;
    assert_eq!(messages.len(), 4);
    let last = messages[3].json();
    assert_eq!(last["downloading"], json!(false));
    assert_eq!(last["download_progress"], json!(100.0));
    assert_eq!(last["download_rate_mbps"], json!(0.0));

    let held = bridge.get_telemetry().await;
    assert_eq!(held.download.download_progress, Some(100.0));

    tokio::time::sleep(DOWNLOAD_CLEAR_DELAY + Duration::from_millis(10)).await;

    let cleared = bridge.get_telemetry().await;
    assert_eq!(cleared.download.download_progress, None);
    assert_eq!(cleared.download.download_rate_mbps, None);
    assert_eq!(bridge.transport().messages_on(DOWNLOAD_TOPIC).await.len(), 4);
}

#[tokio::test]
async fn test_shutdown_event_emits_one_publish_per_record() {
    let bridge = connected_bridge(test_settings()).await;
    bridge
        .ingest_event(&json!({"type": "game_started", "app_id": 1}))
        .await
        .unwrap();
    bridge
        .ingest_event(&json!({"type": "download_started", "app_id": 2}))
        .await
        .unwrap();
    bridge.transport().clear_history().await;

    bridge
        .ingest_event(&json!({"type": "system_shutting_down"}))
        .await
        .unwrap();

    let game = bridge.transport().messages_on(GAME_TOPIC).await;
    let download = bridge.transport().messages_on(DOWNLOAD_TOPIC).await;
    assert_eq!(game.len(), 1);
    assert_eq!(download.len(), 1);
    assert_eq!(game[0].json()["is_running"], json!(false));
    assert_eq!(download[0].json()["downloading"], json!(false));
    assert_eq!(bridge.transport().get_published_messages().await.len(), 2);
}

#[tokio::test]
async fn test_disabled_game_category_is_fully_silent() {
    let mut settings = test_settings();
    settings.enabled_sensors.game = false;
    let bridge = test_helpers::test_bridge(settings);
    bridge.connect().await.unwrap();

    let messages = bridge.transport().get_published_messages().await;
    assert!(!messages.iter().any(|m| m.topic.contains("game")));

    bridge
        .ingest_event(&json!({"type": "game_started", "app_id": 3}))
        .await
        .unwrap();
    bridge
        .ingest_event(&json!({"type": "download_started", "app_id": 3}))
        .await
        .unwrap();

    assert!(bridge.transport().messages_on(GAME_TOPIC).await.is_empty());
    assert_eq!(bridge.transport().messages_on(DOWNLOAD_TOPIC).await.len(), 1);
}

#[tokio::test]
async fn test_unknown_and_malformed_events_are_dropped() {
    let bridge = connected_bridge(test_settings()).await;

    assert!(bridge
        .ingest_event(&json!({"type": "achievement_unlocked"}))
        .await
        .is_err());
    assert!(bridge
        .ingest_event(&json!({"type": "game_started", "app_id": "not a number"}))
        .await
        .is_err());
    assert!(bridge.ingest_event(&json!({"app_id": 5})).await.is_err());

    assert!(bridge.transport().get_published_messages().await.is_empty());
    assert!(!bridge.get_telemetry().await.game.is_running);
}

#[tokio::test]
async fn test_events_while_disconnected_only_update_state() {
    let bridge = test_helpers::test_bridge(test_settings());

    bridge
        .ingest_event(&json!({"type": "game_started", "app_id": 400}))
        .await
        .unwrap();

    assert!(bridge.transport().get_published_messages().await.is_empty());
    let snapshot = bridge.get_telemetry().await;
    assert!(snapshot.game.is_running);
    assert_eq!(snapshot.game.app_id, Some(400));
}
