//! The real MQTT client against an in-process broker
//!
//! Checks what actually goes over the wire: the last will in CONNECT, the
//! retained QoS 1 presence sequence and the re-announcement after the broker
//! drops an established session.


use fake_broker::{BrokerEvent, FakeBroker, Will};
use std::time::Duration;
use steamdeck_mqtt::config::ConnectionSettings;
use steamdeck_mqtt::transport::{ConnectionState, MqttError, QoS};
use steamdeck_mqtt::MqttClient;

const STATUS_TOPIC: &str = "steamdeck/session_deck/status";

fn settings_for(broker: &FakeBroker) -> ConnectionSettings {
    ConnectionSettings {
        host: "127.0.0.1".to_string(),
        port: broker.port(),
        username: String::new(),
        password: None,
        hostname: "Session Deck".to_string(),
    }
}

fn presence(payload: &str) -> (String, u8, bool) {
    (payload.to_string(), 1, true)
}

async fn wait_until<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_connect_registers_last_will_before_handshake() {
    let broker = FakeBroker::start().await;
    let client = MqttClient::new();
    client.configure(settings_for(&broker));

    client.connect().await.unwrap();

    let connects = broker.connects().await;
    assert_eq!(connects.len(), 1);
    let BrokerEvent::Connect { will, username, .. } = &connects[0] else {
        unreachable!()
    };
    assert_eq!(
        will.as_ref(),
        Some(&Will {
            topic: STATUS_TOPIC.to_string(),
            payload: b"offline".to_vec(),
            qos: 1,
            retain: true,
        })
    );
    assert_eq!(username, &None);

    client.disconnect().await;
}

#[tokio::test]
async fn test_presence_sequence_on_the_wire() {
    let broker = FakeBroker::start().await;
    let client = MqttClient::new();
    client.configure(settings_for(&broker));

    client.connect().await.unwrap();
    assert!(client.is_connected());
    assert_eq!(client.session_generation(), 1);
    broker
        .wait_for("online", |events| {
            events
                .iter()
                .any(|e| matches!(e, BrokerEvent::Publish { topic, .. } if topic == STATUS_TOPIC))
        })
        .await;

    client.publish_heartbeat().await.unwrap();
    client.disconnect().await;
    broker
        .wait_for("DISCONNECT", |events| events.contains(&BrokerEvent::Disconnect))
        .await;

    assert_eq!(
        broker.publishes_on(STATUS_TOPIC).await,
        vec![presence("online"), presence("online"), presence("offline")]
    );
    let events = broker.events().await;
    assert_eq!(events.last(), Some(&BrokerEvent::Disconnect));
    assert!(!client.is_connected());
    assert!(matches!(
        client.connection_state(),
        ConnectionState::Disconnected(_)
    ));
}

#[tokio::test]
async fn test_publish_after_disconnect_sends_nothing() {
    let broker = FakeBroker::start().await;
    let client = MqttClient::new();
    client.configure(settings_for(&broker));
    client.connect().await.unwrap();
    client.disconnect().await;
    client.disconnect().await;
    let before = broker.events().await.len();

    let result = client
        .publish(
            "steamdeck/session_deck/telemetry/battery",
            b"{}".to_vec(),
            true,
            QoS::AtMostOnce,
        )
        .await;

    assert!(matches!(result, Err(MqttError::NotConnected { .. })));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(broker.events().await.len(), before);
}

#[tokio::test]
async fn test_dropped_session_reconnects_and_reannounces_online() {
    let broker = FakeBroker::start().await;
    let client = MqttClient::new();
    client.configure(settings_for(&broker));
    client.connect().await.unwrap();
    broker
        .wait_for("first online", |events| {
            events
                .iter()
                .any(|e| matches!(e, BrokerEvent::Publish { topic, .. } if topic == STATUS_TOPIC))
        })
        .await;

    broker.drop_clients();

    broker
        .wait_for("second session", |events| {
            events
                .iter()
                .filter(|e| matches!(e, BrokerEvent::Connect { .. }))
                .count()
                == 2
        })
        .await;
    wait_until("generation 2", || {
        client.session_generation() == 2 && client.is_connected()
    })
    .await;
    broker
        .wait_for("second online", |events| {
            events
                .iter()
                .filter(|e| matches!(e, BrokerEvent::Publish { topic, .. } if topic == STATUS_TOPIC))
                .count()
                == 2
        })
        .await;

    assert_eq!(
        broker.publishes_on(STATUS_TOPIC).await,
        vec![presence("online"), presence("online")]
    );
    let connects = broker.connects().await;
    assert!(connects
        .iter()
        .all(|c| matches!(c, BrokerEvent::Connect { will: Some(w), .. } if w.topic == STATUS_TOPIC)));

    client.disconnect().await;
}

#[tokio::test]
async fn test_credentials_sent_only_when_complete() {
    let broker = FakeBroker::start().await;

    let client = MqttClient::new();
    let mut settings = settings_for(&broker);
    settings.username = "deck".to_string();
    settings.password = Some("hunter2".to_string());
    client.configure(settings.clone());
    client.connect().await.unwrap();
    client.disconnect().await;

    settings.password = None;
    client.configure(settings);
    client.connect().await.unwrap();
    client.disconnect().await;

    let usernames: Vec<_> = broker
        .connects()
        .await
        .into_iter()
        .map(|c| match c {
            BrokerEvent::Connect { username, .. } => username,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(usernames, vec![Some("deck".to_string()), None]);
}

#[tokio::test]
async fn test_connection_check_leaves_presence_alone() {
    let broker = FakeBroker::start().await;

    MqttClient::test_connection(settings_for(&broker))
        .await
        .unwrap();

    let connects = broker.connects().await;
    assert_eq!(connects.len(), 1);
    assert!(matches!(
        &connects[0],
        BrokerEvent::Connect { will: None, .. }
    ));
    assert!(broker.publishes_on(STATUS_TOPIC).await.is_empty());
}
