//! Impure I/O operations for the MQTT client
//!
//! Owns the `rumqttc` client and event loop task for one session at a time,
//! bridges the asynchronous ConnAck into an awaited `connect()` and keeps the
//! presence topic in step with the session.

use super::connection::{
    configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig, SessionConfig,
};
use super::message_handler::{EventRoute, MessageHandler};
use super::session_monitor::{RetryDecision, SessionEvent, SessionMonitor};
use crate::config::ConnectionSettings;
use crate::protocol::{PAYLOAD_OFFLINE, PAYLOAD_ONLINE};
use crate::transport::Transport;
use async_trait::async_trait;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Polls of the connection state while waiting for the ConnAck
pub const CONNECT_POLL_ATTEMPTS: u32 = 10;

/// Interval between ConnAck polls
pub const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Longest a publish may wait for room in the request channel
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

/// Time given to the `offline` publish to reach the socket before disconnecting
pub const OFFLINE_FLUSH_DELAY: Duration = Duration::from_millis(100);

/// Time given to the event loop task to send DISCONNECT and stop
const EVENT_LOOP_GRACE: Duration = Duration::from_millis(500);

/// Request channel capacity between `AsyncClient` and `EventLoop`
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// One live connection: client handle plus its event loop task
struct Session {
    client: AsyncClient,
    event_loop_handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Everything the event loop task needs, moved into the task
struct EventLoopContext {
    client: AsyncClient,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    generation: Arc<AtomicU64>,
    status_topic: Option<String>,
    reconnect_config: ReconnectConfig,
}

/// MQTT transport client for the telemetry bridge
pub struct MqttClient {
    config: RwLock<Option<SessionConfig>>,
    session: Mutex<Option<Session>>,
    lifecycle: Mutex<()>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    generation: Arc<AtomicU64>,
    reconnect_config: ReconnectConfig,
}

impl Default for MqttClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttClient {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        Self {
            config: RwLock::new(None),
            session: Mutex::new(None),
            lifecycle: Mutex::new(()),
            state_tx: Arc::new(state_tx),
            state_rx,
            generation: Arc::new(AtomicU64::new(0)),
            reconnect_config: ReconnectConfig::default(),
        }
    }

    /// Store connection parameters and derive identifiers. No I/O.
    pub fn configure(&self, settings: ConnectionSettings) {
        self.configure_session(SessionConfig::from_settings(settings));
    }

    fn configure_session(&self, config: SessionConfig) {
        debug!(
            host = %config.settings.host,
            port = config.settings.port,
            device_id = ?config.device_id,
            "MQTT client configured"
        );
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Some(config);
    }

    fn session_config(&self) -> Option<SessionConfig> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        SessionMonitor::can_publish(&self.state_rx.borrow())
    }

    pub fn device_id(&self) -> Option<String> {
        self.session_config().and_then(|config| config.device_id)
    }

    pub fn status_topic(&self) -> Option<String> {
        self.session_config().and_then(|config| config.status_topic)
    }

    pub fn session_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Apply a session event to the shared state and log the transition
    fn transition(state_tx: &watch::Sender<ConnectionState>, event: SessionEvent) {
        let next = SessionMonitor::next_state(event);
        let previous = state_tx.send_replace(next.clone());
        if previous != next {
            SessionMonitor::log_transition(&previous, &next);
        }
    }

    /// Poll the connection state until the handshake settles.
    ///
    /// Returns as soon as the state is `Connected` or `Disconnected`; gives up
    /// after `attempts` polls spaced `interval` apart.
    async fn wait_for_connection_confirmation(
        state_rx: &watch::Receiver<ConnectionState>,
        attempts: u32,
        interval: Duration,
    ) -> Result<(), MqttError> {
        for _ in 0..=attempts {
            let state = state_rx.borrow().clone();
            match state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected(reason) => {
                    return Err(MqttError::ConnectionFailedStr(reason));
                }
                _ => tokio::time::sleep(interval).await,
            }
        }
        Err(MqttError::ConnAckTimeout(interval * attempts))
    }

    /// Connect to the broker, replacing any existing session
    pub async fn connect(&self) -> Result<(), MqttError> {
        let _lifecycle = self.lifecycle.lock().await;
        self.close_session().await;

        let config = self.session_config().ok_or(MqttError::NotConfigured)?;
        let mqtt_options = configure_mqtt_options(&config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.state_tx.send_replace(ConnectionState::Connecting);

        info!(
            host = %config.settings.host,
            port = config.settings.port,
            status_topic = ?config.status_topic,
            "Connecting to MQTT broker"
        );

        let context = EventLoopContext {
            client: client.clone(),
            state_tx: self.state_tx.clone(),
            generation: self.generation.clone(),
            status_topic: config.status_topic.clone(),
            reconnect_config: self.reconnect_config.clone(),
        };
        let span = crate::mqtt_span!(host = %config.settings.host, port = config.settings.port);
        let event_loop_handle =
            tokio::spawn(Self::run_event_loop(context, event_loop, shutdown_rx).instrument(span));

        *self.session.lock().await = Some(Session {
            client,
            event_loop_handle,
            shutdown_tx,
        });

        match Self::wait_for_connection_confirmation(
            &self.state_rx,
            CONNECT_POLL_ATTEMPTS,
            CONNECT_POLL_INTERVAL,
        )
        .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "MQTT connection not confirmed, tearing down session");
                if let Some(session) = self.session.lock().await.take() {
                    let _ = session.shutdown_tx.send(true);
                    session.event_loop_handle.abort();
                }
                self.state_tx
                    .send_replace(ConnectionState::Disconnected(e.to_string()));
                Err(e)
            }
        }
    }

    /// Drive the `rumqttc` event loop for one session.
    ///
    /// A failed initial handshake ends the task. Once a session has been
    /// established, transport errors are retried with backoff and every
    /// successful ConnAck republishes `online` and bumps the generation.
    async fn run_event_loop(
        context: EventLoopContext,
        mut event_loop: EventLoop,
        shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut reconnect_attempts = 0u32;
        let mut established = false;

        loop {
            let lost = match event_loop.poll().await {
                Ok(event) => match MessageHandler::route_mqtt_event(&event) {
                    EventRoute::ConnectionAcknowledged => {
                        Self::announce_online(&context.client, context.status_topic.as_deref());
                        Self::transition(&context.state_tx, SessionEvent::Acknowledged);
                        let generation = context.generation.fetch_add(1, Ordering::SeqCst) + 1;
                        debug!(generation, "MQTT session generation advanced");
                        reconnect_attempts = 0;
                        established = true;
                        continue;
                    }
                    EventRoute::ConnectionRefused(reason) => SessionEvent::Refused(reason),
                    EventRoute::Disconnected => {
                        Self::transition(&context.state_tx, SessionEvent::BrokerClosed);
                        continue;
                    }
                    EventRoute::DisconnectSent => {
                        debug!("DISCONNECT sent, stopping MQTT event loop");
                        break;
                    }
                    EventRoute::InfrastructureEvent(event_str) => {
                        debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                        continue;
                    }
                    EventRoute::OutgoingEvent => continue,
                },
                Err(e) => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    SessionEvent::LinkLost(e.to_string())
                }
            };

            Self::transition(&context.state_tx, lost);
            let shutdown_requested = *shutdown_rx.borrow();
            match SessionMonitor::after_link_loss(
                reconnect_attempts,
                established,
                shutdown_requested,
                &context.reconnect_config,
            ) {
                RetryDecision::Retry { attempt, delay } => {
                    reconnect_attempts = attempt;
                    Self::transition(&context.state_tx, SessionEvent::Retrying(attempt));
                    if !Self::interruptible_sleep(shutdown_rx.clone(), delay).await {
                        break;
                    }
                }
                RetryDecision::Stop(reason) => {
                    debug!(?reason, "MQTT event loop not retrying");
                    break;
                }
            }
        }
        debug!("MQTT event loop stopped");
    }

    /// Queue the retained `online` presence message from inside the event loop
    fn announce_online(client: &AsyncClient, status_topic: Option<&str>) {
        let Some(topic) = status_topic else {
            return;
        };
        match client.try_publish(topic, QoS::AtLeastOnce, true, PAYLOAD_ONLINE) {
            Ok(()) => info!(topic = %topic, "Published online status"),
            Err(e) => error!(topic = %topic, error = %e, "Failed to publish online status"),
        }
    }

    /// Sleep unless shutdown is signalled first; true when the sleep completed
    async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay: Duration) -> bool {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                !*shutdown_rx.borrow()
            }
            _ = tokio::time::sleep(delay) => {
                true
            }
        }
    }

    /// Publish `offline` when connected, then close the session
    pub async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.close_session().await;
    }

    async fn close_session(&self) {
        let Some(session) = self.session.lock().await.take() else {
            if self.is_connected() {
                Self::transition(&self.state_tx, SessionEvent::LocalClose);
            }
            return;
        };

        let was_connected = self.is_connected();
        if was_connected {
            if let Some(topic) = self.status_topic() {
                let offline = session.client.publish(
                    topic.as_str(),
                    QoS::AtLeastOnce,
                    true,
                    PAYLOAD_OFFLINE,
                );
                match tokio::time::timeout(PUBLISH_TIMEOUT, offline).await {
                    Ok(Ok(())) => {
                        info!(topic = %topic, "Published offline status");
                        tokio::time::sleep(OFFLINE_FLUSH_DELAY).await;
                    }
                    Ok(Err(e)) => {
                        warn!(topic = %topic, error = %e, "Failed to publish offline status")
                    }
                    Err(_) => warn!(topic = %topic, "Offline status not queued in time"),
                }
            }
        }

        let _ = session.shutdown_tx.send(true);
        let mut handle = session.event_loop_handle;
        if was_connected {
            if let Err(e) = session.client.disconnect().await {
                debug!(error = %e, "DISCONNECT request not queued");
            }
            match tokio::time::timeout(EVENT_LOOP_GRACE, &mut handle).await {
                Ok(Ok(())) => debug!("Event loop task shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => warn!("Event loop task ended with error: {}", e),
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!("Event loop task didn't stop in time, aborting");
                    handle.abort();
                }
            }
        } else {
            handle.abort();
        }

        if !matches!(
            self.connection_state(),
            ConnectionState::Idle | ConnectionState::Disconnected(_)
        ) || was_connected
        {
            Self::transition(&self.state_tx, SessionEvent::LocalClose);
        }
        info!("MQTT client disconnected");
    }

    /// Check connection state before operations
    fn check_connection_state(&self) -> Result<(), MqttError> {
        let current_state = self.connection_state();
        if !SessionMonitor::can_publish(&current_state) {
            return Err(MqttError::NotConnected {
                state: current_state,
            });
        }
        Ok(())
    }

    /// Client handle of the live session, if connected
    async fn active_client(&self) -> Result<AsyncClient, MqttError> {
        self.check_connection_state()?;
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| session.client.clone())
            .ok_or_else(|| MqttError::NotConnected {
                state: self.connection_state(),
            })
    }

    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
        qos: QoS,
    ) -> Result<(), MqttError> {
        let client = self.active_client().await?;
        tokio::time::timeout(PUBLISH_TIMEOUT, client.publish(topic, qos, retain, payload))
            .await
            .map_err(|_| MqttError::PublishTimeout(PUBLISH_TIMEOUT))?
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;
        debug!(topic = %topic, retain, "Published message");
        Ok(())
    }

    pub async fn publish_heartbeat(&self) -> Result<(), MqttError> {
        let topic = self.status_topic().ok_or(MqttError::NoStatusTopic)?;
        self.publish(&topic, PAYLOAD_ONLINE.as_bytes().to_vec(), true, QoS::AtLeastOnce)
            .await
    }

    /// Connect and disconnect an independent client with the given settings
    pub async fn test_connection(settings: ConnectionSettings) -> Result<(), MqttError> {
        let checker = MqttClient::new();
        checker.configure_session(SessionConfig::connection_check(settings));
        let result = checker.connect().await;
        checker.disconnect().await;
        match &result {
            Ok(()) => info!("MQTT test connection succeeded"),
            Err(e) => warn!(error = %e, "MQTT test connection failed"),
        }
        result
    }
}

/// Implementation of Transport trait for MqttClient
#[async_trait]
impl Transport for MqttClient {
    fn configure(&self, settings: ConnectionSettings) {
        MqttClient::configure(self, settings)
    }

    async fn connect(&self) -> Result<(), MqttError> {
        MqttClient::connect(self).await
    }

    async fn disconnect(&self) {
        MqttClient::disconnect(self).await
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
        qos: QoS,
    ) -> Result<(), MqttError> {
        MqttClient::publish(self, topic, payload, retain, qos).await
    }

    async fn publish_heartbeat(&self) -> Result<(), MqttError> {
        MqttClient::publish_heartbeat(self).await
    }

    async fn test_connection(&self, settings: ConnectionSettings) -> Result<(), MqttError> {
        MqttClient::test_connection(settings).await
    }

    fn is_connected(&self) -> bool {
        MqttClient::is_connected(self)
    }

    fn connection_state(&self) -> ConnectionState {
        MqttClient::connection_state(self)
    }

    fn device_id(&self) -> Option<String> {
        MqttClient::device_id(self)
    }

    fn status_topic(&self) -> Option<String> {
        MqttClient::status_topic(self)
    }

    fn session_generation(&self) -> u64 {
        MqttClient::session_generation(self)
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        // Drop cannot publish `offline`; the last will covers that case.
        if let Some(session) = self.session.get_mut().take() {
            let _ = session.shutdown_tx.send(true);
            session.event_loop_handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_settings() -> ConnectionSettings {
        ConnectionSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            username: String::new(),
            password: None,
            hostname: "Test Deck".to_string(),
        }
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_success() {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = state_tx.send(ConnectionState::Connected);
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let result = MqttClient::wait_for_connection_confirmation(
            &state_rx,
            CONNECT_POLL_ATTEMPTS,
            Duration::from_millis(20),
        )
        .await;
        assert!(result.is_ok(), "Should successfully wait for connection");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_connection_confirmation_timeout() {
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let started = tokio::time::Instant::now();
        let result = MqttClient::wait_for_connection_confirmation(
            &state_rx,
            CONNECT_POLL_ATTEMPTS,
            CONNECT_POLL_INTERVAL,
        )
        .await;

        assert!(matches!(result, Err(MqttError::ConnAckTimeout(_))));
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(started.elapsed() < Duration::from_millis(1200));
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_disconnected() {
        let (_state_tx, state_rx) =
            watch::channel(ConnectionState::Disconnected("refused".to_string()));

        let result = MqttClient::wait_for_connection_confirmation(
            &state_rx,
            CONNECT_POLL_ATTEMPTS,
            CONNECT_POLL_INTERVAL,
        )
        .await;
        assert!(matches!(result, Err(MqttError::ConnectionFailedStr(reason)) if reason == "refused"));
    }

    #[tokio::test]
    async fn test_interruptible_sleep_completes() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        assert!(MqttClient::interruptible_sleep(shutdown_rx, Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn test_interruptible_sleep_interrupted() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = shutdown_tx.send(true);
        });
        assert!(!MqttClient::interruptible_sleep(shutdown_rx, Duration::from_secs(10)).await);
    }

    #[test]
    fn test_configure_derives_identifiers() {
        let client = MqttClient::new();
        assert!(client.device_id().is_none());
        assert!(client.status_topic().is_none());

        client.configure(unreachable_settings());
        assert_eq!(client.device_id().as_deref(), Some("test_deck"));
        assert_eq!(
            client.status_topic().as_deref(),
            Some("steamdeck/test_deck/status")
        );
        assert_eq!(client.connection_state(), ConnectionState::Idle);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_connect_without_configuration() {
        let client = MqttClient::new();
        let result = client.connect().await;
        assert!(matches!(result, Err(MqttError::NotConfigured)));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_connect_with_empty_host() {
        let client = MqttClient::new();
        let mut settings = unreachable_settings();
        settings.host = String::new();
        client.configure(settings);

        let result = client.connect().await;
        assert!(matches!(result, Err(MqttError::InvalidBroker(_))));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_broker_fails() {
        let client = MqttClient::new();
        client.configure(unreachable_settings());

        let result = client.connect().await;
        assert!(result.is_err());
        assert!(!client.is_connected());
        assert!(matches!(
            client.connection_state(),
            ConnectionState::Disconnected(_)
        ));
        assert_eq!(client.session_generation(), 0);
    }

    #[tokio::test]
    async fn test_publish_operations_fail_without_connection() {
        let client = MqttClient::new();
        client.configure(unreachable_settings());

        let result = client
            .publish("steamdeck/test_deck/telemetry/battery", b"{}".to_vec(), true, QoS::AtMostOnce)
            .await;
        assert!(matches!(
            result,
            Err(MqttError::NotConnected {
                state: ConnectionState::Idle
            })
        ));

        let result = client.publish_heartbeat().await;
        assert!(matches!(result, Err(MqttError::NotConnected { .. })));
    }

    #[tokio::test]
    async fn test_heartbeat_requires_status_topic() {
        let client = MqttClient::new();
        let mut settings = unreachable_settings();
        settings.hostname = String::new();
        client.configure(settings);

        let result = client.publish_heartbeat().await;
        assert!(matches!(result, Err(MqttError::NoStatusTopic)));
    }

    #[tokio::test]
    async fn test_disconnect_without_connection() {
        let client = MqttClient::new();
        client.disconnect().await;
        client.disconnect().await;
        assert!(!client.is_connected());

        client.configure(unreachable_settings());
        client.disconnect().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_connection_check_failure_leaves_primary_untouched() {
        let client = MqttClient::new();
        client.configure(unreachable_settings());

        let result = MqttClient::test_connection(unreachable_settings()).await;
        assert!(result.is_err());
        assert_eq!(client.connection_state(), ConnectionState::Idle);
        assert_eq!(client.session_generation(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_gives_up_when_event_loop_stalls() {
        let client = MqttClient::new();
        client.configure(unreachable_settings());

        // Nobody polls this event loop, so the request channel never drains
        let options = rumqttc::v5::MqttOptions::new("stalled", "127.0.0.1", 1);
        let (async_client, _event_loop) = AsyncClient::new(options, 1);
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        *client.session.lock().await = Some(Session {
            client: async_client,
            event_loop_handle: tokio::spawn(async {}),
            shutdown_tx,
        });
        client.state_tx.send_replace(ConnectionState::Connected);

        let topic = "steamdeck/test_deck/telemetry/game";
        client
            .publish(topic, b"{}".to_vec(), false, QoS::AtMostOnce)
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        let result = client
            .publish(topic, b"{}".to_vec(), false, QoS::AtMostOnce)
            .await;

        assert!(matches!(result, Err(MqttError::PublishTimeout(_))));
        assert!(started.elapsed() >= PUBLISH_TIMEOUT);
        assert!(started.elapsed() < PUBLISH_TIMEOUT + CONNECT_POLL_INTERVAL);
    }
}
