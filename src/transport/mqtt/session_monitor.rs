//! Pure session bookkeeping for the MQTT client
//!
//! Maps broker and link events onto [`ConnectionState`] and decides whether a
//! lost link is worth another attempt. The event loop task in `client.rs`
//! feeds events in and acts on the answers; nothing here touches the network.

use super::connection::{ConnectionState, ReconnectConfig};
use std::time::Duration;
use tracing::{error, info, warn};

/// Something that happened to the current session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Broker accepted the handshake
    Acknowledged,
    /// Broker answered the handshake with a failure code
    Refused(String),
    /// Broker sent DISCONNECT
    BrokerClosed,
    /// Socket or protocol error while polling
    LinkLost(String),
    /// Waiting before the given retry
    Retrying(u32),
    /// We closed the session ourselves
    LocalClose,
}

/// Why the event loop should stop instead of retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown was signalled
    Shutdown,
    /// The first handshake of this session never succeeded
    InitialHandshake,
}

/// What to do after the link drops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { attempt: u32, delay: Duration },
    Stop(StopReason),
}

/// Stateless rules for one MQTT session
pub struct SessionMonitor;

impl SessionMonitor {
    /// State the session is in after `event`
    pub fn next_state(event: SessionEvent) -> ConnectionState {
        match event {
            SessionEvent::Acknowledged => ConnectionState::Connected,
            SessionEvent::Refused(reason) | SessionEvent::LinkLost(reason) => {
                ConnectionState::Disconnected(reason)
            }
            SessionEvent::BrokerClosed => {
                ConnectionState::Disconnected("Broker closed the session".to_string())
            }
            SessionEvent::Retrying(attempt) => ConnectionState::Reconnecting(attempt),
            SessionEvent::LocalClose => {
                ConnectionState::Disconnected("Disconnected by bridge".to_string())
            }
        }
    }

    /// Decide whether a dropped link gets another attempt.
    ///
    /// A session that was never acknowledged is not retried; the caller of
    /// `connect()` reports that failure instead. An established session is
    /// retried until it is resumed or shut down.
    pub fn after_link_loss(
        attempts_so_far: u32,
        established: bool,
        shutdown_requested: bool,
        config: &ReconnectConfig,
    ) -> RetryDecision {
        if shutdown_requested {
            return RetryDecision::Stop(StopReason::Shutdown);
        }
        if !established {
            return RetryDecision::Stop(StopReason::InitialHandshake);
        }
        let attempt = attempts_so_far + 1;
        RetryDecision::Retry {
            attempt,
            delay: Duration::from_millis(config.calculate_backoff_delay(attempt)),
        }
    }

    /// Only an acknowledged session may publish
    pub fn can_publish(state: &ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    pub fn log_transition(from: &ConnectionState, to: &ConnectionState) {
        match (from, to) {
            (ConnectionState::Connecting, ConnectionState::Connected) => {
                info!("MQTT session established");
            }
            (ConnectionState::Reconnecting(attempt), ConnectionState::Connected) => {
                info!(attempt, "MQTT session resumed");
            }
            (ConnectionState::Connecting, ConnectionState::Disconnected(reason)) => {
                error!(reason = %reason, "MQTT handshake failed");
            }
            (ConnectionState::Connected, ConnectionState::Disconnected(reason)) => {
                warn!(reason = %reason, "MQTT session lost");
            }
            (_, ConnectionState::Reconnecting(attempt)) => {
                info!(attempt, "Retrying MQTT connection");
            }
            _ => {
                info!(from = from.label(), to = to.label(), "MQTT state changed");
            }
        }
    }
}
