//! Device events forwarded by the host
//!
//! The host sends JSON objects with a `type` tag, optional type-specific
//! fields and an optional `timestamp`. Unknown tags are reported as
//! [`EventError::UnknownType`] so the caller can log and drop them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Event tags understood by the reconciler
pub const KNOWN_EVENT_TYPES: [&str; 9] = [
    "game_started",
    "game_stopped",
    "download_started",
    "download_progress",
    "download_completed",
    "download_stopped",
    "system_suspending",
    "system_resuming",
    "system_shutting_down",
];

/// Game, download and power events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceEvent {
    GameStarted {
        app_id: Option<u64>,
    },
    GameStopped {
        app_id: Option<u64>,
    },
    DownloadStarted {
        app_id: Option<u64>,
    },
    DownloadProgress {
        progress: Option<f64>,
        /// Transfer rate in Mbps
        rate: Option<f64>,
    },
    DownloadCompleted {
        app_id: Option<u64>,
    },
    DownloadStopped {},
    SystemSuspending {},
    SystemResuming {},
    SystemShuttingDown {},
}

impl DeviceEvent {
    /// Parse a raw host event
    pub fn from_value(value: &Value) -> Result<Self, EventError> {
        let event_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(EventError::MissingType)?;

        if !KNOWN_EVENT_TYPES.contains(&event_type) {
            return Err(EventError::UnknownType(event_type.to_string()));
        }

        serde_json::from_value(value.clone()).map_err(|source| EventError::Malformed {
            event_type: event_type.to_string(),
            source,
        })
    }

    /// The wire tag of this event
    pub fn event_type(&self) -> &'static str {
        match self {
            DeviceEvent::GameStarted { .. } => "game_started",
            DeviceEvent::GameStopped { .. } => "game_stopped",
            DeviceEvent::DownloadStarted { .. } => "download_started",
            DeviceEvent::DownloadProgress { .. } => "download_progress",
            DeviceEvent::DownloadCompleted { .. } => "download_completed",
            DeviceEvent::DownloadStopped {} => "download_stopped",
            DeviceEvent::SystemSuspending {} => "system_suspending",
            DeviceEvent::SystemResuming {} => "system_resuming",
            DeviceEvent::SystemShuttingDown {} => "system_shutting_down",
        }
    }

    /// Download events cancel a pending post-completion clear
    pub fn is_download_event(&self) -> bool {
        matches!(
            self,
            DeviceEvent::DownloadStarted { .. }
                | DeviceEvent::DownloadProgress { .. }
                | DeviceEvent::DownloadCompleted { .. }
                | DeviceEvent::DownloadStopped {}
        )
    }
}

/// Reasons a host event is dropped
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event has no type tag")]
    MissingType,
    #[error("Unknown event type: {0}")]
    UnknownType(String),
    #[error("Malformed {event_type} event")]
    Malformed {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}
