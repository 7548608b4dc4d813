//! Topic construction and device identifier sanitization
//!
//! Every topic and every discovery unique id is namespaced by the sanitized
//! device hostname, so the same hostname always lands on the same topics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Home Assistant discovery prefix
pub const DISCOVERY_PREFIX: &str = "homeassistant";

/// Prefix for presence and telemetry topics
pub const STATE_TOPIC_PREFIX: &str = "steamdeck";

/// Presence payload while the bridge is connected
pub const PAYLOAD_ONLINE: &str = "online";

/// Presence payload for clean disconnects and the last will
pub const PAYLOAD_OFFLINE: &str = "offline";

/// Sanitize a name for use in topics and unique ids.
///
/// Lowercases and maps spaces, hyphens and dots to underscores. Applying it
/// twice yields the same result as applying it once.
pub fn sanitize_identifier(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '.' => '_',
            other => other,
        })
        .collect()
}

/// Sensor categories that can be enabled or disabled independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorCategory {
    Battery,
    Disk,
    Network,
    Game,
    Download,
}

impl SensorCategory {
    /// All categories in registration order
    pub const ALL: [SensorCategory; 5] = [
        SensorCategory::Battery,
        SensorCategory::Disk,
        SensorCategory::Network,
        SensorCategory::Game,
        SensorCategory::Download,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorCategory::Battery => "battery",
            SensorCategory::Disk => "disk",
            SensorCategory::Network => "network",
            SensorCategory::Game => "game",
            SensorCategory::Download => "download",
        }
    }

    /// Hardware categories are polled and published retained; game and
    /// download are event-driven and transient.
    pub fn is_retained(&self) -> bool {
        matches!(
            self,
            SensorCategory::Battery | SensorCategory::Disk | SensorCategory::Network
        )
    }
}

impl fmt::Display for SensorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topic construction for a single device
pub struct TopicBuilder;

impl TopicBuilder {
    /// Build presence topic: `steamdeck/{device}/status`
    pub fn build_status_topic(device_id: &str) -> String {
        format!("{STATE_TOPIC_PREFIX}/{device_id}/status")
    }

    /// Build telemetry topic: `steamdeck/{device}/telemetry/{category}`
    pub fn build_telemetry_topic(device_id: &str, category: SensorCategory) -> String {
        format!("{STATE_TOPIC_PREFIX}/{device_id}/telemetry/{category}")
    }

    /// Build discovery config topic: `homeassistant/{component}/{device}_{object_id}/config`
    pub fn build_discovery_topic(component: &str, device_id: &str, object_id: &str) -> String {
        format!("{DISCOVERY_PREFIX}/{component}/{device_id}_{object_id}/config")
    }

    /// Build discovery unique id: `steamdeck_{device}_{object_id}`
    pub fn build_unique_id(device_id: &str, object_id: &str) -> String {
        format!("{STATE_TOPIC_PREFIX}_{device_id}_{object_id}")
    }
}
