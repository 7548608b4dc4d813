//! Home Assistant discovery descriptors
//!
//! The catalogue below is the full list of entities the bridge announces.
//! Each entry reads one field of a category's telemetry payload through a
//! `{{ value_json.<field> }}` template.

use crate::protocol::{
    SensorCategory, TopicBuilder, PAYLOAD_OFFLINE, PAYLOAD_ONLINE, STATE_TOPIC_PREFIX,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Home Assistant stringifies JSON booleans this way in templates
pub const BOOL_PAYLOAD_ON: &str = "True";
pub const BOOL_PAYLOAD_OFF: &str = "False";

/// Object id of the connectivity sensor bound to the status topic
pub const STATUS_OBJECT_ID: &str = "status";

/// Home Assistant component an entity is registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Sensor,
    BinarySensor,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Sensor => "sensor",
            ComponentKind::BinarySensor => "binary_sensor",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device block embedded in every descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

impl DeviceDescriptor {
    /// `hostname` is the raw hostname; `device_id` its sanitized form
    pub fn new(hostname: &str, device_id: &str) -> Self {
        Self {
            identifiers: vec![format!("{STATE_TOPIC_PREFIX}_{device_id}")],
            name: format!("Steam Deck ({hostname})"),
            manufacturer: "Valve".to_string(),
            model: "Steam Deck".to_string(),
        }
    }
}

/// Discovery config payload for a single entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    pub name: String,
    pub state_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_off: Option<String>,
    pub unique_id: String,
    pub device: DeviceDescriptor,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub availability: Option<Availability>,
}

/// Availability binding to the presence topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Availability {
    pub availability_topic: String,
    pub payload_available: String,
    pub payload_not_available: String,
}

impl Availability {
    pub fn new(status_topic: &str) -> Self {
        Self {
            availability_topic: status_topic.to_string(),
            payload_available: PAYLOAD_ONLINE.to_string(),
            payload_not_available: PAYLOAD_OFFLINE.to_string(),
        }
    }
}

/// Static description of one catalogue entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorTemplate {
    pub component: ComponentKind,
    pub object_id: &'static str,
    /// Appended to the device name to form the display name
    pub label: &'static str,
    /// Payload field read by the value template
    pub field: &'static str,
    pub unit: Option<&'static str>,
    pub device_class: Option<&'static str>,
    pub state_class: Option<&'static str>,
    pub icon: Option<&'static str>,
}

impl SensorTemplate {
    const fn sensor(object_id: &'static str, label: &'static str, field: &'static str) -> Self {
        Self {
            component: ComponentKind::Sensor,
            object_id,
            label,
            field,
            unit: None,
            device_class: None,
            state_class: None,
            icon: None,
        }
    }

    const fn binary(object_id: &'static str, label: &'static str, field: &'static str) -> Self {
        Self {
            component: ComponentKind::BinarySensor,
            ..Self::sensor(object_id, label, field)
        }
    }

    const fn unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }

    const fn device_class(mut self, device_class: &'static str) -> Self {
        self.device_class = Some(device_class);
        self
    }

    const fn state_class(mut self, state_class: &'static str) -> Self {
        self.state_class = Some(state_class);
        self
    }

    const fn icon(mut self, icon: &'static str) -> Self {
        self.icon = Some(icon);
        self
    }
}

const BATTERY_SENSORS: [SensorTemplate; 3] = [
    SensorTemplate::sensor("battery_percent", "Battery", "percent")
        .unit("%")
        .device_class("battery")
        .state_class("measurement"),
    SensorTemplate::binary("charging", "Charging", "charging").device_class("battery_charging"),
    SensorTemplate::sensor(
        "battery_time_remaining",
        "Battery Time Remaining",
        "time_remaining_min",
    )
    .unit("min")
    .icon("mdi:battery-clock"),
];

const DISK_SENSORS: [SensorTemplate; 4] = [
    SensorTemplate::sensor("disk_free_internal", "Internal Storage Free", "internal_free_gb")
        .unit("GB")
        .icon("mdi:harddisk"),
    SensorTemplate::sensor(
        "disk_used_internal",
        "Internal Storage Used",
        "internal_percent_used",
    )
    .unit("%")
    .icon("mdi:harddisk"),
    SensorTemplate::sensor("disk_free_sd", "SD Card Free", "sd_free_gb")
        .unit("GB")
        .icon("mdi:sd"),
    SensorTemplate::binary("sd_mounted", "SD Card Mounted", "sd_mounted").icon("mdi:sd"),
];

const NETWORK_SENSORS: [SensorTemplate; 3] = [
    SensorTemplate::sensor("ip_primary", "IP Address", "ip_primary").icon("mdi:ip-network"),
    SensorTemplate::sensor("ip_wifi", "WiFi IP", "ip_wifi").icon("mdi:wifi"),
    SensorTemplate::sensor("ip_ethernet", "Ethernet IP", "ip_ethernet").icon("mdi:ethernet"),
];

const GAME_SENSORS: [SensorTemplate; 3] = [
    SensorTemplate::sensor("current_game", "Current Game", "game_name")
        .icon("mdi:gamepad-variant"),
    SensorTemplate::sensor("current_appid", "Current App ID", "app_id").icon("mdi:identifier"),
    SensorTemplate::binary("game_running", "Game Running", "is_running")
        .icon("mdi:gamepad-variant"),
];

const DOWNLOAD_SENSORS: [SensorTemplate; 3] = [
    SensorTemplate::binary("downloading", "Downloading", "downloading").icon("mdi:download"),
    SensorTemplate::sensor("download_progress", "Download Progress", "download_progress")
        .unit("%")
        .icon("mdi:download"),
    SensorTemplate::sensor("download_rate", "Download Rate", "download_rate_mbps")
        .unit("Mbps")
        .icon("mdi:speedometer"),
];

/// Catalogue entries for a category, in registration order
pub fn catalogue(category: SensorCategory) -> &'static [SensorTemplate] {
    match category {
        SensorCategory::Battery => &BATTERY_SENSORS,
        SensorCategory::Disk => &DISK_SENSORS,
        SensorCategory::Network => &NETWORK_SENSORS,
        SensorCategory::Game => &GAME_SENSORS,
        SensorCategory::Download => &DOWNLOAD_SENSORS,
    }
}

impl SensorDescriptor {
    /// Build the descriptor for a catalogue entry of `category`
    pub fn from_template(
        template: &SensorTemplate,
        category: SensorCategory,
        device: &DeviceDescriptor,
        device_id: &str,
        status_topic: Option<&str>,
    ) -> Self {
        let is_binary = template.component == ComponentKind::BinarySensor;
        Self {
            name: format!("{} {}", device.name, template.label),
            state_topic: TopicBuilder::build_telemetry_topic(device_id, category),
            unit_of_measurement: template.unit.map(str::to_string),
            value_template: Some(format!("{{{{ value_json.{} }}}}", template.field)),
            device_class: template.device_class.map(str::to_string),
            state_class: template.state_class.map(str::to_string),
            icon: template.icon.map(str::to_string),
            payload_on: is_binary.then(|| BOOL_PAYLOAD_ON.to_string()),
            payload_off: is_binary.then(|| BOOL_PAYLOAD_OFF.to_string()),
            unique_id: TopicBuilder::build_unique_id(device_id, template.object_id),
            device: device.clone(),
            availability: status_topic.map(Availability::new),
        }
    }

    /// Connectivity sensor reading the presence topic directly
    pub fn status(device: &DeviceDescriptor, device_id: &str, status_topic: &str) -> Self {
        Self {
            name: format!("{} Status", device.name),
            state_topic: status_topic.to_string(),
            unit_of_measurement: None,
            value_template: None,
            device_class: Some("connectivity".to_string()),
            state_class: None,
            icon: Some("mdi:steam".to_string()),
            payload_on: Some(PAYLOAD_ONLINE.to_string()),
            payload_off: Some(PAYLOAD_OFFLINE.to_string()),
            unique_id: TopicBuilder::build_unique_id(device_id, STATUS_OBJECT_ID),
            device: device.clone(),
            availability: Some(Availability::new(status_topic)),
        }
    }
}
