//! Home Assistant MQTT discovery
//!
//! Descriptors are published retained under
//! `homeassistant/<component>/<device>_<object_id>/config`. Unique ids only
//! depend on the hostname and object id, so re-registering after every
//! reconnect updates entities in place.

pub mod descriptors;
pub mod registrar;

pub use descriptors::{
    catalogue, Availability, ComponentKind, DeviceDescriptor, SensorDescriptor, SensorTemplate,
};
pub use registrar::{DiscoveryRegistrar, RegistrationSummary};
