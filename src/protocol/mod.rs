//! Wire-level types: topics, device identifiers, telemetry payloads and host events

pub mod events;
pub mod messages;
pub mod topics;

pub use events::*;
pub use messages::*;
pub use topics::*;
