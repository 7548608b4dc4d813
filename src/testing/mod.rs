//! Testing utilities and mock implementations
//!
//! Mocks for the transport and telemetry seams so bridge behavior can be
//! tested without an MQTT broker or real hardware.

pub mod mocks;

pub use mocks::*;
