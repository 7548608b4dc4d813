//! Observability for the telemetry bridge
//!
//! Structured logging via `tracing`, configured from the environment.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{cycle_span, event_span, mqtt_span};
