//! Crate error type and host-facing error sanitization
//!
//! Each layer keeps its own `thiserror` enum; [`BridgeError`] unifies them
//! for the host-facing operations, which report failures as strings.

use crate::config::ConfigError;
use crate::protocol::EventError;
use crate::transport::mqtt::MqttError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Longest error string handed back to the host
const MAX_ERROR_LEN: usize = 500;

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("MQTT error: {0}")]
    Mqtt(#[from] MqttError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Telemetry collection failed: {message}")]
    Telemetry { message: String },

    #[error("Not connected to MQTT")]
    NotConnected,
}

impl BridgeError {
    pub fn telemetry<S: Into<String>>(message: S) -> Self {
        Self::Telemetry {
            message: message.into(),
        }
    }

    /// Message safe to return through the control API
    pub fn to_host_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|passwd|token|key|secret)[=:]\s*\S+")
        .expect("secret pattern is a valid regex")
});

static URL_CREDENTIALS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(mqtts?|tcp|ssl|wss?)://[^:/@\s]+:[^@\s]+@")
        .expect("url credentials pattern is a valid regex")
});

/// Redact credentials from an error message and cap its length
pub fn sanitize_error_message(message: &str) -> String {
    let sanitized = SECRET_PATTERN.replace_all(message, "${1}=***");
    let mut sanitized = URL_CREDENTIALS_PATTERN
        .replace_all(&sanitized, "${1}://***@")
        .to_string();

    if sanitized.len() > MAX_ERROR_LEN {
        let suffix = "...[truncated]";
        let mut cut = MAX_ERROR_LEN - suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str(suffix);
    }

    sanitized
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
