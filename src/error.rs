//! Error types for the commodity monitor

use thiserror::Error;

/// Main error type for the monitor
#[derive(Error, Debug, Clone)]
pub enum MonitorError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Failures reported by a vendor session capability
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Session refused: {0}")]
    Refused(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Session closed")]
    Closed,
}

/// Failures on the connect path
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    #[error("Failed to start session: {0}")]
    SessionStart(String),

    #[error("Failed to open service {service}: {reason}")]
    ServiceOpen { service: String, reason: String },

    #[error("Timeout occurred: {0}")]
    Timeout(String),

    #[error("No live session configured")]
    NoSession,
}

/// A single tick or news item that could not be decoded
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Invalid data type for {field}: {value}")]
    InvalidDataType { field: String, value: String },

    #[error("Malformed message: {0}")]
    MalformedMessage(String),
}

/// Rejected configuration values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to parse {key}={value}")]
    Parse { key: String, value: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, reason: &str) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Fault taxonomy used to decide how loudly a failure is surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Session or service failed to open. Shown as a passive status.
    Connection,
    /// One malformed tick or news item. Logged only.
    Decode,
    /// The live event loop failed mid-stream. Shown once to the user.
    Streaming,
    /// Error while stopping a session. Always swallowed.
    Teardown,
}

/// Error reporter for structured logging
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn report(class: FaultClass, context: &str, error: &dyn std::fmt::Display) {
        match class {
            FaultClass::Streaming => {
                tracing::error!(context, "streaming fault: {}", error);
            }
            FaultClass::Connection => {
                tracing::warn!(context, "connection fault: {}", error);
            }
            FaultClass::Teardown => {
                tracing::warn!(context, "teardown fault (ignored): {}", error);
            }
            FaultClass::Decode => {
                tracing::debug!(context, "decode fault, item dropped: {}", error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let err: MonitorError = SessionError::Transport("socket reset".into()).into();
        assert_eq!(err.to_string(), "Session error: Transport failure: socket reset");

        let err: MonitorError = ConnectionError::ServiceOpen {
            service: "//blp/mktdata".into(),
            reason: "denied".into(),
        }
        .into();
        assert!(err.to_string().contains("//blp/mktdata"));
    }
}
