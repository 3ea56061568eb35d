//! # Error Types
//!
//! Custom error types for Air Bridge using `thiserror`.
//!
//! None of these errors is fatal to the process. Each one either disables a
//! single input mode or degrades to "hold the last known good state".

use thiserror::Error;

/// Main error type for Air Bridge
#[derive(Debug, Error)]
pub enum AirBridgeError {
    /// Motion sensor access refused by the operating system
    #[error("Motion sensor permission denied: {0}")]
    PermissionDenied(String),

    /// Sensor acquisition blocked because the session runs over an unencrypted link
    #[error("Insecure context, motion sensors are blocked: {0}")]
    InsecureContext(String),

    /// Publish/subscribe call could not reach the transport
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Received control state could not be decoded
    #[error("Malformed remote state: {0}")]
    MalformedRemoteState(String),

    /// No motion sensor device present
    #[error("No motion sensor found")]
    SensorNotFound,

    /// Sensor read errors
    #[error("Sensor error: {0}")]
    Sensor(String),

    /// Key/pointer event synthesis errors
    #[error("Input synthesis error: {0}")]
    Synthesizer(String),

    /// Room identifier is not 4 alphanumeric characters
    #[error("Invalid room id: {0}")]
    InvalidRoomId(String),

    /// The requested input mode cannot be entered
    #[error("Input mode unavailable: {0}")]
    ModeUnavailable(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AirBridgeError {
    /// Returns true if this error rules out Motion mode while leaving
    /// Digital mode usable.
    #[must_use]
    pub fn is_terminal_for_motion(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_) | Self::InsecureContext(_) | Self::SensorNotFound
        )
    }

    /// Returns true for the conditions that are surfaced to the user
    /// (permission denied, insecure transport, transport unavailable).
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_) | Self::InsecureContext(_) | Self::TransportUnavailable(_)
        )
    }
}

/// Result type alias for Air Bridge
pub type Result<T> = std::result::Result<T, AirBridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_terminal_classification() {
        assert!(AirBridgeError::PermissionDenied("x".into()).is_terminal_for_motion());
        assert!(AirBridgeError::InsecureContext("x".into()).is_terminal_for_motion());
        assert!(AirBridgeError::SensorNotFound.is_terminal_for_motion());
        assert!(!AirBridgeError::TransportUnavailable("x".into()).is_terminal_for_motion());
    }

    #[test]
    fn test_user_visible_classification() {
        assert!(AirBridgeError::TransportUnavailable("down".into()).is_user_visible());
        assert!(!AirBridgeError::MalformedRemoteState("bad".into()).is_user_visible());
        assert!(!AirBridgeError::SensorNotFound.is_user_visible());
    }

    #[test]
    fn test_error_messages() {
        let err = AirBridgeError::InvalidRoomId("abc".into());
        assert_eq!(err.to_string(), "Invalid room id: abc");
    }
}
