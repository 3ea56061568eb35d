//! # Shared State Types
//!
//! Values written into the store. Both are serialized as JSON objects with
//! camelCase keys so that any pub/sub consumer can read them.
//!
//! ```json
//! {"x": 30.0, "y": -10.0, "isBoosting": true, "updatedAt": 1700000000000}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AirBridgeError, Result};
use crate::motion::pipeline::CONTROL_RANGE;

/// Current wall-clock time in unix milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Control snapshot transported from controller to host.
///
/// Every delivered value is a complete snapshot, never a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlState {
    /// Steering, clamped to ±60.
    pub x: f32,
    /// Throttle, clamped to ±60.
    pub y: f32,
    /// Boost/action button held.
    pub is_boosting: bool,
    /// Unix millis of the publish. Older payloads name this `timestamp`.
    #[serde(default, alias = "timestamp")]
    pub updated_at: i64,
    /// Participant id in multi-player rooms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Per-participant identity color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            is_boosting: false,
            updated_at: 0,
            owner_id: None,
            color: None,
        }
    }
}

impl ControlState {
    /// Creates a single-controller state with clamped axes.
    ///
    /// # Examples
    ///
    /// ```
    /// use air_bridge::sync::ControlState;
    ///
    /// let state = ControlState::new(75.0, -10.0, true);
    /// assert_eq!(state.x, 60.0);
    /// assert_eq!(state.y, -10.0);
    /// ```
    #[must_use]
    pub fn new(x: f32, y: f32, is_boosting: bool) -> Self {
        Self {
            x: clamp_axis(x),
            y: clamp_axis(y),
            is_boosting,
            ..Self::default()
        }
    }

    /// Stamps `updated_at` with the current time.
    pub fn touch(&mut self) {
        self.updated_at = now_millis();
    }

    /// Returns true if this snapshot came from a real publish.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.updated_at > 0
    }

    /// Decodes a store value.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRemoteState` if required fields are missing or have
    /// the wrong type. Axes outside ±60 are clamped rather than rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut state: ControlState = serde_json::from_value(value)
            .map_err(|e| AirBridgeError::MalformedRemoteState(e.to_string()))?;
        if !state.x.is_finite() || !state.y.is_finite() {
            return Err(AirBridgeError::MalformedRemoteState(
                "non-finite axis value".to_string(),
            ));
        }
        state.x = clamp_axis(state.x);
        state.y = clamp_axis(state.y);
        Ok(state)
    }

    /// Encodes this snapshot as a store value.
    ///
    /// # Errors
    ///
    /// Returns `Json` if serialization fails.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn clamp_axis(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-CONTROL_RANGE, CONTROL_RANGE)
    } else {
        0.0
    }
}

/// Whether a room has an active publisher yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Waiting,
    Connected,
}

/// Presence record stored at `rooms/{room}/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPresence {
    pub room_key: String,
    pub status: PresenceStatus,
    pub last_seen_at: i64,
}

impl SessionPresence {
    #[must_use]
    pub fn waiting(room_key: &str) -> Self {
        Self {
            room_key: room_key.to_string(),
            status: PresenceStatus::Waiting,
            last_seen_at: now_millis(),
        }
    }

    #[must_use]
    pub fn connected(room_key: &str) -> Self {
        Self {
            room_key: room_key.to_string(),
            status: PresenceStatus::Connected,
            last_seen_at: now_millis(),
        }
    }

    /// Decodes a store value.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRemoteState` on missing fields.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| AirBridgeError::MalformedRemoteState(e.to_string()))
    }

    /// Encodes this record as a store value.
    ///
    /// # Errors
    ///
    /// Returns `Json` if serialization fails.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_clamps_axes() {
        let state = ControlState::new(-90.0, 61.0, false);
        assert_eq!(state.x, -60.0);
        assert_eq!(state.y, 60.0);
        assert!(!state.is_live());
    }

    #[test]
    fn test_serializes_camel_case() {
        let mut state = ControlState::new(30.0, -10.0, true);
        state.updated_at = 42;
        let value = state.to_value().unwrap();
        assert_eq!(value, json!({"x": 30.0, "y": -10.0, "isBoosting": true, "updatedAt": 42}));
    }

    #[test]
    fn test_decodes_legacy_timestamp_field() {
        let state =
            ControlState::from_value(json!({"x": 12, "y": 3, "isBoosting": false, "timestamp": 99}))
                .unwrap();
        assert_eq!(state.x, 12.0);
        assert_eq!(state.updated_at, 99);
    }

    #[test]
    fn test_decodes_player_fields() {
        let state = ControlState::from_value(json!({
            "x": 1, "y": 2, "isBoosting": false, "updatedAt": 5,
            "ownerId": "p2", "color": "#ec4899"
        }))
        .unwrap();
        assert_eq!(state.owner_id.as_deref(), Some("p2"));
        assert_eq!(state.color.as_deref(), Some("#ec4899"));
    }

    #[test]
    fn test_missing_fields_are_malformed() {
        let result = ControlState::from_value(json!({"x": 12}));
        assert!(matches!(result, Err(AirBridgeError::MalformedRemoteState(_))));

        let result = ControlState::from_value(json!("waiting"));
        assert!(matches!(result, Err(AirBridgeError::MalformedRemoteState(_))));
    }

    #[test]
    fn test_out_of_range_remote_values_clamped() {
        let state =
            ControlState::from_value(json!({"x": 500, "y": -500, "isBoosting": false})).unwrap();
        assert_eq!(state.x, 60.0);
        assert_eq!(state.y, -60.0);
    }

    #[test]
    fn test_presence_serialization() {
        let presence = SessionPresence::waiting("AB12");
        let value = presence.to_value().unwrap();
        assert_eq!(value["status"], "waiting");
        assert_eq!(value["roomKey"], "AB12");

        let decoded = SessionPresence::from_value(value).unwrap();
        assert_eq!(decoded.status, PresenceStatus::Waiting);
    }
}
