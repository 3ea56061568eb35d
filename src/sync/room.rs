//! Room identifiers and the key layout inside a room.
//!
//! ```text
//! rooms/{room}/controller         single-controller ControlState
//! rooms/{room}/players/{player}   per-player ControlState
//! rooms/{room}/status             SessionPresence
//! rooms/{room}/roster             PlayerRoster (player colors)
//! ```
//!
//! Room ids are 4 characters from `[0-9A-Z]`, compared case-insensitively.
//! They are generated locally with no collision check: two sessions that
//! draw the same id silently share a room.

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hasher};
use std::str::FromStr;

use crate::error::{AirBridgeError, Result};

/// Number of characters in a room id.
pub const ROOM_ID_LEN: usize = 4;

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Normalized (upper-case) room identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(String);

impl RoomId {
    /// Generates a random room id.
    ///
    /// Not cryptographically random. There is no collision check, so two
    /// rooms drawing the same id share keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use air_bridge::sync::RoomId;
    ///
    /// let room = RoomId::generate();
    /// assert_eq!(room.as_str().len(), 4);
    /// ```
    #[must_use]
    pub fn generate() -> Self {
        let mut hasher = RandomState::new().build_hasher();
        hasher.write_i64(chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default());
        let mut bits = hasher.finish();

        let id = (0..ROOM_ID_LEN)
            .map(|_| {
                let c = ALPHABET[(bits % ALPHABET.len() as u64) as usize] as char;
                bits /= ALPHABET.len() as u64;
                c
            })
            .collect();
        Self(id)
    }

    /// Parses and normalizes a user-supplied room id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRoomId` unless the input is exactly 4 ASCII
    /// alphanumerics (surrounding whitespace is ignored).
    ///
    /// # Examples
    ///
    /// ```
    /// use air_bridge::sync::RoomId;
    ///
    /// let room = RoomId::parse(" ab1z ")?;
    /// assert_eq!(room.as_str(), "AB1Z");
    /// assert!(RoomId::parse("abc").is_err());
    /// # Ok::<(), air_bridge::error::AirBridgeError>(())
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.len() != ROOM_ID_LEN || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AirBridgeError::InvalidRoomId(input.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key holding the single-controller ControlState.
    #[must_use]
    pub fn controller_key(&self) -> String {
        format!("rooms/{}/controller", self.0)
    }

    /// Key holding one player's ControlState.
    #[must_use]
    pub fn player_key(&self, player_id: &str) -> String {
        format!("rooms/{}/players/{}", self.0, player_id)
    }

    /// Key holding the room's SessionPresence.
    #[must_use]
    pub fn status_key(&self) -> String {
        format!("rooms/{}/status", self.0)
    }

    /// Key holding the room's player roster.
    #[must_use]
    pub fn roster_key(&self) -> String {
        format!("rooms/{}/roster", self.0)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomId {
    type Err = AirBridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
