//! # Player Roster
//!
//! Multi-player rooms give each participant its own key
//! (`rooms/{room}/players/{player}`) and an identity color. Colors come from
//! a fixed palette first, then from a generated hue sequence. A color is
//! never handed out twice within a roster, even after its player leaves.
//!
//! The roster of a room lives in the store at `rooms/{room}/roster`, so
//! participants in different processes draw from the same color sequence.
//! [`join_room`] reads it, adds the player and writes it back:
//!
//! ```json
//! {"players": {"p1": "#06b6d4"}, "issued": ["#06b6d4"], "generated": 0}
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

use super::room::RoomId;
use super::store::KvStore;
use crate::error::{AirBridgeError, Result};

/// Default time a join waits for the stored roster before treating the
/// room as empty.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_millis(1000);

/// Palette used for the first players of a room.
pub const PLAYER_PALETTE: [&str; 8] = [
    "#06b6d4", "#ec4899", "#22c55e", "#f59e0b", "#8b5cf6", "#ef4444", "#3b82f6", "#14b8a6",
];

/// A participant's identity within a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSlot {
    pub player_id: String,
    /// `#rrggbb` identity color, unique within the room.
    pub color: String,
}

/// Tracks the players of one room and their colors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRoster {
    #[serde(default)]
    players: BTreeMap<String, String>,
    #[serde(default)]
    issued: BTreeSet<String>,
    #[serde(default)]
    generated: u32,
}

impl PlayerRoster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a player, or returns its existing slot.
    ///
    /// # Examples
    ///
    /// ```
    /// use air_bridge::sync::PlayerRoster;
    ///
    /// let mut roster = PlayerRoster::new();
    /// let first = roster.join("p1");
    /// let again = roster.join("p1");
    /// assert_eq!(first, again);
    /// assert_ne!(roster.join("p2").color, first.color);
    /// ```
    pub fn join(&mut self, player_id: &str) -> PlayerSlot {
        if let Some(color) = self.players.get(player_id) {
            return PlayerSlot {
                player_id: player_id.to_string(),
                color: color.clone(),
            };
        }

        let color = self.next_color();
        self.issued.insert(color.clone());
        self.players.insert(player_id.to_string(), color.clone());
        info!("Player {} joined with color {}", player_id, color);

        PlayerSlot {
            player_id: player_id.to_string(),
            color,
        }
    }

    /// Removes a player. Its color stays retired.
    pub fn leave(&mut self, player_id: &str) -> bool {
        let removed = self.players.remove(player_id).is_some();
        if removed {
            info!("Player {} left", player_id);
        }
        removed
    }

    /// Decodes a stored roster.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRemoteState` if the value is not a roster object.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut roster: PlayerRoster = serde_json::from_value(value)
            .map_err(|e| AirBridgeError::MalformedRemoteState(e.to_string()))?;
        // Colors of current players count as issued even if the list was trimmed
        let colors: Vec<String> = roster.players.values().cloned().collect();
        roster.issued.extend(colors);
        Ok(roster)
    }

    /// Encodes the roster as a store value.
    ///
    /// # Errors
    ///
    /// Returns `Json` if serialization fails.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    #[must_use]
    pub fn color_of(&self, player_id: &str) -> Option<&str> {
        self.players.get(player_id).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    fn next_color(&mut self) -> String {
        if let Some(color) = PLAYER_PALETTE
            .iter()
            .find(|color| !self.issued.contains(**color))
        {
            return (*color).to_string();
        }

        loop {
            // Golden-angle hue steps, lightness varied per full turn
            let n = self.generated;
            self.generated += 1;
            let hue = (n as f32 * 137.508) % 360.0;
            let lightness = 0.45 + 0.1 * ((n / 3) % 3) as f32;
            let color = hsl_to_hex(hue, 0.7, lightness);
            if !self.issued.contains(&color) {
                return color;
            }
        }
    }
}

/// Joins `player_id` to the room roster held in the store.
///
/// Reads `rooms/{room}/roster` (waiting up to `timeout` for a remote store to
/// deliver it, an absent key counts as an empty roster), adds the player and
/// writes the roster back. Rejoining with the same id returns the same color.
///
/// Two joins racing between the read and the write can draw the same color;
/// the store offers no compare-and-set.
///
/// # Errors
///
/// Returns `TransportUnavailable` if the roster cannot be watched or written.
pub async fn join_room(
    store: &Arc<dyn KvStore>,
    room: &RoomId,
    player_id: &str,
    timeout: Duration,
) -> Result<PlayerSlot> {
    let key = room.roster_key();
    let mut watch = store.watch(&key, None)?;

    let current = match watch.receiver.try_recv() {
        Ok(value) => Some(value),
        Err(TryRecvError::Disconnected) => None,
        Err(TryRecvError::Empty) => tokio::time::timeout(timeout, watch.receiver.recv())
            .await
            .unwrap_or_else(|_| {
                debug!("No roster stored for room {}", room);
                None
            }),
    };
    store.unwatch(watch.id);

    let mut roster = match current {
        Some(value) if !value.is_null() => PlayerRoster::from_value(value).unwrap_or_else(|e| {
            warn!("Replacing unreadable roster for room {}: {}", room, e);
            PlayerRoster::new()
        }),
        _ => PlayerRoster::new(),
    };

    let slot = roster.join(player_id);
    store.set(&key, roster.to_value()?)?;
    Ok(slot)
}

fn hsl_to_hex(hue: f32, saturation: f32, lightness: f32) -> String {
    let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let h = hue / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = lightness - c / 2.0;
    let to_byte = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    format!("#{:02x}{:02x}{:02x}", to_byte(r), to_byte(g), to_byte(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::MemoryStore;
    use std::collections::HashSet;

    const SHORT: Duration = Duration::from_millis(20);

    fn room() -> RoomId {
        RoomId::parse("AB12").unwrap()
    }

    #[test]
    fn test_palette_order() {
        let mut roster = PlayerRoster::new();
        assert_eq!(roster.join("a").color, "#06b6d4");
        assert_eq!(roster.join("b").color, "#ec4899");
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_colors_never_reused_after_leave() {
        let mut roster = PlayerRoster::new();
        let first = roster.join("a");
        assert!(roster.leave("a"));
        assert!(!roster.leave("a"));

        let second = roster.join("b");
        assert_ne!(first.color, second.color);
        assert!(roster.color_of("a").is_none());
    }

    #[test]
    fn test_generated_colors_after_palette() {
        let mut roster = PlayerRoster::new();
        let mut seen = HashSet::new();
        for i in 0..40 {
            let slot = roster.join(&format!("p{}", i));
            assert!(slot.color.starts_with('#') && slot.color.len() == 7);
            assert!(seen.insert(slot.color), "color reused");
        }
    }

    #[test]
    fn test_hsl_primary_colors() {
        assert_eq!(hsl_to_hex(0.0, 1.0, 0.5), "#ff0000");
        assert_eq!(hsl_to_hex(120.0, 1.0, 0.5), "#00ff00");
        assert_eq!(hsl_to_hex(240.0, 1.0, 0.5), "#0000ff");
    }

    // ==================== Stored Roster Tests ====================

    #[test]
    fn test_stored_roster_keeps_retired_colors() {
        let mut roster = PlayerRoster::new();
        let first = roster.join("a");
        roster.leave("a");

        let mut restored = PlayerRoster::from_value(roster.to_value().unwrap()).unwrap();
        assert_ne!(restored.join("b").color, first.color);
    }

    #[test]
    fn test_malformed_roster_rejected() {
        let value = serde_json::json!({"players": 3});
        assert!(matches!(
            PlayerRoster::from_value(value),
            Err(AirBridgeError::MalformedRemoteState(_))
        ));
    }

    #[tokio::test]
    async fn test_join_room_across_connections() {
        let store = MemoryStore::new();
        let first: Arc<dyn KvStore> = Arc::new(store.connect());
        let second: Arc<dyn KvStore> = Arc::new(store.connect());

        let p1 = join_room(&first, &room(), "p1", SHORT).await.unwrap();
        let p2 = join_room(&second, &room(), "p2", SHORT).await.unwrap();
        assert_ne!(p1.color, p2.color);

        let again = join_room(&second, &room(), "p1", SHORT).await.unwrap();
        assert_eq!(again, p1);
        assert_eq!(store.watcher_count(&room().roster_key()), 0);
    }

    #[tokio::test]
    async fn test_join_room_replaces_garbage() {
        let store = MemoryStore::new();
        let conn: Arc<dyn KvStore> = Arc::new(store.connect());
        conn.set(&room().roster_key(), serde_json::json!("junk")).unwrap();

        let slot = join_room(&conn, &room(), "p1", SHORT).await.unwrap();
        assert_eq!(slot.color, PLAYER_PALETTE[0]);
    }
}
