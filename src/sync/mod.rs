//! # Sync Module
//!
//! Transports control state between controller and host through a
//! pub/sub key-value store.
//!
//! This module handles:
//! - The wire types ([`ControlState`], [`SessionPresence`])
//! - Room ids and the key layout of a room
//! - The store abstraction with an in-memory and an MQTT implementation
//! - Throttled publishing and subscription with presence tracking
//! - Player ids and colors for multi-player rooms

pub mod channel;
pub mod endpoint;
pub mod mqtt;
pub mod room;
pub mod roster;
pub mod state;
pub mod store;
pub mod transport;

pub use channel::{PublishOutcome, Subscription, SyncChannel};
pub use endpoint::Endpoint;
pub use mqtt::{MqttStore, MqttStoreConfig};
pub use room::RoomId;
pub use roster::{join_room, PlayerRoster, PlayerSlot};
pub use state::{ControlState, PresenceStatus, SessionPresence};
pub use store::{KvStore, MemoryConnection, MemoryStore, PresenceClaim, Value, Watch, WatchId};
