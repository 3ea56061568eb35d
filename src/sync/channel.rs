//! # Sync Channel
//!
//! Controller-side publishing and host-side subscription of [`ControlState`]
//! snapshots for one room.
//!
//! ## Publish Throttling
//!
//! Publishes closer than `interval` (default 50ms) to the last accepted
//! publish are dropped. A change of `is_boosting` relative to the last
//! accepted publish goes out immediately. A publish the transport rejects
//! is not counted as accepted, so the next one retries.
//!
//! ```text
//! t=0   x=10 boost=false  -> Sent
//! t=20  x=12 boost=false  -> Throttled
//! t=30  x=12 boost=true   -> Sent (edge)
//! t=60  x=14 boost=true   -> Throttled
//! t=80  x=15 boost=true   -> Sent
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::room::RoomId;
use super::roster::PlayerSlot;
use super::state::{ControlState, SessionPresence};
use super::store::{KvStore, PresenceClaim, Value, WatchId};
use crate::error::Result;

/// Default minimum spacing between accepted publishes.
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_millis(50);

/// Result of one publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the transport.
    Sent,
    /// Dropped by the throttle.
    Throttled,
    /// Rejected by the transport; the next publish retries.
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct Accepted {
    at: Instant,
    is_boosting: bool,
}

/// Publishing side of a room.
pub struct SyncChannel {
    store: Arc<dyn KvStore>,
    room: RoomId,
    key: String,
    player: Option<PlayerSlot>,
    interval: Duration,
    last_accepted: Option<Accepted>,
}

impl std::fmt::Debug for SyncChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncChannel")
            .field("room", &self.room)
            .field("key", &self.key)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl SyncChannel {
    /// Creates a single-controller publisher.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use air_bridge::sync::{ControlState, MemoryStore, PublishOutcome, RoomId, SyncChannel};
    /// use air_bridge::sync::channel::DEFAULT_PUBLISH_INTERVAL;
    ///
    /// let store = MemoryStore::new();
    /// let room = RoomId::parse("AB12")?;
    /// let mut channel = SyncChannel::controller(Arc::new(store.connect()), room.clone(), DEFAULT_PUBLISH_INTERVAL);
    ///
    /// assert_eq!(channel.publish(ControlState::new(30.0, -10.0, true)), PublishOutcome::Sent);
    /// assert!(store.get(&room.controller_key()).is_some());
    /// # Ok::<(), air_bridge::error::AirBridgeError>(())
    /// ```
    #[must_use]
    pub fn controller(store: Arc<dyn KvStore>, room: RoomId, interval: Duration) -> Self {
        let key = room.controller_key();
        Self {
            store,
            room,
            key,
            player: None,
            interval,
            last_accepted: None,
        }
    }

    /// Creates a publisher for one player of a multi-player room.
    ///
    /// Published states carry the player's id and color.
    #[must_use]
    pub fn player(
        store: Arc<dyn KvStore>,
        room: RoomId,
        slot: &PlayerSlot,
        interval: Duration,
    ) -> Self {
        let key = room.player_key(&slot.player_id);
        Self {
            store,
            room,
            key,
            player: Some(slot.clone()),
            interval,
            last_accepted: None,
        }
    }

    /// Returns the key states are written to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the room this channel publishes to.
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Publishes a state now.
    pub fn publish(&mut self, state: ControlState) -> PublishOutcome {
        self.publish_at(state, Instant::now())
    }

    /// Publishes a state as if at time `now`.
    pub fn publish_at(&mut self, mut state: ControlState, now: Instant) -> PublishOutcome {
        if let Some(last) = self.last_accepted {
            let is_edge = last.is_boosting != state.is_boosting;
            if !is_edge && now.saturating_duration_since(last.at) < self.interval {
                return PublishOutcome::Throttled;
            }
        }

        state.touch();
        if let Some(slot) = &self.player {
            state.owner_id = Some(slot.player_id.clone());
            state.color = Some(slot.color.clone());
        }

        if let Err(e) = self.write_state(&state) {
            debug!("Publish to {} failed: {}", self.key, e);
            return PublishOutcome::Failed;
        }

        self.last_accepted = Some(Accepted {
            at: now,
            is_boosting: state.is_boosting,
        });

        let presence = SessionPresence::connected(self.room.as_str())
            .to_value()
            .and_then(|value| self.store.set(&self.room.status_key(), value));
        if let Err(e) = presence {
            debug!("Presence update failed: {}", e);
        }

        PublishOutcome::Sent
    }

    /// Removes this publisher's key from the room.
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` if the store rejects the removal.
    pub fn clear(&mut self) -> Result<()> {
        self.last_accepted = None;
        self.store.remove(&self.key)
    }

    fn write_state(&self, state: &ControlState) -> Result<()> {
        self.store.set(&self.key, state.to_value()?)
    }

    /// Subscribes to a room's controller key as its host.
    ///
    /// Sets the room status to `waiting` and registers the removal of the
    /// status key on disconnect, in the same store operation as the watch.
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` if the watch cannot be registered.
    pub fn subscribe(store: Arc<dyn KvStore>, room: &RoomId) -> Result<Subscription> {
        let claim = PresenceClaim::new(
            room.status_key(),
            SessionPresence::waiting(room.as_str()).to_value()?,
        );
        let watch = store.watch(&room.controller_key(), Some(claim))?;
        debug!("Subscribed to {}", room.controller_key());
        Ok(Subscription::new(store, watch.id, watch.receiver))
    }

    /// Subscribes to one player's key without claiming presence.
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` if the watch cannot be registered.
    pub fn subscribe_player(
        store: Arc<dyn KvStore>,
        room: &RoomId,
        player_id: &str,
    ) -> Result<Subscription> {
        let watch = store.watch(&room.player_key(player_id), None)?;
        Ok(Subscription::new(store, watch.id, watch.receiver))
    }
}

/// Receiving side of a room key.
///
/// Undecodable values are skipped; [`Subscription::last_good`] keeps the
/// last state that decoded.
pub struct Subscription {
    store: Arc<dyn KvStore>,
    id: WatchId,
    receiver: mpsc::UnboundedReceiver<Value>,
    last_good: Option<ControlState>,
    detached: bool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("last_good", &self.last_good)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    fn new(store: Arc<dyn KvStore>, id: WatchId, receiver: mpsc::UnboundedReceiver<Value>) -> Self {
        Self {
            store,
            id,
            receiver,
            last_good: None,
            detached: false,
        }
    }

    /// Waits for the next decodable state.
    ///
    /// Returns `None` once the watch has ended (unsubscribed or transport
    /// gone).
    pub async fn next(&mut self) -> Option<ControlState> {
        while let Some(value) = self.receiver.recv().await {
            if let Some(state) = self.accept(value) {
                return Some(state);
            }
        }
        None
    }

    /// Returns the next already-delivered state without waiting.
    pub fn try_next(&mut self) -> Option<ControlState> {
        while let Ok(value) = self.receiver.try_recv() {
            if let Some(state) = self.accept(value) {
                return Some(state);
            }
        }
        None
    }

    /// Last state that decoded successfully.
    #[must_use]
    pub fn last_good(&self) -> Option<&ControlState> {
        self.last_good.as_ref()
    }

    /// Stops delivery. Values already queued are discarded.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn accept(&mut self, value: Value) -> Option<ControlState> {
        if value.is_null() {
            debug!("Remote state removed");
            return None;
        }

        match ControlState::from_value(value) {
            Ok(state) => {
                self.last_good = Some(state.clone());
                Some(state)
            }
            Err(e) => {
                warn!("Ignoring remote state: {}", e);
                None
            }
        }
    }

    fn detach(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        self.store.unwatch(self.id);
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}
