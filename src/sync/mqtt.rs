//! # MQTT Store
//!
//! [`KvStore`] backed by an MQTT broker through `rumqttc`.
//!
//! - Keys are topics, values are retained JSON payloads.
//! - Removal publishes an empty retained payload, which clears the topic.
//! - A watch subscribes to the topic; the broker replays the retained value
//!   first.
//! - Presence cleanup is the connection's Last Will: an empty retained
//!   payload on the presence key, registered at connect. The broker fires it
//!   when the session is lost, so claim and cleanup cannot drift apart.
//!
//! The event loop runs on its own task and reconnects on errors. On every
//! reconnect the active subscriptions and the presence claim are restored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS, Transport};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::endpoint::{Endpoint, Scheme};
use super::store::{KvStore, PresenceClaim, Value, Watch, WatchId};
use crate::error::{AirBridgeError, Result};

/// Outgoing request queue depth of the client.
const REQUEST_CAPACITY: usize = 64;

/// Pause before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Connection settings for [`MqttStore`].
#[derive(Debug, Clone)]
pub struct MqttStoreConfig {
    pub endpoint: Endpoint,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Key cleared by the broker if this session is lost.
    pub presence_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Decodes a message payload. Empty payloads are removals.
///
/// Returns `None` for payloads that are not JSON.
#[must_use]
pub fn decode_payload(payload: &Bytes) -> Option<Value> {
    if payload.is_empty() {
        return Some(Value::Null);
    }
    serde_json::from_slice(payload).ok()
}

#[derive(Debug, Default)]
struct Watchers {
    by_topic: HashMap<String, Vec<(WatchId, mpsc::UnboundedSender<Value>)>>,
    claim: Option<PresenceClaim>,
}

#[derive(Debug, Default)]
struct Shared {
    watchers: Mutex<Watchers>,
    connected: AtomicBool,
    closed: AtomicBool,
    next_id: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Watchers> {
        self.watchers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, topic: &str, payload: &Bytes) {
        let Some(value) = decode_payload(payload) else {
            warn!("Ignoring non-JSON payload on {}", topic);
            return;
        };

        let mut watchers = self.lock();
        if let Some(list) = watchers.by_topic.get_mut(topic) {
            list.retain(|(_, sender)| sender.send(value.clone()).is_ok());
        }
    }

    /// Drops watch `id`. Returns the topics left without watchers.
    fn remove_watch(&self, id: WatchId) -> Vec<String> {
        let mut watchers = self.lock();
        let mut emptied = Vec::new();
        for (topic, list) in watchers.by_topic.iter_mut() {
            list.retain(|(watch_id, _)| *watch_id != id);
            if list.is_empty() {
                emptied.push(topic.clone());
            }
        }
        for topic in &emptied {
            watchers.by_topic.remove(topic);
        }
        emptied
    }
}

/// Broker-backed store.
#[derive(Clone)]
pub struct MqttStore {
    client: AsyncClient,
    shared: Arc<Shared>,
    presence_key: Option<String>,
}

impl std::fmt::Debug for MqttStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttStore")
            .field("presence_key", &self.presence_key)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl MqttStore {
    /// Configures the client and starts its event loop.
    ///
    /// Must be called from within a tokio runtime. The connection is made in
    /// the background; operations before it completes are queued.
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` if the endpoint is not an MQTT URL.
    pub fn connect(config: MqttStoreConfig) -> Result<Self> {
        if config.endpoint.scheme() == Scheme::Memory {
            return Err(AirBridgeError::TransportUnavailable(format!(
                "{} is not a broker endpoint",
                config.endpoint
            )));
        }

        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.endpoint.host(),
            config.endpoint.port(),
        );
        options
            .set_keep_alive(config.keep_alive)
            .set_clean_session(true);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username.clone(), password.clone());
        }

        if config.endpoint.is_tls() {
            options.set_transport(Transport::tls_with_default_config());
        }

        if let Some(key) = &config.presence_key {
            options.set_last_will(LastWill::new(key.clone(), Vec::new(), QoS::AtLeastOnce, true));
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let shared = Arc::new(Shared::default());

        info!(
            "Connecting to MQTT broker {} as {}",
            config.endpoint, config.client_id
        );
        tokio::spawn(drive(eventloop, client.clone(), Arc::clone(&shared)));

        Ok(Self {
            client,
            shared,
            presence_key: config.presence_key,
        })
    }

    /// Returns true while the broker session is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Clears the presence key and disconnects.
    ///
    /// A clean disconnect does not fire the Last Will, so the presence key
    /// is removed explicitly first.
    pub fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(key) = &self.presence_key {
            if let Err(e) = self.client.try_publish(key.clone(), QoS::AtLeastOnce, true, Vec::new()) {
                debug!("Could not clear {}: {}", key, e);
            }
        }
        if let Err(e) = self.client.try_disconnect() {
            debug!("Disconnect request failed: {}", e);
        }
        info!("MQTT store shut down");
    }

    fn publish_raw(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(AirBridgeError::TransportUnavailable("store shut down".to_string()));
        }
        self.client
            .try_publish(key.to_string(), QoS::AtLeastOnce, true, payload)
            .map_err(|e| AirBridgeError::TransportUnavailable(e.to_string()))
    }
}

impl KvStore for MqttStore {
    fn set(&self, key: &str, value: Value) -> Result<()> {
        if !self.is_connected() {
            return Err(AirBridgeError::TransportUnavailable(
                "broker not connected".to_string(),
            ));
        }
        self.publish_raw(key, serde_json::to_vec(&value)?)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.publish_raw(key, Vec::new())
    }

    fn watch(&self, key: &str, presence: Option<PresenceClaim>) -> Result<Watch> {
        if let Some(claim) = presence {
            if self.presence_key.as_deref() != Some(claim.key.as_str()) {
                warn!(
                    "Presence key {} has no last will on this connection, it will not be cleared on disconnect",
                    claim.key
                );
            }
            self.publish_raw(&claim.key, serde_json::to_vec(&claim.value)?)?;
            self.shared.lock().claim = Some(claim);
        }

        // Registered before subscribing so the retained replay has a receiver
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = WatchId::new(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared
            .lock()
            .by_topic
            .entry(key.to_string())
            .or_default()
            .push((id, sender));

        if let Err(e) = self.client.try_subscribe(key.to_string(), QoS::AtLeastOnce) {
            self.shared.remove_watch(id);
            return Err(AirBridgeError::TransportUnavailable(e.to_string()));
        }

        debug!("Watching {}", key);
        Ok(Watch { id, receiver })
    }

    fn unwatch(&self, id: WatchId) {
        for topic in self.shared.remove_watch(id) {
            if let Err(e) = self.client.try_unsubscribe(topic.clone()) {
                debug!("Unsubscribe from {} failed: {}", topic, e);
            }
        }
    }
}

async fn drive(mut eventloop: EventLoop, client: AsyncClient, shared: Arc<Shared>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                shared.dispatch(&publish.topic, &publish.payload);
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to MQTT broker");
                shared.connected.store(true, Ordering::Release);
                restore(&client, &shared);
            }
            Ok(_) => {}
            Err(e) => {
                shared.connected.store(false, Ordering::Release);
                if shared.closed.load(Ordering::Acquire) {
                    break;
                }
                warn!("MQTT connection error: {}", e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
    debug!("MQTT event loop stopped");
}

/// Re-subscribes and re-asserts presence after a (re)connect.
fn restore(client: &AsyncClient, shared: &Shared) {
    let watchers = shared.lock();
    for topic in watchers.by_topic.keys() {
        if let Err(e) = client.try_subscribe(topic.clone(), QoS::AtLeastOnce) {
            warn!("Resubscribe to {} failed: {}", topic, e);
        }
    }

    if let Some(claim) = &watchers.claim {
        match serde_json::to_vec(&claim.value) {
            Ok(payload) => {
                if let Err(e) = client.try_publish(claim.key.clone(), QoS::AtLeastOnce, true, payload) {
                    warn!("Presence restore failed: {}", e);
                }
            }
            Err(e) => warn!("Presence encode failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_empty_payload_is_removal() {
        assert_eq!(decode_payload(&Bytes::new()), Some(Value::Null));
    }

    #[test]
    fn test_decode_json_payload() {
        let payload = Bytes::from_static(br#"{"x":30,"y":-10,"isBoosting":true}"#);
        assert_eq!(
            decode_payload(&payload),
            Some(json!({"x": 30, "y": -10, "isBoosting": true}))
        );
    }

    #[test]
    fn test_decode_garbage_payload() {
        assert_eq!(decode_payload(&Bytes::from_static(b"\xff\x00not json")), None);
    }

    #[test]
    fn test_dispatch_routes_by_topic() {
        let shared = Shared::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        shared
            .lock()
            .by_topic
            .insert("rooms/AB12/controller".into(), vec![(WatchId::new(1), tx)]);

        shared.dispatch("rooms/AB12/controller", &Bytes::from_static(b"{\"x\":1}"));
        shared.dispatch("rooms/ZZZZ/controller", &Bytes::from_static(b"{\"x\":2}"));
        shared.dispatch("rooms/AB12/controller", &Bytes::new());

        assert_eq!(rx.try_recv().unwrap(), json!({"x": 1}));
        assert_eq!(rx.try_recv().unwrap(), Value::Null);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_rejects_memory_endpoint() {
        let config = MqttStoreConfig {
            endpoint: Endpoint::parse("memory://local").unwrap(),
            client_id: "test".into(),
            keep_alive: Duration::from_secs(5),
            presence_key: None,
            username: None,
            password: None,
        };
        assert!(MqttStore::connect(config).is_err());
    }

    #[tokio::test]
    async fn test_set_before_connack_fails() {
        let config = MqttStoreConfig {
            endpoint: Endpoint::parse("mqtt://127.0.0.1:1").unwrap(),
            client_id: "test".into(),
            keep_alive: Duration::from_secs(5),
            presence_key: Some("rooms/AB12/status".into()),
            username: None,
            password: None,
        };
        let store = MqttStore::connect(config).unwrap();
        assert!(matches!(
            store.set("rooms/AB12/controller", json!({})),
            Err(AirBridgeError::TransportUnavailable(_))
        ));
        store.shutdown();
    }

    #[tokio::test]
    async fn test_watch_registered_before_first_delivery() {
        let config = MqttStoreConfig {
            endpoint: Endpoint::parse("mqtt://127.0.0.1:1").unwrap(),
            client_id: "test".into(),
            keep_alive: Duration::from_secs(5),
            presence_key: None,
            username: None,
            password: None,
        };
        let store = MqttStore::connect(config).unwrap();
        let mut watch = store.watch("rooms/AB12/controller", None).unwrap();

        // A retained replay dispatched right after the watch returns
        store
            .shared
            .dispatch("rooms/AB12/controller", &Bytes::from_static(b"{\"x\":30}"));
        assert_eq!(watch.receiver.try_recv().unwrap(), json!({"x": 30}));

        store.unwatch(watch.id);
        assert!(store.shared.lock().by_topic.is_empty());
        store.shutdown();
    }

    #[test]
    fn test_remove_watch_reports_emptied_topics() {
        let shared = Shared::default();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        shared.lock().by_topic.insert(
            "a".into(),
            vec![(WatchId::new(1), tx1), (WatchId::new(2), tx2)],
        );

        assert!(shared.remove_watch(WatchId::new(1)).is_empty());
        assert_eq!(shared.remove_watch(WatchId::new(2)), vec!["a".to_string()]);
        assert!(shared.lock().by_topic.is_empty());
    }

    // Requires a broker on localhost:1883
    #[tokio::test]
    #[ignore]
    async fn test_round_trip_with_real_broker() {
        let config = MqttStoreConfig {
            endpoint: Endpoint::parse("mqtt://localhost").unwrap(),
            client_id: "air-bridge-test".into(),
            keep_alive: Duration::from_secs(5),
            presence_key: None,
            username: None,
            password: None,
        };
        let store = MqttStore::connect(config).unwrap();
        let mut watch = store.watch("air-bridge/test", None).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        store.set("air-bridge/test", json!({"ok": true})).unwrap();
        let value = tokio::time::timeout(Duration::from_secs(2), watch.receiver.recv())
            .await
            .unwrap();
        assert_eq!(value, Some(json!({"ok": true})));
        store.shutdown();
    }
}
