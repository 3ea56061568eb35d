//! End-to-end tests: controller session -> in-memory store -> host session.

use std::sync::{Arc, Mutex};
use std::thread::sleep;
use std::time::Duration;

use air_bridge::actuation::{BroadcastDiscovery, KeyBindings, KeyCode, KeySink, KeySynthesizer, Target};
use air_bridge::error::{AirBridgeError, Result};
use air_bridge::input::{DigitalDirection, InputMode, InputModeArbiter, SecurityContext};
use air_bridge::motion::{CalibrationFilter, OrientationSample, PipelinePreset, SensorStream};
use air_bridge::session::{ControllerCommand, ControllerSession, HostSession, SensorFactory};
use air_bridge::sync::{
    join_room, ControlState, KvStore, MemoryStore, PlayerRoster, PresenceStatus, PublishOutcome,
    RoomId, SessionPresence, SyncChannel,
};
use air_bridge::telemetry::TelemetryHistory;
use tokio::sync::mpsc;

const INTERVAL: Duration = Duration::from_millis(50);

/// Records key transitions into a shared log.
#[derive(Clone, Default)]
struct SharedSink {
    events: Arc<Mutex<Vec<(KeyCode, bool)>>>,
}

impl SharedSink {
    fn events(&self) -> Vec<(KeyCode, bool)> {
        self.events.lock().unwrap().clone()
    }
}

impl KeySink for SharedSink {
    fn key(&mut self, key: KeyCode, down: bool) -> Result<()> {
        self.events.lock().unwrap().push((key, down));
        Ok(())
    }

    fn acquire_focus(&mut self, _target: &Target) -> Result<()> {
        Ok(())
    }

    fn wake_burst(&mut self, _target: &Target) -> Result<()> {
        Ok(())
    }
}

fn room() -> RoomId {
    RoomId::parse("K7Q2").unwrap()
}

fn controller(store: &MemoryStore, open_sensor: SensorFactory) -> ControllerSession {
    let arbiter = InputModeArbiter::new(
        PipelinePreset::Controller.params(),
        CalibrationFilter::new(1.0, 1.0),
        SecurityContext::Secure,
    );
    let channel = SyncChannel::controller(Arc::new(store.connect()), room(), INTERVAL);
    ControllerSession::new(arbiter, channel, open_sensor, INTERVAL)
}

fn host(sink: SharedSink) -> HostSession<SharedSink, BroadcastDiscovery> {
    HostSession::new(
        &PipelinePreset::Controller.params(),
        KeySynthesizer::new(sink, BroadcastDiscovery, KeyBindings::default()),
        TelemetryHistory::default(),
        Duration::from_millis(16),
    )
}

fn scripted_sensor() -> (mpsc::Sender<OrientationSample>, SensorFactory) {
    let (tx, rx) = mpsc::channel(16);
    let mut rx = Some(rx);
    let factory: SensorFactory = Box::new(move || {
        rx.take()
            .map(SensorStream::from_receiver)
            .ok_or(AirBridgeError::SensorNotFound)
    });
    (tx, factory)
}

fn status(store: &MemoryStore) -> Option<PresenceStatus> {
    store
        .get(&room().status_key())
        .map(|value| SessionPresence::from_value(value).unwrap().status)
}

// ==================== Controller To Host Tests ====================

#[test]
fn test_digital_press_reaches_host_keys() {
    let store = MemoryStore::new();
    let mut subscription = SyncChannel::subscribe(Arc::new(store.connect()), &room()).unwrap();
    let mut controller = controller(&store, Box::new(|| Err(AirBridgeError::SensorNotFound)));
    let sink = SharedSink::default();
    let mut host = host(sink.clone());

    controller.handle_command(ControllerCommand::Press(DigitalDirection::Left));
    controller.handle_command(ControllerCommand::Boost(true));

    while let Some(state) = subscription.try_next() {
        host.on_state(state);
    }
    host.tick().unwrap();

    assert!(host.synthesizer().is_held(KeyCode::A));
    assert!(host.synthesizer().is_held(KeyCode::Space));
    assert!(host.history().is_connected());
    assert!(sink.events().contains(&(KeyCode::Left, true)));

    sleep(INTERVAL);
    controller.handle_command(ControllerCommand::Release(DigitalDirection::Left));
    controller.handle_command(ControllerCommand::Boost(false));
    while let Some(state) = subscription.try_next() {
        host.on_state(state);
    }
    host.tick().unwrap();

    assert!(!host.synthesizer().is_held(KeyCode::A));
    assert!(!host.synthesizer().is_held(KeyCode::Space));
}

#[test]
fn test_motion_tilt_reaches_host_keys() {
    let store = MemoryStore::new();
    let mut subscription = SyncChannel::subscribe(Arc::new(store.connect()), &room()).unwrap();
    let (_tx, factory) = scripted_sensor();
    let mut controller = controller(&store, factory);
    let mut host = host(SharedSink::default());

    controller.enter_motion().unwrap();
    controller.handle_sample(&OrientationSample::new(4.0, 0.0));
    sleep(INTERVAL);
    controller.handle_sample(&OrientationSample::new(64.0, 0.0));

    while let Some(state) = subscription.try_next() {
        host.on_state(state);
    }
    assert_eq!(host.latest().map(|s| s.x), Some(60.0));

    host.tick().unwrap();
    assert!(host.synthesizer().is_held(KeyCode::D));
    assert!(!host.synthesizer().is_held(KeyCode::A));
}

#[test]
fn test_switch_to_digital_stops_motion_publishes() {
    let store = MemoryStore::new();
    let (tx, factory) = scripted_sensor();
    let mut controller = controller(&store, factory);

    controller.enter_motion().unwrap();
    controller.handle_sample(&OrientationSample::new(5.0, 0.0));
    sleep(INTERVAL);
    controller.handle_command(ControllerCommand::SwitchToDigital);
    assert_eq!(controller.arbiter().mode(), InputMode::Digital);

    // The sensor is detached and later samples are not processed
    assert!(tx.try_send(OrientationSample::new(40.0, 0.0)).is_err());
    assert!(controller
        .handle_sample(&OrientationSample::new(40.0, 0.0))
        .is_none());

    let stored = ControlState::from_value(store.get(&room().controller_key()).unwrap()).unwrap();
    assert_eq!(stored.x, 0.0);
}

// ==================== Presence Tests ====================

#[test]
fn test_presence_lifecycle() {
    let store = MemoryStore::new();
    let subscription = SyncChannel::subscribe(Arc::new(store.connect()), &room()).unwrap();
    assert_eq!(status(&store), Some(PresenceStatus::Waiting));

    let mut publisher = SyncChannel::controller(Arc::new(store.connect()), room(), INTERVAL);
    assert_eq!(
        publisher.publish(ControlState::new(1.0, 0.0, false)),
        PublishOutcome::Sent
    );
    assert_eq!(status(&store), Some(PresenceStatus::Connected));

    // Host connection goes away: status is cleaned up, controller key stays
    drop(subscription);
    assert_eq!(status(&store), None);
    assert!(store.get(&room().controller_key()).is_some());
}

#[test]
fn test_late_subscriber_gets_latest_state() {
    let store = MemoryStore::new();
    let mut publisher = SyncChannel::controller(Arc::new(store.connect()), room(), INTERVAL);
    publisher.publish(ControlState::new(-12.5, 3.0, true));

    let mut subscription = SyncChannel::subscribe(Arc::new(store.connect()), &room()).unwrap();
    let state = subscription.try_next().unwrap();
    assert_eq!(state.x, -12.5);
    assert_eq!(state.y, 3.0);
    assert!(state.is_boosting);
    assert!(state.is_live());
}

#[test]
fn test_boost_edge_round_trip_inside_throttle_window() {
    let store = MemoryStore::new();
    let mut publisher = SyncChannel::controller(Arc::new(store.connect()), room(), INTERVAL);
    publisher.publish(ControlState::new(0.0, 0.0, false));
    assert_eq!(
        publisher.publish(ControlState::new(30.0, -10.0, true)),
        PublishOutcome::Sent
    );

    let mut subscription = SyncChannel::subscribe(Arc::new(store.connect()), &room()).unwrap();
    let state = subscription.try_next().unwrap();
    assert_eq!((state.x, state.y, state.is_boosting), (30.0, -10.0, true));
}

#[test]
fn test_burst_within_interval_is_throttled() {
    let store = MemoryStore::new();
    let mut subscription = SyncChannel::subscribe(Arc::new(store.connect()), &room()).unwrap();
    let mut publisher = SyncChannel::controller(Arc::new(store.connect()), room(), INTERVAL);

    let outcomes: Vec<_> = (0..5)
        .map(|i| publisher.publish(ControlState::new(i as f32, 0.0, false)))
        .collect();
    assert_eq!(outcomes[0], PublishOutcome::Sent);
    assert!(outcomes[1..].iter().all(|o| *o == PublishOutcome::Throttled));

    let mut received = Vec::new();
    while let Some(state) = subscription.try_next() {
        received.push(state.x);
    }
    assert_eq!(received, vec![0.0]);
}

// ==================== Multiplayer Tests ====================

#[test]
fn test_players_publish_to_disjoint_keys() {
    let store = MemoryStore::new();
    let mut roster = PlayerRoster::new();
    let red = roster.join("p1");
    let blue = roster.join("p2");
    assert_ne!(red.color, blue.color);

    let mut first = SyncChannel::player(Arc::new(store.connect()), room(), &red, INTERVAL);
    let mut second = SyncChannel::player(Arc::new(store.connect()), room(), &blue, INTERVAL);
    let mut watch_second =
        SyncChannel::subscribe_player(Arc::new(store.connect()), &room(), "p2").unwrap();

    first.publish(ControlState::new(10.0, 0.0, false));
    second.publish(ControlState::new(-10.0, 0.0, true));

    let state = watch_second.try_next().unwrap();
    assert_eq!(state.x, -10.0);
    assert_eq!(state.owner_id.as_deref(), Some("p2"));
    assert_eq!(state.color.as_deref(), Some(blue.color.as_str()));
    assert!(watch_second.try_next().is_none());
}

#[tokio::test]
async fn test_separate_controllers_get_distinct_colors() {
    let store = MemoryStore::new();
    let join_timeout = Duration::from_millis(20);

    let first_conn: Arc<dyn KvStore> = Arc::new(store.connect());
    let second_conn: Arc<dyn KvStore> = Arc::new(store.connect());
    let red = join_room(&first_conn, &room(), "p1", join_timeout).await.unwrap();
    let blue = join_room(&second_conn, &room(), "p2", join_timeout).await.unwrap();

    let mut first = SyncChannel::player(first_conn, room(), &red, INTERVAL);
    let mut second = SyncChannel::player(second_conn, room(), &blue, INTERVAL);
    first.publish(ControlState::new(5.0, 0.0, false));
    second.publish(ControlState::new(-5.0, 0.0, false));

    let stored_color = |player: &str| {
        ControlState::from_value(store.get(&room().player_key(player)).unwrap())
            .unwrap()
            .color
    };
    let red_stored = stored_color("p1");
    let blue_stored = stored_color("p2");
    assert!(red_stored.is_some());
    assert_ne!(red_stored, blue_stored);

    let roster = PlayerRoster::from_value(store.get(&room().roster_key()).unwrap()).unwrap();
    assert_eq!(roster.len(), 2);
}

// ==================== Session Loop Tests ====================

#[tokio::test]
async fn test_sessions_run_together() {
    let store = MemoryStore::new();
    let subscription = SyncChannel::subscribe(Arc::new(store.connect()), &room()).unwrap();
    let mut controller = controller(&store, Box::new(|| Err(AirBridgeError::SensorNotFound)));
    let sink = SharedSink::default();
    let mut host = host(sink.clone());

    let (tx, mut rx) = mpsc::channel(8);
    let controller_task = tokio::spawn(async move {
        controller.run(&mut rx).await;
        controller
    });

    let host_task = tokio::spawn(async move {
        let mut feed = air_bridge::session::HostFeed::Remote(subscription);
        host.run(&mut feed, tokio::time::sleep(Duration::from_millis(300)))
            .await;
        host
    });

    tx.send(ControllerCommand::Press(DigitalDirection::Right))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(ControllerCommand::Shutdown).await.unwrap();

    let controller = controller_task.await.unwrap();
    let host = host_task.await.unwrap();

    assert_eq!(controller.current().x, 0.0);
    assert!(sink.events().contains(&(KeyCode::D, true)));
    assert!(!host.synthesizer().is_held(KeyCode::D));
}
