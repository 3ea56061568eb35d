//! # Air Bridge
//!
//! Steer a keyboard-driven game by tilting a motion controller.
//!
//! The binary runs one of two roles:
//!
//! - `controller`: reads tilt (or digital commands from stdin) and publishes
//!   control state to a room
//! - `host`: subscribes to a room and turns the received state into key
//!   events on a virtual keyboard
//!
//! # Usage
//!
//! ```text
//! air-bridge [--config <path>] controller <ROOM> [--motion] [--player <ID>]
//! air-bridge [--config <path>] host [ROOM] [--demo] [--dry-run] [--player <ID>]
//! ```
//!
//! Expected output:
//! ```text
//! INFO air_bridge: Air Bridge v0.1.0 starting...
//! INFO air_bridge: Hosting room K7Q2 on mqtt://localhost:1883
//! INFO air_bridge::sync::mqtt: Connected to MQTT broker
//! INFO air_bridge::session::host: Controller connected
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use air_bridge::actuation::uinput::{TracingSink, VirtualKeyboard};
use air_bridge::actuation::{BroadcastDiscovery, KeySink, KeySynthesizer};
use air_bridge::config::{Config, LoggingConfig, SyncConfig};
use air_bridge::input::demo::DEMO_INTERVAL;
use air_bridge::input::{InputModeArbiter, SecurityContext};
use air_bridge::motion::accelerometer::MotionSensor;
use air_bridge::motion::SensorStream;
use air_bridge::session::{
    ControllerCommand, ControllerSession, HostFeed, HostSession, SensorFactory,
};
use air_bridge::sync::endpoint::Scheme;
use air_bridge::sync::{
    join_room, transport, Endpoint, KvStore, MemoryStore, MqttStore, MqttStoreConfig, RoomId,
    SyncChannel,
};
use air_bridge::telemetry::{TelemetryHistory, TelemetryRecorder};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Steer a keyboard-driven game by tilting a motion controller.
#[derive(Parser, Debug, PartialEq)]
#[command(name = "air-bridge", version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to config/default.toml when present)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    role: Role,
}

/// Role selected on the command line.
#[derive(Subcommand, Debug, PartialEq)]
enum Role {
    /// Publish tilt or digital commands to a room
    Controller {
        /// Room id shown by the host
        #[arg(value_parser = RoomId::parse)]
        room: RoomId,

        /// Start in motion mode
        #[arg(long)]
        motion: bool,

        /// Join as a player instead of the room's controller
        #[arg(long, value_name = "ID")]
        player: Option<String>,
    },
    /// Turn a room's control state into key events
    Host {
        /// Room id (generated when omitted)
        #[arg(value_parser = RoomId::parse)]
        room: Option<RoomId>,

        /// Drive keys from a built-in pattern
        #[arg(long)]
        demo: bool,

        /// Log key events instead of creating a virtual keyboard
        #[arg(long)]
        dry_run: bool,

        /// Follow one player's key
        #[arg(long, value_name = "ID")]
        player: Option<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading {}", path.display())),
        None if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Config::load(DEFAULT_CONFIG_PATH).context("loading default config")
        }
        None => Ok(Config::default()),
    }
}

/// Console logging, plus a daily file when `log_dir` is set.
///
/// The returned guard must be held until exit so buffered lines are flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "air-bridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

/// Connects the configured store and installs it as the process transport.
///
/// Returns the MQTT store separately so it can be shut down cleanly.
fn connect_transport(
    sync: &SyncConfig,
    endpoint: &Endpoint,
    role: &str,
    presence_key: Option<String>,
) -> Result<(Arc<dyn KvStore>, Option<Arc<MqttStore>>)> {
    let mqtt = match endpoint.scheme() {
        Scheme::Memory => {
            transport::init(Arc::new(MemoryStore::new().connect()));
            None
        }
        Scheme::Mqtt | Scheme::Mqtts => {
            let client_id = if sync.client_id.is_empty() {
                format!("air-bridge-{}-{}", role, std::process::id())
            } else {
                sync.client_id.clone()
            };
            let store = Arc::new(MqttStore::connect(MqttStoreConfig {
                endpoint: endpoint.clone(),
                client_id,
                keep_alive: sync.keep_alive(),
                presence_key,
                username: sync.username.clone(),
                password: sync.password.clone(),
            })?);
            transport::init(Arc::clone(&store) as Arc<dyn KvStore>);
            Some(store)
        }
    };
    Ok((transport::handle(), mqtt))
}

/// Forwards stdin lines as controller commands.
async fn read_commands(tx: mpsc::Sender<ControllerCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match line.parse::<ControllerCommand>() {
                Ok(command) => {
                    if tx.send(command).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{}", e),
            },
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        }
    }
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down..."),
        Err(e) => {
            warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

async fn run_controller(
    config: &Config,
    room: RoomId,
    motion: bool,
    player: Option<String>,
) -> Result<()> {
    let endpoint = config.sync.endpoint()?;
    let security = SecurityContext::from_endpoint(&endpoint);
    if !security.is_secure() {
        warn!("{} is not encrypted, motion mode is disabled", endpoint);
    }

    let (store, mqtt) = connect_transport(&config.sync, &endpoint, "controller", None)?;
    let interval = config.sync.publish_interval();

    let channel = match player {
        Some(player_id) => {
            let slot = join_room(&store, &room, &player_id, config.sync.join_timeout()).await?;
            info!("Joining room {} as {} ({})", room, slot.player_id, slot.color);
            SyncChannel::player(store, room, &slot, interval)
        }
        None => {
            info!("Joining room {} on {}", room, endpoint);
            SyncChannel::controller(store, room, interval)
        }
    };

    let arbiter = InputModeArbiter::new(
        config.controller.params(),
        config.calibration.filter(),
        security,
    );

    let sensor = config.sensor.clone();
    let open_sensor: SensorFactory = Box::new(move || {
        let source = if sensor.device_path.is_empty() {
            MotionSensor::open()?
        } else {
            MotionSensor::open_path(&sensor.device_path)?
        };
        Ok(SensorStream::spawn(source, sensor.channel_capacity))
    });

    let mut session = ControllerSession::new(arbiter, channel, open_sensor, interval);
    if motion {
        if let Err(e) = session.enter_motion() {
            warn!("Starting in digital mode: {}", e);
        }
    }

    let (tx, mut rx) = mpsc::channel(32);
    tokio::spawn(read_commands(tx.clone()));
    tokio::spawn(async move {
        wait_for_ctrl_c().await;
        let _ = tx.send(ControllerCommand::Shutdown).await;
    });

    info!("Commands: mode, left, right, release, boost, boost off, recal, quit");
    session.run(&mut rx).await;

    if let Some(mqtt) = mqtt {
        mqtt.shutdown();
    }
    Ok(())
}

async fn drive_host<K: KeySink>(
    config: &Config,
    sink: K,
    feed: &mut HostFeed,
    label: &str,
) -> Result<()> {
    let synthesizer = KeySynthesizer::new(sink, BroadcastDiscovery, config.synthesizer.keys.clone());
    let mut session = HostSession::new(
        &config.host.params(),
        synthesizer,
        TelemetryHistory::new(config.telemetry.history_len),
        config.synthesizer.tick(),
    );

    if config.telemetry.enabled {
        let recorder = TelemetryRecorder::new(
            &config.telemetry.log_dir,
            label,
            config.telemetry.max_records_per_file,
            config.telemetry.max_files_to_keep,
        )?;
        session = session.with_recorder(recorder);
    }

    session.run(feed, wait_for_ctrl_c()).await;

    let history = session.history();
    info!(
        "Received {} states in the last window, boost {:.0}%",
        history.len(),
        history.boost_ratio() * 100.0
    );
    Ok(())
}

async fn run_host(
    config: &Config,
    room: Option<RoomId>,
    demo: bool,
    dry_run: bool,
    player: Option<String>,
) -> Result<()> {
    let room = room.unwrap_or_else(RoomId::generate);

    let (mut feed, mqtt, label) = if demo {
        info!("Running demo pattern, no controller needed");
        (HostFeed::demo(DEMO_INTERVAL), None, "DEMO".to_string())
    } else {
        let endpoint = config.sync.endpoint()?;
        // Only the room's primary host owns the status key
        let presence_key = player.is_none().then(|| room.status_key());
        let (store, mqtt) = connect_transport(&config.sync, &endpoint, "host", presence_key)?;

        let subscription = match &player {
            Some(player_id) => SyncChannel::subscribe_player(store, &room, player_id)?,
            None => SyncChannel::subscribe(store, &room)?,
        };
        info!("Hosting room {} on {}", room, endpoint);
        (HostFeed::Remote(subscription), mqtt, room.to_string())
    };

    let result = if dry_run {
        drive_host(config, TracingSink::new(), &mut feed, &label).await
    } else {
        let keyboard = VirtualKeyboard::create(&config.synthesizer.device_name)
            .context("creating virtual keyboard, try --dry-run")?;
        drive_host(config, keyboard, &mut feed, &label).await
    };

    drop(feed);
    if let Some(mqtt) = mqtt {
        mqtt.shutdown();
    }
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let _log_guard = init_logging(&config.logging);

    info!("Air Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.role {
        Role::Controller {
            room,
            motion,
            player,
        } => run_controller(&config, room, motion, player).await,
        Role::Host {
            room,
            demo,
            dry_run,
            player,
        } => run_host(&config, room, demo, dry_run, player).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("air-bridge").chain(line.split_whitespace()))
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_controller() {
        let cli = parse("controller ab12 --motion").unwrap();
        assert_eq!(cli.config, None);
        assert_eq!(
            cli.role,
            Role::Controller {
                room: RoomId::parse("AB12").unwrap(),
                motion: true,
                player: None,
            }
        );
    }

    #[test]
    fn test_parse_host_with_options() {
        let cli = parse("--config my.toml host --demo --dry-run").unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("my.toml")));
        assert_eq!(
            cli.role,
            Role::Host {
                room: None,
                demo: true,
                dry_run: true,
                player: None,
            }
        );
    }

    #[test]
    fn test_parse_config_after_role() {
        let cli = parse("host -c my.toml").unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("my.toml")));
    }

    #[test]
    fn test_parse_player() {
        let cli = parse("host K7Q2 --player p1").unwrap();
        match cli.role {
            Role::Host { room, player, .. } => {
                assert_eq!(room, Some(RoomId::parse("K7Q2").unwrap()));
                assert_eq!(player.as_deref(), Some("p1"));
            }
            other => panic!("unexpected role {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("controller").is_err());
        assert!(parse("controller AB").is_err());
        assert!(parse("referee AB12").is_err());
        assert!(parse("host AB12 --fast").is_err());
        assert!(parse("host AB12 extra").is_err());
        assert!(parse("host --config").is_err());
    }

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.sync.publish_interval_ms, 50);
    }
}
