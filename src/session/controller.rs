//! # Controller Session
//!
//! Publishing side of a room. One task multiplexes sensor samples, user
//! commands and a publish heartbeat:
//!
//! ```text
//! sensor samples --\
//! commands --------+--> InputModeArbiter --> ControlState --> SyncChannel
//! heartbeat -------/                                  (re-publish if throttled)
//! ```
//!
//! The heartbeat re-sends the latest state when its publish was throttled or
//! failed, so a digital release that lands inside the throttle window still
//! reaches the host.

use std::str::FromStr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{AirBridgeError, Result};
use crate::input::{DigitalDirection, InputMode, InputModeArbiter};
use crate::motion::{AxisPair, OrientationClass, OrientationSample, SensorStream};
use crate::sync::{ControlState, PublishOutcome, SyncChannel};

/// Opens a sensor stream when Motion mode is requested.
pub type SensorFactory = Box<dyn FnMut() -> Result<SensorStream> + Send>;

/// User input to a controller session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerCommand {
    ToggleMode,
    SwitchToMotion,
    SwitchToDigital,
    Press(DigitalDirection),
    Release(DigitalDirection),
    Boost(bool),
    Recalibrate,
    Viewport { width: u32, height: u32 },
    Shutdown,
}

impl FromStr for ControllerCommand {
    type Err = AirBridgeError;

    /// Parses one line of user input.
    ///
    /// ```text
    /// mode | motion | digital
    /// left | right | release [left|right]
    /// boost | boost off
    /// recal
    /// viewport <width> <height>
    /// quit
    /// ```
    fn from_str(line: &str) -> Result<Self> {
        let words: Vec<String> = line
            .split_whitespace()
            .map(str::to_ascii_lowercase)
            .collect();
        let words: Vec<&str> = words.iter().map(String::as_str).collect();

        let command = match words.as_slice() {
            ["mode"] | ["toggle"] => Self::ToggleMode,
            ["motion"] => Self::SwitchToMotion,
            ["digital"] => Self::SwitchToDigital,
            ["left"] => Self::Press(DigitalDirection::Left),
            ["right"] => Self::Press(DigitalDirection::Right),
            ["release"] | ["release", "left"] => Self::Release(DigitalDirection::Left),
            ["release", "right"] => Self::Release(DigitalDirection::Right),
            ["boost"] | ["boost", "on"] => Self::Boost(true),
            ["boost", "off"] => Self::Boost(false),
            ["recal"] | ["recalibrate"] => Self::Recalibrate,
            ["viewport", w, h] => {
                let width = w.parse().map_err(|_| unknown(line))?;
                let height = h.parse().map_err(|_| unknown(line))?;
                Self::Viewport { width, height }
            }
            ["quit"] | ["exit"] => Self::Shutdown,
            _ => return Err(unknown(line)),
        };
        Ok(command)
    }
}

fn unknown(line: &str) -> AirBridgeError {
    AirBridgeError::ModeUnavailable(format!("unknown command '{}'", line.trim()))
}

/// Controller-side session state.
pub struct ControllerSession {
    arbiter: InputModeArbiter,
    channel: SyncChannel,
    open_sensor: SensorFactory,
    current: ControlState,
    pending: bool,
    heartbeat: Duration,
}

impl std::fmt::Debug for ControllerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerSession")
            .field("mode", &self.arbiter.mode())
            .field("channel", &self.channel)
            .field("current", &self.current)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl ControllerSession {
    /// Creates a session in Digital mode.
    ///
    /// # Arguments
    ///
    /// * `arbiter` - Input mode arbiter
    /// * `channel` - Publisher for the room
    /// * `open_sensor` - Called each time Motion mode is entered
    /// * `heartbeat` - Interval at which an unsent state is re-published
    #[must_use]
    pub fn new(
        arbiter: InputModeArbiter,
        channel: SyncChannel,
        open_sensor: SensorFactory,
        heartbeat: Duration,
    ) -> Self {
        Self {
            arbiter,
            channel,
            open_sensor,
            current: ControlState::default(),
            pending: false,
            heartbeat,
        }
    }

    pub fn arbiter(&self) -> &InputModeArbiter {
        &self.arbiter
    }

    /// Last state composed by this session.
    pub fn current(&self) -> &ControlState {
        &self.current
    }

    /// Returns true if the last composed state has not been accepted yet.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Feeds one sensor sample.
    ///
    /// Returns `None` when no Motion handler is attached; nothing is
    /// computed in that case.
    pub fn handle_sample(&mut self, sample: &OrientationSample) -> Option<PublishOutcome> {
        let axes = self.arbiter.on_sample(sample)?;
        Some(self.publish(axes, self.current.is_boosting))
    }

    /// Applies one command. Returns `false` once the session should stop.
    pub fn handle_command(&mut self, command: ControllerCommand) -> bool {
        debug!("Command: {:?}", command);
        match command {
            ControllerCommand::ToggleMode => match self.arbiter.mode() {
                InputMode::Motion => self.enter_digital(),
                InputMode::Digital => self.enter_motion_logged(),
            },
            ControllerCommand::SwitchToMotion => self.enter_motion_logged(),
            ControllerCommand::SwitchToDigital => self.enter_digital(),
            ControllerCommand::Press(direction) => {
                if let Some(axes) = self.arbiter.press(direction) {
                    self.publish(axes, self.current.is_boosting);
                }
            }
            ControllerCommand::Release(direction) => {
                if let Some(axes) = self.arbiter.release(direction) {
                    self.publish(axes, self.current.is_boosting);
                }
            }
            ControllerCommand::Boost(on) => {
                let axes = AxisPair::new(self.current.x, self.current.y);
                self.publish(axes, on);
            }
            ControllerCommand::Recalibrate => self.arbiter.recalibrate(),
            ControllerCommand::Viewport { width, height } => {
                self.arbiter
                    .set_orientation(OrientationClass::from_viewport(width, height));
            }
            ControllerCommand::Shutdown => return false,
        }
        true
    }

    /// Re-publishes the current state if its last publish did not go out.
    pub fn flush(&mut self) -> Option<PublishOutcome> {
        if !self.pending {
            return None;
        }
        let outcome = self.channel.publish(self.current.clone());
        self.pending = outcome != PublishOutcome::Sent;
        Some(outcome)
    }

    /// Attaches a sensor and enters Motion mode.
    ///
    /// # Errors
    ///
    /// Returns `InsecureContext` before any sensor is opened if the transport
    /// is insecure, or the sensor factory's error. The session stays in
    /// Digital mode on error.
    pub fn enter_motion(&mut self) -> Result<()> {
        if self.arbiter.mode() == InputMode::Motion {
            return Ok(());
        }
        self.arbiter.check_motion_allowed()?;
        let stream = (self.open_sensor)()?;
        self.arbiter.switch_to_motion(stream)
    }

    fn enter_motion_logged(&mut self) {
        if let Err(e) = self.enter_motion() {
            if e.is_terminal_for_motion() {
                warn!("Motion mode unavailable, staying in digital: {}", e);
            } else {
                warn!("Could not enter motion mode: {}", e);
            }
        }
    }

    fn enter_digital(&mut self) {
        if self.arbiter.mode() == InputMode::Digital {
            return;
        }
        self.arbiter.switch_to_digital();
        // Digital takes over as sole writer with nothing pressed
        self.publish(AxisPair::ZERO, self.current.is_boosting);
    }

    fn publish(&mut self, axes: AxisPair, boosting: bool) -> PublishOutcome {
        self.current = ControlState::new(axes.x, axes.y, boosting);
        let outcome = self.channel.publish(self.current.clone());
        self.pending = outcome != PublishOutcome::Sent;
        outcome
    }

    /// Runs until a `Shutdown` command or the command channel closes.
    ///
    /// On exit a neutral state is published so the host releases its keys.
    pub async fn run(&mut self, commands: &mut mpsc::Receiver<ControllerCommand>) {
        let mut heartbeat = tokio::time::interval(self.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Controller session started for room {}", self.channel.room());

        loop {
            tokio::select! {
                sample = self.arbiter.next_sample() => match sample {
                    Some(sample) => {
                        self.handle_sample(&sample);
                    }
                    None => warn!("Motion sensor stopped, switch to digital to continue"),
                },
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => break,
                },
                _ = heartbeat.tick() => {
                    self.flush();
                }
            }
        }

        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        info!("Controller session stopping");
        self.arbiter.switch_to_digital();
        if self.publish(AxisPair::ZERO, false) == PublishOutcome::Throttled {
            tokio::time::sleep(self.heartbeat).await;
            self.flush();
        }
    }
}
