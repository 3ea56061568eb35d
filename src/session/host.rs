//! # Host Session
//!
//! Receiving side of a room. Received states set the steering target; a
//! fixed-rate ticker drives smoothing, PWM and key synthesis:
//!
//! ```text
//! HostFeed (remote or demo) --> on_state --> history / recorder
//!                                   |
//!                                   v
//! tick (every tick_ms) --> ActuationPipeline --> KeySynthesizer --> KeySink
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::actuation::{ActuationPipeline, KeySink, KeySynthesizer, TargetDiscovery};
use crate::error::Result;
use crate::input::DemoSource;
use crate::motion::PipelineParams;
use crate::sync::{ControlState, Subscription};
use crate::telemetry::{TelemetryHistory, TelemetryRecorder};

/// Where the host gets its control states from.
#[derive(Debug)]
pub enum HostFeed {
    /// States published by a controller.
    Remote(Subscription),
    /// Locally generated pattern.
    Demo {
        source: DemoSource,
        period: Duration,
        ticker: Option<Interval>,
    },
}

impl HostFeed {
    #[must_use]
    pub fn demo(period: Duration) -> Self {
        Self::Demo {
            source: DemoSource::new(),
            period,
            ticker: None,
        }
    }

    /// Waits for the next state. `None` means the feed has ended.
    pub async fn next(&mut self) -> Option<ControlState> {
        match self {
            Self::Remote(subscription) => subscription.next().await,
            Self::Demo {
                source,
                period,
                ticker,
            } => {
                let ticker = ticker.get_or_insert_with(|| {
                    let mut interval = tokio::time::interval(*period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    interval
                });
                ticker.tick().await;
                Some(source.next_state())
            }
        }
    }
}

/// Host-side session state.
pub struct HostSession<K: KeySink, D: TargetDiscovery> {
    actuation: ActuationPipeline,
    synthesizer: KeySynthesizer<K, D>,
    history: TelemetryHistory,
    recorder: Option<TelemetryRecorder>,
    latest: Option<ControlState>,
    tick: Duration,
}

impl<K: KeySink, D: TargetDiscovery> std::fmt::Debug for HostSession<K, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSession")
            .field("synthesizer", &self.synthesizer)
            .field("latest", &self.latest)
            .field("history_len", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl<K: KeySink, D: TargetDiscovery> HostSession<K, D> {
    #[must_use]
    pub fn new(
        params: &PipelineParams,
        synthesizer: KeySynthesizer<K, D>,
        history: TelemetryHistory,
        tick: Duration,
    ) -> Self {
        Self {
            actuation: ActuationPipeline::new(params),
            synthesizer,
            history,
            recorder: None,
            latest: None,
            tick,
        }
    }

    /// Records every received state to disk.
    #[must_use]
    pub fn with_recorder(mut self, recorder: TelemetryRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn synthesizer(&self) -> &KeySynthesizer<K, D> {
        &self.synthesizer
    }

    pub fn history(&self) -> &TelemetryHistory {
        &self.history
    }

    /// Latest received state, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&ControlState> {
        self.latest.as_ref()
    }

    /// Accepts one received state as the new steering target.
    pub fn on_state(&mut self, state: ControlState) {
        if !self.history.is_connected() && state.is_live() {
            info!("Controller connected");
        }

        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(e) = recorder.record(&state) {
                warn!("Telemetry write failed: {}", e);
            }
        }

        self.actuation.set_target(state.x);
        self.history.push(state.clone());
        self.latest = Some(state);
    }

    /// Advances actuation by one tick.
    ///
    /// Does nothing until the first state has arrived.
    ///
    /// # Errors
    ///
    /// Returns the key sink's error; held keys are retried on the next tick.
    pub fn tick(&mut self) -> Result<()> {
        let Some(latest) = &self.latest else {
            return Ok(());
        };
        let boosting = latest.is_boosting;
        let (direction, _intensity) = self.actuation.step();
        self.synthesizer.apply(direction, boosting)
    }

    /// Releases every key and forgets the current target.
    pub fn release(&mut self) {
        if let Err(e) = self.synthesizer.release_all() {
            warn!("Failed to release keys: {}", e);
        }
        self.actuation.reset();
        self.latest = None;
    }

    /// Runs until `shutdown` resolves or the feed ends.
    ///
    /// Keys are released on exit.
    pub async fn run<F>(&mut self, feed: &mut HostFeed, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Host session started, tick {:?}", self.tick);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Host session stopping");
                    break;
                }
                state = feed.next() => match state {
                    Some(state) => self.on_state(state),
                    None => {
                        warn!("Control feed ended");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if let Err(e) = self.tick() {
                        debug!("Tick failed: {}", e);
                    }
                }
            }
        }

        self.release();
        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(e) = recorder.flush() {
                warn!("Telemetry flush failed: {}", e);
            }
        }
    }
}
