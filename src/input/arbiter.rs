//! # Input Mode Arbiter
//!
//! Selects which source drives the controller's output.
//!
//! ```text
//!            switch_to_motion(stream)
//!   Digital ---------------------------> Motion
//!      ^                                   |
//!      +---------- switch_to_digital ------+
//! ```
//!
//! Exactly one source is active. The Motion state owns the sensor stream
//! and its pipeline, so leaving Motion drops both: the reader thread is
//! detached and no sample is processed afterwards. Digital input is ignored
//! while in Motion. Transitions happen only on explicit request.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::motion::{
    AxisPair, CalibrationFilter, MotionPipeline, OrientationClass, OrientationSample,
    PipelineParams, SensorStream,
};

use super::security::SecurityContext;

/// Where the controller's control state comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Tilt drives the control state.
    Motion,
    /// Direction buttons drive the control state.
    Digital,
}

/// Button currently held on the digital pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigitalDirection {
    #[default]
    Idle,
    Left,
    Right,
}

/// Two-button steering pad. Left and right are mutually exclusive.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigitalPad {
    direction: DigitalDirection,
}

impl DigitalPad {
    #[must_use]
    pub fn direction(&self) -> DigitalDirection {
        self.direction
    }

    /// Presses a direction, releasing the opposite one.
    pub fn press(&mut self, direction: DigitalDirection) {
        self.direction = direction;
    }

    /// Releases a direction if it is the one held.
    pub fn release(&mut self, direction: DigitalDirection) {
        if self.direction == direction {
            self.direction = DigitalDirection::Idle;
        }
    }

    /// Steering output at the given full-scale magnitude.
    #[must_use]
    pub fn value(&self, full_scale: f32) -> AxisPair {
        match self.direction {
            DigitalDirection::Idle => AxisPair::ZERO,
            DigitalDirection::Left => AxisPair::new(-full_scale, 0.0),
            DigitalDirection::Right => AxisPair::new(full_scale, 0.0),
        }
    }
}

#[derive(Debug)]
enum ActiveSource {
    Motion {
        // None once the sensor has ended
        stream: Option<SensorStream>,
        pipeline: MotionPipeline,
    },
    Digital(DigitalPad),
}

/// Owns the active input source.
#[derive(Debug)]
pub struct InputModeArbiter {
    active: ActiveSource,
    params: PipelineParams,
    calibration: CalibrationFilter,
    security: SecurityContext,
    orientation: OrientationClass,
}

impl InputModeArbiter {
    /// Creates an arbiter in Digital mode.
    ///
    /// # Arguments
    ///
    /// * `params` - Pipeline parameters for Motion mode
    /// * `calibration` - Calibration filter template, cloned per attach
    /// * `security` - Gate checked before any sensor is attached
    #[must_use]
    pub fn new(params: PipelineParams, calibration: CalibrationFilter, security: SecurityContext) -> Self {
        Self {
            active: ActiveSource::Digital(DigitalPad::default()),
            params,
            calibration,
            security,
            orientation: OrientationClass::default(),
        }
    }

    #[must_use]
    pub fn mode(&self) -> InputMode {
        match self.active {
            ActiveSource::Motion { .. } => InputMode::Motion,
            ActiveSource::Digital(_) => InputMode::Digital,
        }
    }

    /// Returns the held direction, or `None` in Motion mode.
    #[must_use]
    pub fn direction(&self) -> Option<DigitalDirection> {
        match &self.active {
            ActiveSource::Digital(pad) => Some(pad.direction()),
            ActiveSource::Motion { .. } => None,
        }
    }

    /// Checks whether Motion mode may be entered.
    ///
    /// Call before opening a sensor so that an insecure transport blocks
    /// acquisition instead of failing after it.
    ///
    /// # Errors
    ///
    /// Returns `InsecureContext` if the transport is not secure.
    pub fn check_motion_allowed(&self) -> Result<()> {
        self.security.require_secure()
    }

    /// Attaches a sensor stream and enters Motion mode.
    ///
    /// Any previously attached stream is dropped.
    ///
    /// # Errors
    ///
    /// Returns `InsecureContext` if the transport is not secure; the stream
    /// is dropped and the mode is unchanged.
    pub fn switch_to_motion(&mut self, stream: SensorStream) -> Result<()> {
        self.check_motion_allowed()?;

        let mut pipeline = MotionPipeline::new(self.params, self.calibration.clone());
        pipeline.set_orientation(self.orientation);

        self.active = ActiveSource::Motion {
            stream: Some(stream),
            pipeline,
        };
        info!("Input mode: motion");
        Ok(())
    }

    /// Detaches the sensor and enters Digital mode with nothing pressed.
    pub fn switch_to_digital(&mut self) {
        if matches!(self.active, ActiveSource::Motion { .. }) {
            self.active = ActiveSource::Digital(DigitalPad::default());
            info!("Input mode: digital");
        }
    }

    /// Processes a motion sample. Returns `None` outside Motion mode.
    pub fn on_sample(&mut self, sample: &OrientationSample) -> Option<AxisPair> {
        match &mut self.active {
            ActiveSource::Motion { pipeline, .. } => Some(pipeline.process(sample).axes),
            ActiveSource::Digital(_) => None,
        }
    }

    /// Presses a digital direction. Returns `None` outside Digital mode.
    pub fn press(&mut self, direction: DigitalDirection) -> Option<AxisPair> {
        let full_scale = self.full_scale();
        match &mut self.active {
            ActiveSource::Digital(pad) => {
                pad.press(direction);
                Some(pad.value(full_scale))
            }
            ActiveSource::Motion { .. } => {
                debug!("Ignoring digital press in motion mode");
                None
            }
        }
    }

    /// Releases a digital direction. Returns `None` outside Digital mode.
    pub fn release(&mut self, direction: DigitalDirection) -> Option<AxisPair> {
        let full_scale = self.full_scale();
        match &mut self.active {
            ActiveSource::Digital(pad) => {
                pad.release(direction);
                Some(pad.value(full_scale))
            }
            ActiveSource::Motion { .. } => None,
        }
    }

    /// Waits for the next sample from the attached sensor.
    ///
    /// Never resolves in Digital mode or after the sensor has ended.
    /// Returns `None` exactly once when the sensor ends; Motion mode stays
    /// selected until the user switches.
    pub async fn next_sample(&mut self) -> Option<OrientationSample> {
        if let ActiveSource::Motion { stream, .. } = &mut self.active {
            if let Some(active) = stream {
                let sample = active.recv().await;
                if sample.is_none() {
                    warn!("Motion sensor ended");
                    *stream = None;
                }
                return sample;
            }
        }
        std::future::pending().await
    }

    /// Updates the grip orientation used by Motion mode.
    pub fn set_orientation(&mut self, class: OrientationClass) {
        self.orientation = class;
        if let ActiveSource::Motion { pipeline, .. } = &mut self.active {
            pipeline.set_orientation(class);
        }
    }

    /// Re-latches the rest position on the next sample.
    pub fn recalibrate(&mut self) {
        if let ActiveSource::Motion { pipeline, .. } = &mut self.active {
            pipeline.recalibrate();
            info!("Recalibrating on next sample");
        }
    }

    /// Digital output magnitude.
    fn full_scale(&self) -> f32 {
        self.params.max_tilt
    }
}
