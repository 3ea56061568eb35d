//! # Motion Pipeline Module
//!
//! One parameterized pipeline replacing the per-screen variants:
//!
//! ```text
//! sample -> CalibrationFilter -> AxisMapper -> SmoothingFilter (x, y) -> steer/throttle
//! ```
//!
//! Variants differ only in [`PipelineParams`] (smoothing factor, deadzone,
//! saturation tilt, PWM cycle, axis quirks). [`PipelinePreset`] names the
//! known variants.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::axis::{AxisMapper, AxisMapping, OrientationClass};
use super::calibration::CalibrationFilter;
use super::sample::{AxisPair, OrientationSample};
use super::smoothing::{Deadzone, SmoothingFilter};

/// Absolute steering/throttle range carried in a control state.
pub const CONTROL_RANGE: f32 = 60.0;

/// Resolved pipeline parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineParams {
    /// Exponential smoothing factor (0, 1].
    pub smoothing_alpha: f32,
    /// Deadzone half-width in degrees.
    pub deadzone: f32,
    /// Saturation tilt in degrees.
    pub max_tilt: f32,
    /// PWM cycle length in ticks.
    pub pwm_cycle_length: u32,
    /// Minimum intensity that always fires at least once per cycle.
    pub pwm_min_fire: f32,
    /// Sign quirks applied after orientation mapping.
    pub axis_mapping: AxisMapping,
}

/// Named pipeline variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelinePreset {
    /// Phone-side publisher: unsmoothed, clamped to the full control range.
    #[default]
    Controller,
    /// Keyboard-surface consumer: smoothed, 8 degree deadzone, saturates at 45.
    Extension,
}

impl PipelinePreset {
    /// Returns the parameters of this variant.
    ///
    /// # Examples
    ///
    /// ```
    /// use air_bridge::motion::PipelinePreset;
    ///
    /// let params = PipelinePreset::Extension.params();
    /// assert_eq!(params.pwm_cycle_length, 6);
    /// assert_eq!(params.max_tilt, 45.0);
    /// ```
    #[must_use]
    pub fn params(self) -> PipelineParams {
        match self {
            Self::Controller => PipelineParams {
                smoothing_alpha: 1.0,
                deadzone: 0.0,
                max_tilt: CONTROL_RANGE,
                pwm_cycle_length: 6,
                pwm_min_fire: 0.05,
                axis_mapping: AxisMapping::default(),
            },
            Self::Extension => PipelineParams {
                smoothing_alpha: 0.2,
                deadzone: 8.0,
                max_tilt: 45.0,
                pwm_cycle_length: 6,
                pwm_min_fire: 0.05,
                axis_mapping: AxisMapping::default(),
            },
        }
    }
}

/// Output of one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringOutput {
    /// Smoothed steer/throttle pair.
    pub axes: AxisPair,
    /// Deadzone intensity of the steer axis.
    pub intensity: f32,
}

/// Controller-side motion pipeline for one session.
///
/// Owns its calibration and smoothing state exclusively; every method takes
/// `&mut self` and no locking is involved.
#[derive(Debug, Clone)]
pub struct MotionPipeline {
    calibration: CalibrationFilter,
    mapper: AxisMapper,
    steer: SmoothingFilter,
    throttle: SmoothingFilter,
    deadzone: Deadzone,
    orientation: OrientationClass,
}

impl MotionPipeline {
    /// Builds a pipeline from resolved parameters and a calibration filter.
    #[must_use]
    pub fn new(params: PipelineParams, calibration: CalibrationFilter) -> Self {
        let max_tilt = params.max_tilt.min(CONTROL_RANGE);
        Self {
            calibration,
            mapper: AxisMapper::new(params.axis_mapping),
            steer: SmoothingFilter::new(params.smoothing_alpha, max_tilt),
            throttle: SmoothingFilter::new(params.smoothing_alpha, max_tilt),
            deadzone: Deadzone::new(params.deadzone, max_tilt),
            orientation: OrientationClass::default(),
        }
    }

    /// Returns the orientation class samples are currently mapped with.
    #[must_use]
    pub fn orientation(&self) -> OrientationClass {
        self.orientation
    }

    /// Returns true once the calibration filter has latched.
    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_calibrated()
    }

    /// Updates the orientation class.
    ///
    /// A change of class resets calibration and smoothing, since the old
    /// rest position belongs to the other grip.
    pub fn set_orientation(&mut self, class: OrientationClass) {
        if class != self.orientation {
            info!("Orientation changed to {:?}, recalibrating", class);
            self.orientation = class;
            self.recalibrate();
        }
    }

    /// Drops the latched rest position and the smoothing history.
    pub fn recalibrate(&mut self) {
        self.calibration.reset();
        self.steer.reset();
        self.throttle.reset();
    }

    /// Runs one sample through calibration, mapping and smoothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use air_bridge::motion::{CalibrationFilter, MotionPipeline, OrientationSample, PipelinePreset};
    ///
    /// let mut pipeline = MotionPipeline::new(PipelinePreset::Controller.params(), CalibrationFilter::default());
    ///
    /// // First sample latches the rest position
    /// let out = pipeline.process(&OrientationSample::new(4.0, 2.0));
    /// assert_eq!(out.axes.x, 0.0);
    /// ```
    pub fn process(&mut self, sample: &OrientationSample) -> SteeringOutput {
        let calibrated = self.calibration.calibrate(sample.as_pair());
        let mapped = self
            .mapper
            .map(calibrated.x, calibrated.y, self.orientation);

        let axes = AxisPair::new(self.steer.filter(mapped.x), self.throttle.filter(mapped.y));

        SteeringOutput {
            axes,
            intensity: self.deadzone.intensity(axes.x),
        }
    }
}
