//! # Calibration Module
//!
//! Removes per-session sensor bias and slow drift from raw orientation samples.
//!
//! ## Latching
//!
//! A freshly created filter is uncalibrated and passes samples through. The
//! first sample whose roll magnitude exceeds `epsilon` is taken as the rest
//! position: its value becomes the offset and the filter reports calibrated.
//! The latching sample itself therefore reads as zero.
//!
//! ## Drift Decay
//!
//! Once calibrated, the offset decays toward zero on every sample:
//!
//! `offset = offset * decay` (default decay 0.99 per sample)
//!
//! Decaying the offset corrects slow sensor drift. A tilt held for a long
//! time is also gradually reinterpreted as the new neutral position, so long
//! holds lose steering authority.
//!
//! ## Usage
//!
//! ```
//! use air_bridge::motion::{AxisPair, CalibrationFilter};
//!
//! let mut filter = CalibrationFilter::default();
//!
//! // First sample beyond epsilon latches as the rest position
//! let out = filter.calibrate(AxisPair::new(5.0, 2.0));
//! assert_eq!(out, AxisPair::ZERO);
//! assert!(filter.is_calibrated());
//! ```

use tracing::debug;

use super::sample::AxisPair;

/// Default roll magnitude that latches calibration.
pub const DEFAULT_EPSILON: f32 = 1.0;

/// Default per-sample decay factor applied to the offset.
pub const DEFAULT_DECAY: f32 = 0.99;

/// Bias captured by a [`CalibrationFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CalibrationState {
    /// Roll bias in degrees.
    pub offset_roll: f32,
    /// Pitch bias in degrees.
    pub offset_pitch: f32,
    /// Whether a rest position has been latched.
    pub is_calibrated: bool,
}

/// Latching, decaying bias filter for one session.
#[derive(Debug, Clone)]
pub struct CalibrationFilter {
    state: CalibrationState,
    epsilon: f32,
    decay: f32,
}

impl Default for CalibrationFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EPSILON, DEFAULT_DECAY)
    }
}

impl CalibrationFilter {
    /// Creates an uncalibrated filter.
    ///
    /// # Arguments
    ///
    /// * `epsilon` - Minimum roll magnitude that latches the offset. Negative values are clamped to 0.
    /// * `decay` - Per-sample offset decay factor (0.0 to 1.0). 1.0 disables decay.
    #[must_use]
    pub fn new(epsilon: f32, decay: f32) -> Self {
        Self {
            state: CalibrationState::default(),
            epsilon: epsilon.max(0.0),
            decay: decay.clamp(0.0, 1.0),
        }
    }

    /// Returns the current calibration state.
    #[must_use]
    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Returns true once a rest position has been latched.
    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.state.is_calibrated
    }

    /// Removes the current bias from a raw `(roll, pitch)` pair.
    ///
    /// # Arguments
    ///
    /// * `raw` - Raw reading with `x` = roll and `y` = pitch
    ///
    /// # Returns
    ///
    /// `raw - offset` per axis. Uncalibrated filters return `raw` unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use air_bridge::motion::{AxisPair, CalibrationFilter};
    ///
    /// let mut filter = CalibrationFilter::new(1.0, 0.99);
    ///
    /// // Below epsilon: passthrough, still uncalibrated
    /// assert_eq!(filter.calibrate(AxisPair::new(0.5, 3.0)), AxisPair::new(0.5, 3.0));
    /// assert!(!filter.is_calibrated());
    /// ```
    pub fn calibrate(&mut self, raw: AxisPair) -> AxisPair {
        if !self.state.is_calibrated {
            if raw.x.abs() <= self.epsilon {
                return raw;
            }
            self.state.offset_roll = raw.x;
            self.state.offset_pitch = raw.y;
            self.state.is_calibrated = true;
            debug!(
                "Calibration latched at roll={:.2} pitch={:.2}",
                raw.x, raw.y
            );
        }

        let calibrated = AxisPair::new(
            raw.x - self.state.offset_roll,
            raw.y - self.state.offset_pitch,
        );

        self.state.offset_roll *= self.decay;
        self.state.offset_pitch *= self.decay;

        calibrated
    }

    /// Clears the latch and zeroes the offset.
    ///
    /// Called on an explicit recalibration request and whenever the device
    /// changes orientation class.
    pub fn reset(&mut self) {
        self.state = CalibrationState::default();
        debug!("Calibration reset");
    }
}
