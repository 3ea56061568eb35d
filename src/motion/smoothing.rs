//! # Smoothing & Deadzone Module
//!
//! ## Exponential Smoothing
//!
//! `smoothed = previous * (1 - alpha) + value * alpha`
//!
//! The result is clamped to `[-max_tilt, max_tilt]`. An `alpha` of 1.0
//! disables smoothing.
//!
//! ## Deadzone
//!
//! Converts a smoothed tilt into an intensity in `[0, 1]`:
//!
//! - `|value| <= threshold` maps to 0
//! - otherwise `(|value| - threshold) / (max_tilt - threshold)`, clamped
//!
//! ```
//! use air_bridge::motion::Deadzone;
//!
//! let deadzone = Deadzone::new(8.0, 45.0);
//! assert_eq!(deadzone.intensity(7.0), 0.0);
//! assert_eq!(deadzone.intensity(45.0), 1.0);
//! ```

/// Default smoothing factor.
pub const DEFAULT_SMOOTHING_ALPHA: f32 = 0.2;

/// Default deadzone threshold in degrees.
pub const DEFAULT_DEADZONE: f32 = 8.0;

/// Default saturation tilt in degrees.
pub const DEFAULT_MAX_TILT: f32 = 45.0;

/// One exponential smoothing step.
///
/// # Examples
///
/// ```
/// use air_bridge::motion::smooth;
///
/// assert!((smooth(100.0, 0.0, 0.2) - 20.0).abs() < 1e-4);
/// ```
#[must_use]
#[inline]
pub fn smooth(value: f32, previous: f32, alpha: f32) -> f32 {
    previous * (1.0 - alpha) + value * alpha
}

/// Stateful low-pass filter with output clamping.
#[derive(Debug, Clone)]
pub struct SmoothingFilter {
    alpha: f32,
    max_tilt: f32,
    smoothed: f32,
}

impl SmoothingFilter {
    /// Creates a filter starting from zero.
    ///
    /// # Arguments
    ///
    /// * `alpha` - Smoothing factor, clamped to (0.0, 1.0]
    /// * `max_tilt` - Output clamp magnitude
    #[must_use]
    pub fn new(alpha: f32, max_tilt: f32) -> Self {
        Self {
            alpha: alpha.clamp(f32::EPSILON, 1.0),
            max_tilt: max_tilt.abs(),
            smoothed: 0.0,
        }
    }

    /// Feeds one value and returns the new smoothed, clamped output.
    pub fn filter(&mut self, value: f32) -> f32 {
        let value = if value.is_finite() { value } else { self.smoothed };
        self.smoothed =
            smooth(value, self.smoothed, self.alpha).clamp(-self.max_tilt, self.max_tilt);
        self.smoothed
    }

    /// Returns the last output without feeding a value.
    #[must_use]
    pub fn value(&self) -> f32 {
        self.smoothed
    }

    /// Returns the filter back to zero.
    pub fn reset(&mut self) {
        self.smoothed = 0.0;
    }
}

/// Maps tilt magnitude to a `[0, 1]` intensity with a dead band around zero.
#[derive(Debug, Clone, Copy)]
pub struct Deadzone {
    threshold: f32,
    max_tilt: f32,
}

impl Deadzone {
    /// Creates a dead zone. Both bounds are taken as magnitudes.
    ///
    /// Tilts up to `threshold` read as 0, tilts from `max_tilt` on read as 1.
    ///
    /// # Examples
    ///
    /// ```
    /// use air_bridge::motion::Deadzone;
    ///
    /// let deadzone = Deadzone::new(-5.0, 60.0);
    /// assert_eq!(deadzone.threshold(), 5.0);
    /// assert_eq!(deadzone.intensity(4.0), 0.0);
    /// assert_eq!(deadzone.intensity(-60.0), 1.0);
    /// ```
    #[must_use]
    pub fn new(threshold: f32, max_tilt: f32) -> Self {
        Self {
            threshold: threshold.abs(),
            max_tilt: max_tilt.abs(),
        }
    }

    /// Returns the dead band half-width.
    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Computes the intensity of a tilt value.
    #[must_use]
    pub fn intensity(&self, value: f32) -> f32 {
        let magnitude = value.abs();
        if !magnitude.is_finite() || magnitude <= self.threshold {
            return 0.0;
        }

        let span = self.max_tilt - self.threshold;
        if span <= 0.0 {
            return 1.0;
        }

        ((magnitude - self.threshold) / span).clamp(0.0, 1.0)
    }
}
