//! Orientation samples and the axis pair carried between pipeline stages.

use std::ops::{Mul, Sub};
use std::time::Instant;

/// A single orientation reading from the device.
///
/// `roll` is the left/right tilt and `pitch` the front/back tilt, both in
/// degrees. Samples arrive at whatever rate the sensor produces them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    /// Left/right tilt in degrees.
    pub roll: f32,
    /// Front/back tilt in degrees.
    pub pitch: f32,
    /// When the sample was read.
    pub captured_at: Instant,
}

impl OrientationSample {
    /// Creates a sample stamped with the current time.
    ///
    /// # Examples
    ///
    /// ```
    /// use air_bridge::motion::OrientationSample;
    ///
    /// let sample = OrientationSample::new(12.0, -4.0);
    /// assert_eq!(sample.roll, 12.0);
    /// ```
    #[must_use]
    pub fn new(roll: f32, pitch: f32) -> Self {
        Self::at(roll, pitch, Instant::now())
    }

    /// Creates a sample with an explicit capture time.
    #[must_use]
    pub fn at(roll: f32, pitch: f32, captured_at: Instant) -> Self {
        Self {
            roll,
            pitch,
            captured_at,
        }
    }

    /// Returns the raw reading as an axis pair (`x` = roll, `y` = pitch).
    #[must_use]
    pub fn as_pair(&self) -> AxisPair {
        AxisPair::new(self.roll, self.pitch)
    }
}

/// Two-axis value passed between pipeline stages.
///
/// Before axis mapping `x`/`y` are roll/pitch; after mapping they are
/// steer/throttle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisPair {
    pub x: f32,
    pub y: f32,
}

impl AxisPair {
    /// Both axes at zero.
    pub const ZERO: AxisPair = AxisPair { x: 0.0, y: 0.0 };

    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Clamps both axes to `[-limit, limit]`.
    #[must_use]
    pub fn clamp(self, limit: f32) -> Self {
        Self::new(self.x.clamp(-limit, limit), self.y.clamp(-limit, limit))
    }
}

impl Sub for AxisPair {
    type Output = AxisPair;

    fn sub(self, rhs: AxisPair) -> AxisPair {
        AxisPair::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for AxisPair {
    type Output = AxisPair;

    fn mul(self, rhs: f32) -> AxisPair {
        AxisPair::new(self.x * rhs, self.y * rhs)
    }
}
