//! # Axis Mapper Module
//!
//! Chooses which raw sensor axes represent steering and throttle.
//!
//! ## Orientation Classes
//!
//! | Class | Steer | Throttle |
//! |-------|-------|----------|
//! | Portrait | gamma (roll) | beta (pitch) |
//! | Landscape | -beta (pitch, inverted) | gamma (roll) |
//!
//! The landscape steer axis is inverted so that pushing the top of the device
//! away steers the same visual direction as tilting it in portrait.
//!
//! The mapping is pure and recomputed for every sample; the orientation class
//! can change between any two samples.

use serde::{Deserialize, Serialize};

use super::sample::AxisPair;

/// Device grip derived from the viewport aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrientationClass {
    #[default]
    Portrait,
    Landscape,
}

impl OrientationClass {
    /// Classifies a viewport: wider than tall is landscape.
    ///
    /// # Examples
    ///
    /// ```
    /// use air_bridge::motion::OrientationClass;
    ///
    /// assert_eq!(OrientationClass::from_viewport(844, 390), OrientationClass::Landscape);
    /// assert_eq!(OrientationClass::from_viewport(390, 844), OrientationClass::Portrait);
    /// assert_eq!(OrientationClass::from_viewport(500, 500), OrientationClass::Portrait);
    /// ```
    #[must_use]
    pub fn from_viewport(width: u32, height: u32) -> Self {
        if width > height {
            Self::Landscape
        } else {
            Self::Portrait
        }
    }
}

/// Per-device sign quirks applied after the orientation mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AxisMapping {
    /// Flip the steer axis.
    #[serde(default)]
    pub invert_steer: bool,
    /// Flip the throttle axis.
    #[serde(default)]
    pub invert_throttle: bool,
}

/// Stateless raw-axis to steer/throttle mapper.
#[derive(Debug, Clone, Copy, Default)]
pub struct AxisMapper {
    mapping: AxisMapping,
}

impl AxisMapper {
    #[must_use]
    pub fn new(mapping: AxisMapping) -> Self {
        Self { mapping }
    }

    /// Returns the configured sign quirks.
    #[must_use]
    pub fn mapping(&self) -> AxisMapping {
        self.mapping
    }

    /// Maps raw gamma/beta to steer/throttle for the given orientation class.
    ///
    /// # Arguments
    ///
    /// * `gamma` - Left/right tilt (roll)
    /// * `beta` - Front/back tilt (pitch)
    /// * `class` - Current orientation class
    ///
    /// # Returns
    ///
    /// [`AxisPair`] with `x` = steer and `y` = throttle.
    ///
    /// # Examples
    ///
    /// ```
    /// use air_bridge::motion::{AxisMapper, AxisPair, OrientationClass};
    ///
    /// let mapper = AxisMapper::default();
    /// assert_eq!(mapper.map(10.0, 20.0, OrientationClass::Portrait), AxisPair::new(10.0, 20.0));
    /// assert_eq!(mapper.map(10.0, 20.0, OrientationClass::Landscape), AxisPair::new(-20.0, 10.0));
    /// ```
    #[must_use]
    pub fn map(&self, gamma: f32, beta: f32, class: OrientationClass) -> AxisPair {
        let (steer, throttle) = match class {
            OrientationClass::Portrait => (gamma, beta),
            OrientationClass::Landscape => (-beta, gamma),
        };

        AxisPair::new(
            if self.mapping.invert_steer { -steer } else { steer },
            if self.mapping.invert_throttle { -throttle } else { throttle },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_classification() {
        assert_eq!(OrientationClass::from_viewport(1920, 1080), OrientationClass::Landscape);
        assert_eq!(OrientationClass::from_viewport(1080, 1920), OrientationClass::Portrait);
        // Square counts as portrait
        assert_eq!(OrientationClass::from_viewport(800, 800), OrientationClass::Portrait);
    }

    #[test]
    fn test_portrait_passthrough() {
        let mapper = AxisMapper::default();
        let out = mapper.map(-15.0, 30.0, OrientationClass::Portrait);
        assert_eq!(out, AxisPair::new(-15.0, 30.0));
    }

    #[test]
    fn test_landscape_swaps_and_inverts_steer() {
        let mapper = AxisMapper::default();
        let out = mapper.map(-15.0, 30.0, OrientationClass::Landscape);
        assert_eq!(out, AxisPair::new(-30.0, -15.0));
    }

    #[test]
    fn test_sign_quirks() {
        let mapper = AxisMapper::new(AxisMapping {
            invert_steer: true,
            invert_throttle: true,
        });
        let out = mapper.map(5.0, 7.0, OrientationClass::Portrait);
        assert_eq!(out, AxisPair::new(-5.0, -7.0));

        let out = mapper.map(5.0, 7.0, OrientationClass::Landscape);
        assert_eq!(out, AxisPair::new(7.0, -5.0));
    }

    #[test]
    fn test_mapping_is_pure() {
        let mapper = AxisMapper::default();
        let a = mapper.map(3.0, 4.0, OrientationClass::Landscape);
        let _ = mapper.map(50.0, 50.0, OrientationClass::Portrait);
        let b = mapper.map(3.0, 4.0, OrientationClass::Landscape);
        assert_eq!(a, b);
    }

    #[test]
    fn test_orientation_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            class: OrientationClass,
        }
        let w: Wrapper = toml::from_str("class = \"landscape\"").unwrap();
        assert_eq!(w.class, OrientationClass::Landscape);
    }
}
