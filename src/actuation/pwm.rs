//! # PWM Discretizer
//!
//! Turns a continuous intensity in `[0, 1]` into an on/off signal per tick,
//! for surfaces that only understand held or released keys.
//!
//! ## Algorithm
//!
//! ```text
//! active_frames = round(intensity * cycle_length)
//! active        = counter < active_frames
//!              || (active_frames == 0 && intensity > min_fire && counter == 0)
//! counter       = (counter + 1) % cycle_length
//! ```
//!
//! The counter is compared before it is advanced, so the first tick of a
//! fresh discretizer is tick 0. With the default cycle of 6:
//!
//! | intensity | ticks 0..6          |
//! |-----------|---------------------|
//! | 0.5       | on on on off off off |
//! | 0.06      | on off off off off off |
//! | 0.0       | all off             |

/// Default ticks per cycle.
pub const DEFAULT_CYCLE_LENGTH: u32 = 6;

/// Default intensity above which at least one tick per cycle fires.
pub const DEFAULT_MIN_FIRE: f32 = 0.05;

/// Counter state of a discretizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PwmSchedule {
    /// Ticks per cycle.
    pub cycle_length: u32,
    /// Ticks per cycle that fire at the current intensity.
    pub active_frames: u32,
    /// Position within the cycle, `0..cycle_length`.
    pub frame_counter: u32,
}

/// Duty-cycle modulator.
#[derive(Debug, Clone)]
pub struct PwmDiscretizer {
    cycle_length: u32,
    min_fire: f32,
    intensity: f32,
    frame_counter: u32,
}

impl Default for PwmDiscretizer {
    fn default() -> Self {
        Self::new(DEFAULT_CYCLE_LENGTH, DEFAULT_MIN_FIRE)
    }
}

impl PwmDiscretizer {
    /// Creates a discretizer at zero intensity.
    ///
    /// A `cycle_length` of 0 is treated as 1.
    #[must_use]
    pub fn new(cycle_length: u32, min_fire: f32) -> Self {
        Self {
            cycle_length: cycle_length.max(1),
            min_fire: min_fire.max(0.0),
            intensity: 0.0,
            frame_counter: 0,
        }
    }

    /// Sets the intensity, clamped to `[0, 1]`. Non-finite values read as 0.
    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = if intensity.is_finite() {
            intensity.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// Returns the clamped intensity last set.
    #[must_use]
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Returns the current counter state.
    #[must_use]
    pub fn schedule(&self) -> PwmSchedule {
        PwmSchedule {
            cycle_length: self.cycle_length,
            active_frames: self.active_frames(),
            frame_counter: self.frame_counter,
        }
    }

    /// Advances one tick and returns whether the output is active on it.
    ///
    /// # Examples
    ///
    /// ```
    /// use air_bridge::actuation::PwmDiscretizer;
    ///
    /// let mut pwm = PwmDiscretizer::new(6, 0.05);
    /// pwm.set_intensity(0.5);
    /// let ticks: Vec<bool> = (0..6).map(|_| pwm.tick()).collect();
    /// assert_eq!(ticks, [true, true, true, false, false, false]);
    /// ```
    pub fn tick(&mut self) -> bool {
        let active_frames = self.active_frames();
        let active = self.frame_counter < active_frames
            || (active_frames == 0 && self.intensity > self.min_fire && self.frame_counter == 0);

        self.frame_counter = (self.frame_counter + 1) % self.cycle_length;
        active
    }

    /// Returns the counter to tick 0.
    pub fn reset(&mut self) {
        self.frame_counter = 0;
    }

    fn active_frames(&self) -> u32 {
        (self.intensity * self.cycle_length as f32).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticks(pwm: &mut PwmDiscretizer, n: usize) -> Vec<bool> {
        (0..n).map(|_| pwm.tick()).collect()
    }

    #[test]
    fn test_half_intensity_pattern_repeats() {
        let mut pwm = PwmDiscretizer::default();
        pwm.set_intensity(0.5);
        assert_eq!(
            ticks(&mut pwm, 12),
            [true, true, true, false, false, false, true, true, true, false, false, false]
        );
    }

    #[test]
    fn test_min_fire_once_per_cycle() {
        let mut pwm = PwmDiscretizer::default();
        pwm.set_intensity(0.06);
        assert_eq!(pwm.schedule().active_frames, 0);
        assert_eq!(
            ticks(&mut pwm, 12),
            [true, false, false, false, false, false, true, false, false, false, false, false]
        );
    }

    #[test]
    fn test_below_min_fire_never_fires() {
        let mut pwm = PwmDiscretizer::default();
        pwm.set_intensity(0.04);
        assert!(ticks(&mut pwm, 12).iter().all(|t| !t));
    }

    #[test]
    fn test_full_intensity_always_on() {
        let mut pwm = PwmDiscretizer::default();
        pwm.set_intensity(1.0);
        assert!(ticks(&mut pwm, 12).iter().all(|t| *t));
    }

    #[test]
    fn test_intensity_clamped() {
        let mut pwm = PwmDiscretizer::default();
        pwm.set_intensity(3.0);
        assert_eq!(pwm.intensity(), 1.0);
        pwm.set_intensity(f32::NAN);
        assert_eq!(pwm.intensity(), 0.0);
        pwm.set_intensity(-1.0);
        assert_eq!(pwm.intensity(), 0.0);
    }

    #[test]
    fn test_counter_wraps_and_resets() {
        let mut pwm = PwmDiscretizer::new(3, 0.05);
        ticks(&mut pwm, 4);
        assert_eq!(pwm.schedule().frame_counter, 1);
        pwm.reset();
        assert_eq!(pwm.schedule().frame_counter, 0);
    }

    #[test]
    fn test_zero_cycle_length() {
        let mut pwm = PwmDiscretizer::new(0, 0.05);
        pwm.set_intensity(1.0);
        assert!(pwm.tick());
        assert_eq!(pwm.schedule().cycle_length, 1);
    }
}
