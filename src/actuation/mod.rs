//! # Actuation Module
//!
//! Host-side conversion of received control states into key events.
//!
//! ```text
//! ControlState.x -> SmoothingFilter -> Deadzone -> PwmDiscretizer -> SteerDirection
//! ControlState.is_boosting ------------------------------------------> boost keys
//! ```

pub mod keys;
pub mod pwm;
pub mod synthesizer;
pub mod target;
pub mod uinput;

pub use keys::{KeyBindings, KeyCode};
pub use pwm::{PwmDiscretizer, PwmSchedule};
pub use synthesizer::{KeySink, KeySynthesizer, SteerDirection};
pub use target::{BroadcastDiscovery, FixedDiscovery, Surface, Target, TargetDiscovery};

use crate::motion::{Deadzone, PipelineParams, SmoothingFilter};

/// Per-tick steering computation on the host.
#[derive(Debug, Clone)]
pub struct ActuationPipeline {
    smoothing: SmoothingFilter,
    deadzone: Deadzone,
    pwm: PwmDiscretizer,
    target_x: f32,
}

impl ActuationPipeline {
    #[must_use]
    pub fn new(params: &PipelineParams) -> Self {
        Self {
            smoothing: SmoothingFilter::new(params.smoothing_alpha, params.max_tilt),
            deadzone: Deadzone::new(params.deadzone, params.max_tilt),
            pwm: PwmDiscretizer::new(params.pwm_cycle_length, params.pwm_min_fire),
            target_x: 0.0,
        }
    }

    /// Sets the steering value the pipeline converges on.
    pub fn set_target(&mut self, x: f32) {
        self.target_x = x;
    }

    /// Advances one tick.
    ///
    /// # Returns
    ///
    /// The direction to hold on this tick and the current intensity.
    ///
    /// # Examples
    ///
    /// ```
    /// use air_bridge::actuation::{ActuationPipeline, SteerDirection};
    /// use air_bridge::motion::PipelinePreset;
    ///
    /// let mut pipeline = ActuationPipeline::new(&PipelinePreset::Controller.params());
    /// pipeline.set_target(-60.0);
    /// assert_eq!(pipeline.step().0, SteerDirection::Left);
    /// ```
    pub fn step(&mut self) -> (SteerDirection, f32) {
        let smoothed = self.smoothing.filter(self.target_x);
        let intensity = self.deadzone.intensity(smoothed);
        self.pwm.set_intensity(intensity);

        let direction = match (self.pwm.tick(), smoothed) {
            (true, x) if x < 0.0 => SteerDirection::Left,
            (true, x) if x > 0.0 => SteerDirection::Right,
            _ => SteerDirection::Center,
        };
        (direction, intensity)
    }

    /// Drops smoothing history and the PWM phase.
    pub fn reset(&mut self) {
        self.smoothing.reset();
        self.pwm.reset();
        self.target_x = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::PipelinePreset;

    #[test]
    fn test_centered_input_holds_nothing() {
        let mut pipeline = ActuationPipeline::new(&PipelinePreset::Extension.params());
        for _ in 0..12 {
            assert_eq!(pipeline.step(), (SteerDirection::Center, 0.0));
        }
    }

    #[test]
    fn test_full_right_after_convergence() {
        let mut pipeline = ActuationPipeline::new(&PipelinePreset::Extension.params());
        pipeline.set_target(45.0);
        for _ in 0..60 {
            pipeline.step();
        }
        let ticks: Vec<_> = (0..6).map(|_| pipeline.step().0).collect();
        assert!(ticks.iter().all(|d| *d == SteerDirection::Right));
    }

    #[test]
    fn test_partial_tilt_is_duty_cycled() {
        let mut pipeline = ActuationPipeline::new(&PipelinePreset::Controller.params());
        // Controller preset: no smoothing, no deadzone, saturates at 60
        pipeline.set_target(-30.0);
        let ticks: Vec<_> = (0..6).map(|_| pipeline.step().0).collect();
        assert_eq!(
            ticks,
            [
                SteerDirection::Left,
                SteerDirection::Left,
                SteerDirection::Left,
                SteerDirection::Center,
                SteerDirection::Center,
                SteerDirection::Center
            ]
        );
    }

    #[test]
    fn test_reset() {
        let mut pipeline = ActuationPipeline::new(&PipelinePreset::Controller.params());
        pipeline.set_target(60.0);
        pipeline.step();
        pipeline.reset();
        assert_eq!(pipeline.step().0, SteerDirection::Center);
    }
}
