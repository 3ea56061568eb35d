//! Synthetic control source for running the host without a controller.
//!
//! ```text
//! x = 30 * sin(t)
//! y = 15 * cos(t / 2)
//! boost while sin(3t) > 0.8
//! ```
//!
//! `t` advances by 0.05 per step; the host steps it every 50ms.

use std::time::Duration;

use crate::sync::ControlState;

/// Recommended spacing between demo steps.
pub const DEMO_INTERVAL: Duration = Duration::from_millis(50);

const TIME_STEP: f32 = 0.05;

/// Generates a smooth, repeating control pattern.
#[derive(Debug, Clone, Default)]
pub struct DemoSource {
    t: f32,
}

impl DemoSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Produces the next state and advances time.
    pub fn next_state(&mut self) -> ControlState {
        let t = self.t;
        self.t += TIME_STEP;

        let mut state = ControlState::new(
            30.0 * t.sin(),
            15.0 * (t / 2.0).cos(),
            (3.0 * t).sin() > 0.8,
        );
        state.touch();
        state
    }
}
