//! Rolling history of received control states.

use std::collections::VecDeque;

use crate::sync::ControlState;

/// Default number of states kept.
pub const DEFAULT_HISTORY_LEN: usize = 50;

/// Bounded buffer of the most recent states, oldest first.
#[derive(Debug, Clone)]
pub struct TelemetryHistory {
    states: VecDeque<ControlState>,
    capacity: usize,
}

impl Default for TelemetryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN)
    }
}

impl TelemetryHistory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            states: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a state, evicting the oldest when full.
    pub fn push(&mut self, state: ControlState) {
        if self.states.len() == self.capacity {
            self.states.pop_front();
        }
        self.states.push_back(state);
    }

    #[must_use]
    pub fn latest(&self) -> Option<&ControlState> {
        self.states.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ControlState> {
        self.states.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// True once any state from a real publish has been seen.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.states.iter().any(ControlState::is_live)
    }

    /// Fraction of kept states with boost held.
    #[must_use]
    pub fn boost_ratio(&self) -> f32 {
        if self.states.is_empty() {
            return 0.0;
        }
        let boosting = self.states.iter().filter(|s| s.is_boosting).count();
        boosting as f32 / self.states.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(x: f32, boosting: bool) -> ControlState {
        let mut state = ControlState::new(x, 0.0, boosting);
        state.updated_at = 1;
        state
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = TelemetryHistory::new(3);
        for x in 0..5 {
            history.push(live(x as f32, false));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.iter().next().map(|s| s.x), Some(2.0));
        assert_eq!(history.latest().map(|s| s.x), Some(4.0));
    }

    #[test]
    fn test_connection_indicator() {
        let mut history = TelemetryHistory::default();
        assert!(!history.is_connected());
        history.push(ControlState::new(1.0, 0.0, false));
        assert!(!history.is_connected());
        history.push(live(1.0, false));
        assert!(history.is_connected());
    }

    #[test]
    fn test_boost_ratio() {
        let mut history = TelemetryHistory::default();
        assert_eq!(history.boost_ratio(), 0.0);
        history.push(live(0.0, true));
        history.push(live(0.0, false));
        assert_eq!(history.boost_ratio(), 0.5);
    }
}
