//! # Key-Event Synthesizer
//!
//! Drives a consuming surface with key down/up events.
//!
//! ## Behavior
//!
//! - Only keys whose state changed since the last apply are emitted
//! - Left and right are exclusive; the opposite side is released before the
//!   new side is pressed
//! - Boost keys follow the boost flag directly
//! - Before the first emission the target is discovered, focused and sent a
//!   short pointer burst; failures there are logged and emission continues

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use super::keys::{KeyBindings, KeyCode};
use super::target::{select_target, Target, TargetDiscovery};
use crate::error::Result;

/// Steering command for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteerDirection {
    /// Hold the left bindings.
    Left,
    /// Hold the right bindings.
    Right,
    /// Release both sides.
    Center,
}

/// Emits input events to a target.
#[cfg_attr(test, mockall::automock)]
pub trait KeySink: Send {
    /// Emits a key down (`true`) or up (`false`).
    ///
    /// # Errors
    ///
    /// Returns `Synthesizer` if the event could not be delivered.
    fn key(&mut self, key: KeyCode, down: bool) -> Result<()>;

    /// Gives the target input focus.
    ///
    /// # Errors
    ///
    /// Returns `Synthesizer` if focus could not be acquired.
    fn acquire_focus(&mut self, target: &Target) -> Result<()>;

    /// Sends a pointer down/up/click at the target centre.
    ///
    /// Sinks that cannot place the pointer on the target skip the burst.
    ///
    /// # Errors
    ///
    /// Returns `Synthesizer` if the burst could not be delivered.
    fn wake_burst(&mut self, target: &Target) -> Result<()>;
}

/// Key synthesizer for one session.
pub struct KeySynthesizer<K: KeySink, D: TargetDiscovery> {
    sink: K,
    discovery: D,
    bindings: KeyBindings,
    target: Option<Target>,
    held: BTreeSet<KeyCode>,
}

impl<K: KeySink, D: TargetDiscovery> std::fmt::Debug for KeySynthesizer<K, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySynthesizer")
            .field("target", &self.target)
            .field("held", &self.held)
            .finish_non_exhaustive()
    }
}

impl<K: KeySink, D: TargetDiscovery> KeySynthesizer<K, D> {
    /// Creates a synthesizer with nothing held.
    ///
    /// The target is discovered lazily on the first [`apply`](Self::apply).
    #[must_use]
    pub fn new(sink: K, discovery: D, bindings: KeyBindings) -> Self {
        Self {
            sink,
            discovery,
            bindings,
            target: None,
            held: BTreeSet::new(),
        }
    }

    /// Returns the target chosen on the first apply.
    #[must_use]
    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// Returns true if `key` is currently held.
    #[must_use]
    pub fn is_held(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }

    /// Returns the sink events are emitted to.
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Applies one tick of steering and boost.
    ///
    /// # Errors
    ///
    /// Returns the first key emission error. Keys emitted before the error
    /// keep their new state; the rest are retried on the next apply.
    pub fn apply(&mut self, direction: SteerDirection, boosting: bool) -> Result<()> {
        self.prime();

        let (pressed, released) = match direction {
            SteerDirection::Left => (self.bindings.left.clone(), self.bindings.right.clone()),
            SteerDirection::Right => (self.bindings.right.clone(), self.bindings.left.clone()),
            SteerDirection::Center => (Vec::new(), self.all_steer_keys()),
        };

        // Releases first so left and right never overlap
        for key in released {
            if !pressed.contains(&key) {
                self.set_key(key, false)?;
            }
        }
        for key in pressed {
            self.set_key(key, true)?;
        }

        let boost = self.bindings.boost.clone();
        for key in boost {
            let steering_holds = match direction {
                SteerDirection::Left => self.bindings.left.contains(&key),
                SteerDirection::Right => self.bindings.right.contains(&key),
                SteerDirection::Center => false,
            };
            if !steering_holds {
                self.set_key(key, boosting)?;
            }
        }

        Ok(())
    }

    /// Releases every held key.
    ///
    /// # Errors
    ///
    /// Returns the last emission error; every key is still attempted.
    pub fn release_all(&mut self) -> Result<()> {
        let held: Vec<KeyCode> = self.held.iter().copied().collect();
        let mut result = Ok(());
        for key in held {
            if let Err(e) = self.set_key(key, false) {
                warn!("Failed to release {:?}: {}", key, e);
                result = Err(e);
            }
        }
        debug!("Released all keys");
        result
    }

    fn set_key(&mut self, key: KeyCode, down: bool) -> Result<()> {
        if self.held.contains(&key) == down {
            return Ok(());
        }
        self.sink.key(key, down)?;
        if down {
            self.held.insert(key);
        } else {
            self.held.remove(&key);
        }
        Ok(())
    }

    fn all_steer_keys(&self) -> Vec<KeyCode> {
        self.bindings
            .left
            .iter()
            .chain(&self.bindings.right)
            .copied()
            .collect()
    }

    fn prime(&mut self) {
        if self.target.is_some() {
            return;
        }

        let target = select_target(self.discovery.discover());
        info!("Synthesizer target: {:?}", target);

        if let Err(e) = self.sink.acquire_focus(&target) {
            warn!("Could not focus target: {}", e);
        }
        if let Err(e) = self.sink.wake_burst(&target) {
            warn!("Wake-up burst failed: {}", e);
        }

        self.target = Some(target);
    }
}
