//! Consuming surface discovery.
//!
//! The synthesizer asks a [`TargetDiscovery`] once for candidate surfaces
//! and picks the first one at least 200×200. Without a usable candidate,
//! events are emitted broadly.

use tracing::debug;

/// Minimum width for a surface to be targeted.
pub const MIN_TARGET_WIDTH: u32 = 200;

/// Minimum height for a surface to be targeted.
pub const MIN_TARGET_HEIGHT: u32 = 200;

/// A candidate consuming surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub id: String,
    pub width: u32,
    pub height: u32,
}

impl Surface {
    /// Centre point, used for the wake-up burst.
    #[must_use]
    pub fn center(&self) -> (u32, u32) {
        (self.width / 2, self.height / 2)
    }
}

/// Where synthesized events go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Surface(Surface),
    Broadcast,
}

/// Picks the first surface meeting the minimum size.
///
/// # Examples
///
/// ```
/// use air_bridge::actuation::target::{select_target, Surface, Target};
///
/// let small = Surface { id: "ad".into(), width: 120, height: 90 };
/// let game = Surface { id: "game".into(), width: 800, height: 600 };
///
/// assert_eq!(select_target(vec![small.clone(), game.clone()]), Target::Surface(game));
/// assert_eq!(select_target(vec![small]), Target::Broadcast);
/// ```
#[must_use]
pub fn select_target(candidates: Vec<Surface>) -> Target {
    candidates
        .into_iter()
        .find(|s| s.width >= MIN_TARGET_WIDTH && s.height >= MIN_TARGET_HEIGHT)
        .map_or(Target::Broadcast, |surface| {
            debug!("Selected target surface {}", surface.id);
            Target::Surface(surface)
        })
}

/// Source of candidate surfaces.
#[cfg_attr(test, mockall::automock)]
pub trait TargetDiscovery: Send {
    fn discover(&mut self) -> Vec<Surface>;
}

/// Reports no surfaces, so events are always broadcast.
#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastDiscovery;

impl TargetDiscovery for BroadcastDiscovery {
    fn discover(&mut self) -> Vec<Surface> {
        Vec::new()
    }
}

/// Reports a fixed list of surfaces.
#[derive(Debug, Clone, Default)]
pub struct FixedDiscovery {
    surfaces: Vec<Surface>,
}

impl FixedDiscovery {
    #[must_use]
    pub fn new(surfaces: Vec<Surface>) -> Self {
        Self { surfaces }
    }
}

impl TargetDiscovery for FixedDiscovery {
    fn discover(&mut self) -> Vec<Surface> {
        self.surfaces.clone()
    }
}
