//! # Session Module
//!
//! The two long-running roles of a room.
//!
//! - [`ControllerSession`]: reads motion or digital input and publishes it
//! - [`HostSession`]: receives states and turns them into key events

pub mod controller;
pub mod host;

pub use controller::{ControllerCommand, ControllerSession, SensorFactory};
pub use host::{HostFeed, HostSession};
