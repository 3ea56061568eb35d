//! # Air Bridge Library
//!
//! Turn a phone-style motion controller into keyboard input on a host.
//!
//! A controller publishes tilt-derived steering and a boost flag to a room on
//! a pub/sub store. A host subscribes to the room and converts the received
//! state into held keys through smoothing, a deadzone and PWM duty cycling.

pub mod actuation;
pub mod config;
pub mod error;
pub mod input;
pub mod motion;
pub mod session;
pub mod sync;
pub mod telemetry;
