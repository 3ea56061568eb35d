//! # Input Module
//!
//! Controller-side input sources and the arbiter choosing between them.

pub mod arbiter;
pub mod demo;
pub mod security;

pub use arbiter::{DigitalDirection, DigitalPad, InputMode, InputModeArbiter};
pub use demo::DemoSource;
pub use security::SecurityContext;
