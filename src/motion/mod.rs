//! # Motion Module
//!
//! Controller-side motion telemetry pipeline.
//!
//! This module handles:
//! - Reading orientation samples from a motion sensor via evdev
//! - Removing per-session bias and slow drift (calibration)
//! - Remapping sensor axes for portrait/landscape grips
//! - Low-pass smoothing and deadzone suppression

pub mod accelerometer;
pub mod axis;
pub mod calibration;
pub mod pipeline;
pub mod sample;
pub mod sensor;
pub mod smoothing;

pub use axis::{AxisMapper, AxisMapping, OrientationClass};
pub use calibration::{CalibrationFilter, CalibrationState};
pub use pipeline::{MotionPipeline, PipelineParams, PipelinePreset};
pub use sample::{AxisPair, OrientationSample};
pub use sensor::{SensorSource, SensorStream};
pub use smoothing::{smooth, Deadzone, SmoothingFilter};
