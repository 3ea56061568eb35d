//! # Telemetry Module
//!
//! Host-side record of received control states.
//!
//! This module handles:
//! - Keeping the last N states in memory for the connection indicator
//! - Writing received states to rotating JSONL files
//! - Retaining only the newest M files

pub mod history;
pub mod recorder;

pub use history::TelemetryHistory;
pub use recorder::TelemetryRecorder;
