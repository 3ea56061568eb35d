//! # Accelerometer Sensor Module
//!
//! Reads orientation from a Linux motion-sensor input device via evdev.
//!
//! ## Device Detection
//!
//! Motion sensors are exposed as separate event devices carrying the
//! `INPUT_PROP_ACCELEROMETER` property (for example the
//! "DualSense Wireless Controller Motion Sensors" node, or a laptop/tablet
//! IIO accelerometer bridged to evdev). The accelerometer axes are
//! `ABS_X`, `ABS_Y` and `ABS_Z`.
//!
//! ## Tilt Derivation
//!
//! With gravity as the only acceleration, the tilt angles are:
//!
//! - roll (left/right) = `atan2(ax, az)`
//! - pitch (front/back) = `atan2(ay, sqrt(ax² + az²))`
//!
//! Both are scale-invariant, so the raw axis units do not matter.

use evdev::{AbsoluteAxisType, Device, InputEvent, InputEventKind, PropType};
use std::io;
use std::path::Path;
use tracing::{debug, info};

use super::sample::OrientationSample;
use super::sensor::SensorSource;
use crate::error::{AirBridgeError, Result};

/// Input device directory scanned for sensors.
const INPUT_DIR: &str = "/dev/input";

/// Converts a gravity vector into `(roll, pitch)` in degrees.
///
/// # Examples
///
/// ```
/// use air_bridge::motion::accelerometer::tilt_from_acceleration;
///
/// let (roll, pitch) = tilt_from_acceleration(0.0, 0.0, 1.0);
/// assert!(roll.abs() < 1e-4 && pitch.abs() < 1e-4);
/// ```
#[must_use]
pub fn tilt_from_acceleration(ax: f32, ay: f32, az: f32) -> (f32, f32) {
    let roll = ax.atan2(az).to_degrees();
    let pitch = ay.atan2((ax * ax + az * az).sqrt()).to_degrees();
    (roll, pitch)
}

/// Accelerometer event device.
pub struct MotionSensor {
    device: Device,
    device_path: String,
    name: String,
    accel: [i32; 3],
}

impl std::fmt::Debug for MotionSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionSensor")
            .field("device_path", &self.device_path)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl MotionSensor {
    /// Detect and open the first accelerometer device.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied`: at least one event device could not be opened
    ///   due to permissions and no sensor was found among the others
    /// - `SensorNotFound`: no accelerometer present
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use air_bridge::motion::accelerometer::MotionSensor;
    ///
    /// let sensor = MotionSensor::open()?;
    /// println!("Reading tilt from {}", sensor.device_path());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open() -> Result<Self> {
        let input_dir = Path::new(INPUT_DIR);
        if !input_dir.exists() {
            return Err(AirBridgeError::Sensor(format!(
                "{} directory not found",
                INPUT_DIR
            )));
        }

        let mut entries: Vec<_> = std::fs::read_dir(input_dir)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        entries.sort_by_key(|entry| entry.path());

        let mut denied = Vec::new();

        for entry in entries {
            let path = entry.path();
            let is_event_node = path
                .file_name()
                .map(|name| name.to_string_lossy().starts_with("event"))
                .unwrap_or(false);
            if !is_event_node {
                continue;
            }

            match Device::open(&path) {
                Ok(device) => {
                    if is_accelerometer(&device) {
                        return Ok(Self::from_device(device, &path));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    debug!("Permission denied opening {}", path.display());
                    denied.push(path.display().to_string());
                }
                Err(e) => debug!("Could not open {}: {}", path.display(), e),
            }
        }

        if denied.is_empty() {
            Err(AirBridgeError::SensorNotFound)
        } else {
            Err(AirBridgeError::PermissionDenied(denied.join(", ")))
        }
    }

    /// Open a specific device path.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` if the node is not readable, `Sensor` if
    /// the device is not an accelerometer.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let device = Device::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => {
                AirBridgeError::PermissionDenied(path.display().to_string())
            }
            _ => AirBridgeError::Sensor(format!("Failed to open {}: {}", path.display(), e)),
        })?;

        if !is_accelerometer(&device) {
            return Err(AirBridgeError::Sensor(format!(
                "{} is not an accelerometer",
                path.display()
            )));
        }

        Ok(Self::from_device(device, path))
    }

    fn from_device(device: Device, path: &Path) -> Self {
        let device_path = path.to_string_lossy().to_string();
        let name = device.name().unwrap_or("motion sensor").to_string();
        info!("Found motion sensor '{}' at {}", name, device_path);
        Self {
            device,
            device_path,
            name,
            accel: [0, 0, 0],
        }
    }

    /// Returns the `/dev/input/eventX` path of this sensor.
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Applies one event to the gravity vector; returns a sample on sync.
    fn apply_event(&mut self, event: &InputEvent) -> Option<OrientationSample> {
        match event.kind() {
            InputEventKind::AbsAxis(AbsoluteAxisType::ABS_X) => self.accel[0] = event.value(),
            InputEventKind::AbsAxis(AbsoluteAxisType::ABS_Y) => self.accel[1] = event.value(),
            InputEventKind::AbsAxis(AbsoluteAxisType::ABS_Z) => self.accel[2] = event.value(),
            InputEventKind::Synchronization(_) => {
                let [ax, ay, az] = self.accel.map(|v| v as f32);
                if ax == 0.0 && ay == 0.0 && az == 0.0 {
                    return None;
                }
                let (roll, pitch) = tilt_from_acceleration(ax, ay, az);
                return Some(OrientationSample::new(roll, pitch));
            }
            _ => {}
        }
        None
    }
}

impl SensorSource for MotionSensor {
    fn read_samples(&mut self) -> Result<Vec<OrientationSample>> {
        let events: Vec<InputEvent> = self
            .device
            .fetch_events()
            .map_err(|e| AirBridgeError::Sensor(format!("Failed to fetch events: {}", e)))?
            .collect();

        Ok(events
            .iter()
            .filter_map(|event| self.apply_event(event))
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn is_accelerometer(device: &Device) -> bool {
    let has_axes = device
        .supported_absolute_axes()
        .map(|axes| {
            axes.contains(AbsoluteAxisType::ABS_X)
                && axes.contains(AbsoluteAxisType::ABS_Y)
                && axes.contains(AbsoluteAxisType::ABS_Z)
        })
        .unwrap_or(false);

    has_axes && device.properties().contains(PropType::ACCELEROMETER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_device_reads_zero() {
        let (roll, pitch) = tilt_from_acceleration(0.0, 0.0, 8192.0);
        assert!(roll.abs() < 1e-4);
        assert!(pitch.abs() < 1e-4);
    }

    #[test]
    fn test_roll_right_45() {
        let (roll, pitch) = tilt_from_acceleration(1.0, 0.0, 1.0);
        assert!((roll - 45.0).abs() < 1e-3);
        assert!(pitch.abs() < 1e-3);
    }

    #[test]
    fn test_roll_left_is_negative() {
        let (roll, _) = tilt_from_acceleration(-1.0, 0.0, 1.0);
        assert!((roll + 45.0).abs() < 1e-3);
    }

    #[test]
    fn test_pitch_forward_45() {
        let (roll, pitch) = tilt_from_acceleration(0.0, 1.0, 1.0);
        assert!(roll.abs() < 1e-3);
        assert!((pitch - 45.0).abs() < 1e-3);
    }

    #[test]
    fn test_tilt_is_scale_invariant() {
        let a = tilt_from_acceleration(0.3, -0.2, 0.9);
        let b = tilt_from_acceleration(3000.0, -2000.0, 9000.0);
        assert!((a.0 - b.0).abs() < 1e-3);
        assert!((a.1 - b.1).abs() < 1e-3);
    }

    // Integration test - only runs with a motion sensor attached
    #[test]
    #[ignore]
    fn test_open_with_real_hardware() {
        let sensor = MotionSensor::open().expect("No motion sensor found");
        assert!(sensor.device_path().starts_with("/dev/input/event"));
    }
}
