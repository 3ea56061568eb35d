//! # Virtual Keyboard Module
//!
//! [`KeySink`] implementations.
//!
//! [`VirtualKeyboard`] creates a Linux uinput device and emits real key
//! events through it, so whatever window has focus receives them. It needs
//! write access to `/dev/uinput`.
//!
//! The device has keys only. It never clicks, since it has no way to place
//! the pointer on a target.
//!
//! [`TracingSink`] only logs, for dry runs.

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key};
use tracing::{debug, info};

use super::keys::KeyCode;
use super::synthesizer::KeySink;
use super::target::Target;
use crate::error::{AirBridgeError, Result};

/// Default name of the created device.
pub const DEFAULT_DEVICE_NAME: &str = "Air Bridge Virtual Keyboard";

/// Maps a key code to its evdev key.
#[must_use]
pub fn evdev_key(key: KeyCode) -> Key {
    match key {
        KeyCode::A => Key::KEY_A,
        KeyCode::D => Key::KEY_D,
        KeyCode::W => Key::KEY_W,
        KeyCode::S => Key::KEY_S,
        KeyCode::Left => Key::KEY_LEFT,
        KeyCode::Right => Key::KEY_RIGHT,
        KeyCode::Up => Key::KEY_UP,
        KeyCode::Down => Key::KEY_DOWN,
        KeyCode::Space => Key::KEY_SPACE,
        KeyCode::Shift => Key::KEY_LEFTSHIFT,
        KeyCode::Enter => Key::KEY_ENTER,
    }
}

/// Keys registered on the virtual device.
fn keyboard_keys() -> AttributeSet<Key> {
    let mut keys = AttributeSet::<Key>::new();
    for key in KeyCode::ALL {
        keys.insert(evdev_key(key));
    }
    keys
}

/// Broadcast needs nothing from uinput; surfaces cannot be addressed.
fn require_broadcast(target: &Target, action: &str) -> Result<()> {
    match target {
        Target::Broadcast => Ok(()),
        Target::Surface(surface) => Err(AirBridgeError::Synthesizer(format!(
            "uinput cannot {} surface {}",
            action, surface.id
        ))),
    }
}

/// uinput-backed keyboard.
pub struct VirtualKeyboard {
    device: VirtualDevice,
    name: String,
}

impl std::fmt::Debug for VirtualKeyboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualKeyboard")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl VirtualKeyboard {
    /// Creates the virtual device with every [`KeyCode`] enabled.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` if `/dev/uinput` is not writable, and
    /// `Synthesizer` for other device creation failures.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use air_bridge::actuation::uinput::VirtualKeyboard;
    ///
    /// let keyboard = VirtualKeyboard::create("Air Bridge Virtual Keyboard")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn create(name: &str) -> Result<Self> {
        let keys = keyboard_keys();
        let device = VirtualDeviceBuilder::new()
            .and_then(|builder| builder.name(name).with_keys(&keys))
            .and_then(|builder| builder.build())
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    AirBridgeError::PermissionDenied("/dev/uinput".to_string())
                }
                _ => AirBridgeError::Synthesizer(format!("Failed to create uinput device: {}", e)),
            })?;

        info!("Created virtual keyboard '{}'", name);
        Ok(Self {
            device,
            name: name.to_string(),
        })
    }

    fn emit(&mut self, key: Key, value: i32) -> Result<()> {
        self.device
            .emit(&[InputEvent::new(EventType::KEY, key.code(), value)])
            .map_err(|e| AirBridgeError::Synthesizer(format!("Failed to emit {:?}: {}", key, e)))
    }
}

impl KeySink for VirtualKeyboard {
    fn key(&mut self, key: KeyCode, down: bool) -> Result<()> {
        self.emit(evdev_key(key), i32::from(down))
    }

    fn acquire_focus(&mut self, target: &Target) -> Result<()> {
        // Key events go to whatever window has focus
        require_broadcast(target, "focus")
    }

    fn wake_burst(&mut self, target: &Target) -> Result<()> {
        require_broadcast(target, "click")?;
        debug!("Skipping wake-up burst, no pointer position to click at");
        Ok(())
    }
}

/// Sink that logs instead of emitting.
#[derive(Debug, Default)]
pub struct TracingSink {
    emitted: usize,
}

impl TracingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of key events logged so far.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl KeySink for TracingSink {
    fn key(&mut self, key: KeyCode, down: bool) -> Result<()> {
        self.emitted += 1;
        info!("[dry-run] {:?} {}", key, if down { "down" } else { "up" });
        Ok(())
    }

    fn acquire_focus(&mut self, target: &Target) -> Result<()> {
        info!("[dry-run] focus {:?}", target);
        Ok(())
    }

    fn wake_burst(&mut self, target: &Target) -> Result<()> {
        info!("[dry-run] wake-up burst on {:?}", target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuation::target::Surface;

    #[test]
    fn test_key_mapping_is_distinct() {
        let mut codes: Vec<u16> = KeyCode::ALL.iter().map(|k| evdev_key(*k).code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), KeyCode::ALL.len());
    }

    #[test]
    fn test_arrow_mapping() {
        assert_eq!(evdev_key(KeyCode::Left), Key::KEY_LEFT);
        assert_eq!(evdev_key(KeyCode::Space), Key::KEY_SPACE);
    }

    #[test]
    fn test_device_has_no_pointer_button() {
        let keys = keyboard_keys();
        assert!(!keys.contains(Key::BTN_LEFT));
        assert!(KeyCode::ALL.iter().all(|k| keys.contains(evdev_key(*k))));
    }

    #[test]
    fn test_surface_targets_rejected() {
        let surface = Target::Surface(Surface {
            id: "game".into(),
            width: 800,
            height: 600,
        });
        assert!(require_broadcast(&Target::Broadcast, "click").is_ok());
        assert!(matches!(
            require_broadcast(&surface, "click"),
            Err(AirBridgeError::Synthesizer(msg)) if msg.contains("game")
        ));
    }

    #[test]
    fn test_tracing_sink_counts() {
        let mut sink = TracingSink::new();
        sink.acquire_focus(&Target::Broadcast).unwrap();
        sink.key(KeyCode::A, true).unwrap();
        sink.key(KeyCode::A, false).unwrap();
        assert_eq!(sink.emitted(), 2);
    }

    // Integration tests - only run with write access to /dev/uinput
    #[test]
    #[ignore]
    fn test_create_virtual_keyboard() {
        let mut keyboard = VirtualKeyboard::create(DEFAULT_DEVICE_NAME).expect("uinput unavailable");
        keyboard.key(KeyCode::Space, true).unwrap();
        keyboard.key(KeyCode::Space, false).unwrap();
    }

    #[test]
    #[ignore]
    fn test_broadcast_wake_burst_is_silent() {
        let mut keyboard = VirtualKeyboard::create(DEFAULT_DEVICE_NAME).expect("uinput unavailable");
        keyboard.acquire_focus(&Target::Broadcast).unwrap();
        keyboard.wake_burst(&Target::Broadcast).unwrap();
    }
}
