//! Key codes and the steering/boost key bindings.

use serde::{Deserialize, Serialize};

/// Keys the synthesizer can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyCode {
    A,
    D,
    W,
    S,
    Left,
    Right,
    Up,
    Down,
    Space,
    Shift,
    Enter,
}

impl KeyCode {
    /// Every emittable key.
    pub const ALL: [KeyCode; 11] = [
        KeyCode::A,
        KeyCode::D,
        KeyCode::W,
        KeyCode::S,
        KeyCode::Left,
        KeyCode::Right,
        KeyCode::Up,
        KeyCode::Down,
        KeyCode::Space,
        KeyCode::Shift,
        KeyCode::Enter,
    ];
}

/// Keys driven by each control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBindings {
    #[serde(default = "default_left")]
    pub left: Vec<KeyCode>,
    #[serde(default = "default_right")]
    pub right: Vec<KeyCode>,
    #[serde(default = "default_boost")]
    pub boost: Vec<KeyCode>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            left: default_left(),
            right: default_right(),
            boost: default_boost(),
        }
    }
}

impl KeyBindings {
    /// All bound keys, deduplicated and sorted.
    #[must_use]
    pub fn all_keys(&self) -> Vec<KeyCode> {
        let mut keys: Vec<KeyCode> = self
            .left
            .iter()
            .chain(&self.right)
            .chain(&self.boost)
            .copied()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

fn default_left() -> Vec<KeyCode> {
    vec![KeyCode::A, KeyCode::Left]
}

fn default_right() -> Vec<KeyCode> {
    vec![KeyCode::D, KeyCode::Right]
}

fn default_boost() -> Vec<KeyCode> {
    vec![KeyCode::W, KeyCode::Up, KeyCode::Space]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bindings() {
        let bindings = KeyBindings::default();
        assert_eq!(bindings.left, [KeyCode::A, KeyCode::Left]);
        assert_eq!(bindings.right, [KeyCode::D, KeyCode::Right]);
        assert_eq!(bindings.boost, [KeyCode::W, KeyCode::Up, KeyCode::Space]);
    }

    #[test]
    fn test_all_keys_deduplicated() {
        let bindings = KeyBindings {
            left: vec![KeyCode::A],
            right: vec![KeyCode::D],
            boost: vec![KeyCode::A, KeyCode::Space],
        };
        assert_eq!(bindings.all_keys(), [KeyCode::A, KeyCode::D, KeyCode::Space]);
    }

    #[test]
    fn test_partial_bindings_from_toml() {
        let bindings: KeyBindings = toml::from_str(r#"boost = ["Shift"]"#).unwrap();
        assert_eq!(bindings.boost, [KeyCode::Shift]);
        assert_eq!(bindings.left, default_left());
    }
}
