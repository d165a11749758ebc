use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Navigation keys the frame loop understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Confirm,
    Cancel,
}

impl Key {
    pub const ALL: [Key; 6] = [
        Key::Up,
        Key::Down,
        Key::Left,
        Key::Right,
        Key::Confirm,
        Key::Cancel,
    ];

    /// Parse a lowercase key name such as `"up"` or `"confirm"`.
    pub fn from_name(name: &str) -> Option<Key> {
        match name {
            "up" => Some(Key::Up),
            "down" => Some(Key::Down),
            "left" => Some(Key::Left),
            "right" => Some(Key::Right),
            "confirm" => Some(Key::Confirm),
            "cancel" => Some(Key::Cancel),
            _ => None,
        }
    }
}

/// Anything that can answer "is this key held right now".
pub trait InputState {
    fn is_key_down(&self, key: Key) -> bool;
}

/// Held-key set fed by press/release events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyboardState {
    held: BTreeSet<Key>,
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot with the given keys held, e.g. for scripted replays.
    pub fn holding(keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            held: keys.into_iter().collect(),
        }
    }

    pub fn key_down(&mut self, key: Key) {
        if self.held.insert(key) {
            tracing::trace!(?key, "key down");
        }
    }

    pub fn key_up(&mut self, key: Key) {
        if self.held.remove(&key) {
            tracing::trace!(?key, "key up");
        }
    }

    /// Apply a press (`true`) or release (`false`).
    pub fn set(&mut self, key: Key, pressed: bool) {
        if pressed {
            self.key_down(key);
        } else {
            self.key_up(key);
        }
    }

    /// Release everything, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.held.clear();
    }

    pub fn held(&self) -> impl Iterator<Item = Key> + '_ {
        self.held.iter().copied()
    }
}

impl InputState for KeyboardState {
    fn is_key_down(&self, key: Key) -> bool {
        self.held.contains(&key)
    }
}
