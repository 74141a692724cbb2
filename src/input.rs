use std::collections::HashSet;

use glam::Vec2;
use parking_lot::RwLock;

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
}

/// Non-character keys the viewer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Escape,
    Tab,
    LeftShift,
    RightShift,
    LeftAlt,
    RightAlt,
}

/// Identifier for a mouse button (left button is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

/// Raw input written by window event handlers. Handlers only record state
/// here; the frame loop takes one [`FrameInput`] per frame and applies it.
#[derive(Debug, Default)]
pub struct InputState {
    keys: RwLock<HashSet<KeyCode>>,
    mouse_buttons: RwLock<HashSet<MouseButton>>,
    mouse_delta: RwLock<Vec2>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&self, key: KeyCode) {
        self.keys.write().insert(key);
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.keys.write().remove(&key);
    }

    pub fn set_mouse_button_down(&self, button: MouseButton) {
        self.mouse_buttons.write().insert(button);
    }

    pub fn set_mouse_button_up(&self, button: MouseButton) {
        self.mouse_buttons.write().remove(&button);
    }

    /// Accumulates relative pointer motion until the next snapshot.
    pub fn add_mouse_motion(&self, delta: Vec2) {
        *self.mouse_delta.write() += delta;
    }

    /// Forgets held keys and buttons, e.g. when the window loses focus.
    pub fn clear(&self) {
        self.keys.write().clear();
        self.mouse_buttons.write().clear();
        *self.mouse_delta.write() = Vec2::ZERO;
    }

    /// Copies held keys and buttons and drains the accumulated motion.
    pub fn snapshot(&self) -> FrameInput {
        FrameInput {
            keys: self.keys.read().clone(),
            mouse_buttons: self.mouse_buttons.read().clone(),
            mouse_delta: std::mem::take(&mut *self.mouse_delta.write()),
        }
    }
}

/// Input sampled once for a single frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameInput {
    pub keys: HashSet<KeyCode>,
    pub mouse_buttons: HashSet<MouseButton>,
    pub mouse_delta: Vec2,
}

impl FrameInput {
    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    pub fn is_char_down(&self, ch: char) -> bool {
        self.is_key_down(KeyCode::Character(ch.to_ascii_uppercase()))
    }

    pub fn any_down(&self, keys: &[NamedKey]) -> bool {
        keys.iter().any(|key| self.is_key_down(KeyCode::Named(*key)))
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons.contains(&button)
    }
}
