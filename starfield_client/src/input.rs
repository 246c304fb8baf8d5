//! Input handling.
//!
//! In a real viewer this would integrate with window events. This module only
//! tracks which movement keys are held and turns them into a per-tick camera
//! translation.

use std::collections::BTreeSet;

use starfield_shared::math::Vec3;

use crate::camera::Camera;

/// Keys the viewer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    /// Switches `Up`/`Down` from vertical to depth motion.
    Modifier,
}

/// Currently held keys.
#[derive(Debug, Clone, Default)]
pub struct KeyState {
    held: BTreeSet<Key>,
}

impl KeyState {
    pub fn press(&mut self, key: Key) {
        self.held.insert(key);
    }

    pub fn release(&mut self, key: Key) {
        self.held.remove(&key);
    }

    pub fn is_held(&self, key: Key) -> bool {
        self.held.contains(&key)
    }

    /// True if any movement key (not just the modifier) is held.
    pub fn is_moving(&self) -> bool {
        self.held.iter().any(|k| *k != Key::Modifier)
    }

    /// Translation for one tick along the camera's axes.
    pub fn movement(&self, camera: &Camera, step: f64) -> Vec3 {
        let mut delta = Vec3::ZERO;
        if self.is_held(Key::Left) {
            delta += -camera.right();
        }
        if self.is_held(Key::Right) {
            delta += camera.right();
        }
        let vertical = if self.is_held(Key::Modifier) {
            camera.forward()
        } else {
            camera.up()
        };
        if self.is_held(Key::Up) {
            delta += vertical;
        }
        if self.is_held(Key::Down) {
            delta += -vertical;
        }
        delta * step
    }
}
