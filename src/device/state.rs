use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Discrete position of a hat switch (8-way D-pad plus center).
///
/// Derived from the pair of hat axes the kernel reports per hat. Negative
/// Y is up, matching the evdev convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HatDirection {
    Centered,
    Up,
    UpRight,
    Right,
    DownRight,
    Down,
    DownLeft,
    Left,
    UpLeft,
}

impl HatDirection {
    /// Combines the raw X/Y readings of one hat into a direction.
    pub fn from_xy(x: i8, y: i8) -> Self {
        match (x.signum(), y.signum()) {
            (0, -1) => HatDirection::Up,
            (1, -1) => HatDirection::UpRight,
            (1, 0) => HatDirection::Right,
            (1, 1) => HatDirection::DownRight,
            (0, 1) => HatDirection::Down,
            (-1, 1) => HatDirection::DownLeft,
            (-1, 0) => HatDirection::Left,
            (-1, -1) => HatDirection::UpLeft,
            _ => HatDirection::Centered,
        }
    }
}

/// Snapshot of one device at one instant.
///
/// Axes are normalized floats (-1.0..1.0 for centered axes, 0.0..1.0 for
/// throttle-like axes), buttons are pressed flags, hats are discrete
/// directions. A key is present only if the signal was reported by the
/// hardware since the device was opened or declared by its
/// [`DeviceDescription`](crate::device::description::DeviceDescription);
/// everything else is absent rather than defaulted, so a caller can tell
/// "never seen" apart from "at rest".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoystickState {
    pub axes: HashMap<u16, f32>,
    pub buttons: HashMap<u16, bool>,
    pub hats: HashMap<u8, HatDirection>,
}

impl JoystickState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty() && self.buttons.is_empty() && self.hats.is_empty()
    }
}
