//! Single-device input handling
//!
//! Everything that deals with one physical device at a time:
//!
//! 1. [`enumerator`] - Discovery of currently attached devices
//! 2. [`description`] - Declarative per-device configuration (TOML)
//! 3. [`joystick`] - Raw evdev state reader for one open device
//! 4. [`state`] - Snapshot types shared with the pool layer
//!
//! The pool layer in [`crate::pool`] composes these into concurrently
//! monitored device sets.

pub mod description;
pub mod enumerator;
pub mod joystick;
pub mod state;
