use crate::device::description::{AxisKind, DeviceDescription};
use crate::device::state::{HatDirection, JoystickState};
use evdev::{AbsoluteAxisCode, Device, EventSummary, KeyCode};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// Hat axes occupy the contiguous code range ABS_HAT0X..=ABS_HAT3Y.
const HAT_FIRST: u16 = AbsoluteAxisCode::ABS_HAT0X.0;
const HAT_LAST: u16 = AbsoluteAxisCode::ABS_HAT3Y.0;

// Fallback raw range for axes declared in a description but unknown to the
// kernel, matching the common signed 16-bit report format.
const DEFAULT_AXIS_MIN: i32 = -32768;
const DEFAULT_AXIS_MAX: i32 = 32767;

/// Errors from opening or reading one device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The path does not exist or cannot be opened. The pool logs and
    /// skips such devices.
    #[error("Device unavailable: {0}")]
    Unavailable(String),

    /// I/O failed mid-read, usually an unplug. Terminal for the device;
    /// the handle is released.
    #[error("Device disconnected: {0}")]
    Disconnected(String),
}

/// Raw-to-normalized conversion for one axis.
#[derive(Debug, Clone, Copy)]
pub struct AxisCalibration {
    pub min: i32,
    pub max: i32,
    pub deadzone: f32,
    pub kind: AxisKind,
}

impl AxisCalibration {
    /// Normalizes a raw reading into the calibrated range, collapsing the
    /// deadzone to the rest value and rescaling the remainder so the output
    /// stays continuous at the deadzone edge.
    pub fn normalize(&self, raw: i32) -> f32 {
        let span = (self.max as i64 - self.min as i64) as f32;
        if span <= 0.0 {
            return 0.0;
        }
        let fraction = ((raw as i64 - self.min as i64) as f32 / span).clamp(0.0, 1.0);
        match self.kind {
            AxisKind::Centered => apply_deadzone(fraction * 2.0 - 1.0, self.deadzone),
            AxisKind::Throttle => {
                if fraction < self.deadzone {
                    0.0
                } else if self.deadzone > 0.0 {
                    (fraction - self.deadzone) / (1.0 - self.deadzone)
                } else {
                    fraction
                }
            }
        }
    }
}

fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else if deadzone > 0.0 {
        // Rescale the value to the range outside the deadzone
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    } else {
        value
    }
}

fn hat_index(code: u16) -> Option<u8> {
    if (HAT_FIRST..=HAT_LAST).contains(&code) {
        Some(((code - HAT_FIRST) / 2) as u8)
    } else {
        None
    }
}

/// Exclusive owner of one open device handle plus the raw state it has
/// accumulated since open.
///
/// `read_latest` never blocks: it drains whatever events the kernel has
/// queued and snapshots the accumulator. No two instances may hold the
/// same path open at once; the pool guarantees that by diffing paths.
pub struct Joystick {
    path: PathBuf,
    name: String,
    device: Option<Device>,
    buttons: Vec<KeyCode>,
    calibration: HashMap<u16, AxisCalibration>,
    hat_positions: HashMap<u8, (i8, i8)>,
    state: JoystickState,
}

impl Joystick {
    /// Opens a device using the kernel-reported axis ranges for
    /// calibration. Centered layout and no deadzone for every axis.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        Self::open_inner(path.as_ref(), None)
    }

    /// Opens a device and applies the description's calibration overrides.
    ///
    /// Declared signals seed the accumulator at their rest values so they
    /// are visible before the hardware first reports them.
    pub fn open_with_description(
        path: impl AsRef<Path>,
        description: &DeviceDescription,
    ) -> Result<Self, DeviceError> {
        Self::open_inner(path.as_ref(), Some(description))
    }

    fn open_inner(path: &Path, description: Option<&DeviceDescription>) -> Result<Self, DeviceError> {
        let device = Device::open(path)
            .map_err(|e| DeviceError::Unavailable(format!("{}: {}", path.display(), e)))?;
        device
            .set_nonblocking(true)
            .map_err(|e| DeviceError::Unavailable(format!("{}: {}", path.display(), e)))?;

        let name = device.name().unwrap_or("Unknown").to_string();

        let mut calibration = HashMap::new();
        if let Ok(abs_info) = device.get_absinfo() {
            for (axis, info) in abs_info {
                if hat_index(axis.0).is_some() {
                    continue;
                }
                calibration.insert(
                    axis.0,
                    AxisCalibration {
                        min: info.minimum(),
                        max: info.maximum(),
                        deadzone: 0.0,
                        kind: AxisKind::Centered,
                    },
                );
            }
        }

        let buttons: Vec<KeyCode> = device
            .supported_keys()
            .map(|keys| keys.iter().collect())
            .unwrap_or_default();

        let mut state = JoystickState::new();
        if let Some(description) = description {
            for axis in &description.axes {
                let entry = calibration.entry(axis.code).or_insert(AxisCalibration {
                    min: DEFAULT_AXIS_MIN,
                    max: DEFAULT_AXIS_MAX,
                    deadzone: 0.0,
                    kind: AxisKind::Centered,
                });
                if let Some(min) = axis.min {
                    entry.min = min;
                }
                if let Some(max) = axis.max {
                    entry.max = max;
                }
                entry.deadzone = axis.deadzone;
                entry.kind = axis.kind;
            }
            state = description.build_state();
        }

        debug!(
            "Opened {} at {}: {} axes, {} buttons",
            name,
            path.display(),
            calibration.len(),
            buttons.len()
        );

        Ok(Joystick {
            path: path.to_path_buf(),
            name,
            device: Some(device),
            buttons,
            calibration,
            hat_positions: HashMap::new(),
            state,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drains all pending hardware events into the accumulator and returns
    /// a snapshot of it.
    ///
    /// With nothing pending the previous snapshot comes back unchanged, so
    /// a quiet device still reports its last known state. A read failure
    /// closes the handle and surfaces as [`DeviceError::Disconnected`].
    pub fn read_latest(&mut self) -> Result<JoystickState, DeviceError> {
        let device = self.device.as_mut().ok_or_else(|| {
            DeviceError::Disconnected(format!("{}: handle already closed", self.path.display()))
        })?;

        let mut drained = Vec::new();
        let mut failure = None;
        match device.fetch_events() {
            Ok(events) => drained.extend(events),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // Nothing pending since the last read.
            }
            Err(e) => failure = Some(e),
        }

        if let Some(e) = failure {
            let reason = format!("{}: {}", self.path.display(), e);
            self.close();
            return Err(DeviceError::Disconnected(reason));
        }

        for event in drained {
            match event.destructure() {
                EventSummary::Key(_, key, value) => {
                    if self.buttons.contains(&key) {
                        self.state.buttons.insert(key.code(), value != 0);
                    }
                }
                EventSummary::AbsoluteAxis(_, axis, value) => {
                    if let Some(index) = hat_index(axis.0) {
                        let position = self.hat_positions.entry(index).or_insert((0, 0));
                        if (axis.0 - HAT_FIRST) % 2 == 0 {
                            position.0 = value.signum() as i8;
                        } else {
                            position.1 = value.signum() as i8;
                        }
                        self.state
                            .hats
                            .insert(index, HatDirection::from_xy(position.0, position.1));
                    } else if let Some(calibration) = self.calibration.get(&axis.0) {
                        self.state.axes.insert(axis.0, calibration.normalize(value));
                    }
                }
                _ => (),
            }
        }

        Ok(self.state.clone())
    }

    /// Releases the handle. Idempotent; reads afterwards report
    /// [`DeviceError::Disconnected`].
    pub fn close(&mut self) {
        if self.device.take().is_some() {
            info!("Closed {} at {}", self.name, self.path.display());
        }
    }
}
