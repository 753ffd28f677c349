use evdev::{AbsoluteAxisCode, Device, KeyCode};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

const INPUT_DIR: &str = "/dev/input";

/// A discovered input device: where to open it and how it identifies itself.
#[derive(Debug, Clone)]
pub struct DeviceItem {
    pub path: PathBuf,
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Scans the input subsystem once and returns the joystick-like devices
/// currently visible.
///
/// Every device node is probed independently; nodes that cannot be opened
/// (permissions, races with unplugging) are logged and skipped so a single
/// inaccessible device never hides the others. If the subsystem directory
/// itself cannot be read the scan degrades to an empty list.
///
/// Results are sorted by path so repeated scans are deterministic, but
/// callers should still match on identity rather than position.
pub fn list_devices() -> Vec<DeviceItem> {
    let entries = match fs::read_dir(INPUT_DIR) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to scan {}: {}", INPUT_DIR, e);
            return Vec::new();
        }
    };

    let mut items = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let is_event_node = path
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.starts_with("event"));
        if !is_event_node {
            continue;
        }

        let device = match Device::open(&path) {
            Ok(device) => device,
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        if !is_joystick(&device) {
            continue;
        }

        let input_id = device.input_id();
        let item = DeviceItem {
            path,
            name: device.name().unwrap_or("Unknown").to_string(),
            vendor_id: input_id.vendor(),
            product_id: input_id.product(),
        };
        debug!(
            "Found {} at {} ({:04x}:{:04x})",
            item.name,
            item.path.display(),
            item.vendor_id,
            item.product_id
        );
        items.push(item);
    }

    items.sort_by(|a, b| a.path.cmp(&b.path));
    items
}

/// Keyboards and mice live on the same bus; require an absolute X axis plus
/// a joystick- or gamepad-class button before treating a node as a stick.
fn is_joystick(device: &Device) -> bool {
    let has_class_button = device.supported_keys().map_or(false, |keys| {
        keys.contains(KeyCode::BTN_SOUTH) || keys.contains(KeyCode::BTN_TRIGGER)
    });
    let has_absolute_x = device
        .supported_absolute_axes()
        .map_or(false, |axes| axes.contains(AbsoluteAxisCode::ABS_X));
    has_class_button && has_absolute_x
}
