use crate::device::enumerator::DeviceItem;
use crate::device::state::{HatDirection, JoystickState};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Errors raised while loading a device description file.
///
/// All of these are fatal to pool construction: a pool built on broken
/// descriptions cannot match anything usefully.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read description file: {0}")]
    ReadError(String),

    #[error("Failed to parse description file: {0}")]
    ParseError(String),

    #[error("Invalid description: {0}")]
    ValidationError(String),
}

/// How normalized axis values are laid out.
///
/// Centered axes rest in the middle and map to -1.0..1.0; throttle-like
/// axes rest at their minimum and map to 0.0..1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    #[default]
    Centered,
    Throttle,
}

/// Identity predicate for binding a description to a discovered device.
///
/// Every present field must hold for a device to match. Order of the
/// descriptions handed to the pool decides ties: first match wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchRule {
    /// Exact device name.
    pub name: Option<String>,
    /// Substring of the device name.
    pub name_contains: Option<String>,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

impl MatchRule {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.name_contains.is_none()
            && self.vendor_id.is_none()
            && self.product_id.is_none()
    }

    pub fn matches(&self, item: &DeviceItem) -> bool {
        if let Some(name) = &self.name {
            if item.name != *name {
                return false;
            }
        }
        if let Some(fragment) = &self.name_contains {
            if !item.name.contains(fragment.as_str()) {
                return false;
            }
        }
        if let Some(vendor_id) = self.vendor_id {
            if item.vendor_id != vendor_id {
                return false;
            }
        }
        if let Some(product_id) = self.product_id {
            if item.product_id != product_id {
                return false;
            }
        }
        true
    }
}

/// One declared analog axis with its calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisSpec {
    /// Raw evdev axis code.
    pub code: u16,
    /// Semantic label, e.g. "roll" or "throttle".
    pub alias: Option<String>,
    #[serde(default)]
    pub kind: AxisKind,
    /// Raw range override; the kernel-reported range is used when absent.
    pub min: Option<i32>,
    pub max: Option<i32>,
    /// Band around the rest value, in normalized units, collapsed to rest.
    #[serde(default)]
    pub deadzone: f32,
}

/// One declared button.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonSpec {
    /// Raw evdev key code.
    pub code: u16,
    pub alias: Option<String>,
}

/// One declared hat switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HatSpec {
    /// Hat number on the device, 0-based.
    pub index: u8,
    pub alias: Option<String>,
}

/// Parsed, immutable description of one device: identity predicate plus
/// semantic labels and calibration for its inputs.
///
/// Loaded from TOML once at pool construction and shared read-only with
/// the worker that ends up matching it. `device_name` keys the published
/// snapshots, so it must be unique within a pool.
///
/// ```toml
/// device_name = "T.16000M"
/// author = "flightdeck"
/// created = "2024-05-01"
///
/// [match]
/// name_contains = "T.16000M"
/// vendor_id = 0x044f
///
/// [[axes]]
/// code = 0
/// alias = "roll"
/// deadzone = 0.05
///
/// [[buttons]]
/// code = 288
/// alias = "trigger"
///
/// [[hats]]
/// index = 0
/// alias = "pov"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDescription {
    #[serde(default = "default_device_name")]
    pub device_name: String,
    pub author: Option<String>,
    /// ISO date string, e.g. "2024-05-01".
    pub created: Option<NaiveDate>,
    pub description: Option<String>,
    /// Identity predicate; exact match on `device_name` when absent.
    #[serde(rename = "match")]
    pub match_rule: Option<MatchRule>,
    #[serde(default)]
    pub axes: Vec<AxisSpec>,
    #[serde(default)]
    pub buttons: Vec<ButtonSpec>,
    #[serde(default)]
    pub hats: Vec<HatSpec>,
}

fn default_device_name() -> String {
    "Unknown Device".to_string()
}

impl DeviceDescription {
    /// Loads and validates a description from a TOML file.
    pub fn from_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        let description: DeviceDescription = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
        description
            .validate()
            .map_err(|reason| ConfigError::ValidationError(format!("{}: {}", path.display(), reason)))?;
        debug!(
            "Loaded description \"{}\" ({} axes, {} buttons, {} hats)",
            description.device_name,
            description.axes.len(),
            description.buttons.len(),
            description.hats.len()
        );
        Ok(description)
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(rule) = &self.match_rule {
            if rule.is_empty() {
                return Err("[match] must name at least one predicate".to_string());
            }
        }

        let mut axis_codes = HashSet::new();
        for axis in &self.axes {
            if !(0.0..1.0).contains(&axis.deadzone) {
                return Err(format!(
                    "axis {} deadzone {} outside [0, 1)",
                    axis.code, axis.deadzone
                ));
            }
            if let (Some(min), Some(max)) = (axis.min, axis.max) {
                if min >= max {
                    return Err(format!("axis {} range {}..{} is empty", axis.code, min, max));
                }
            }
            if !axis_codes.insert(axis.code) {
                return Err(format!("axis code {} declared twice", axis.code));
            }
        }

        let mut button_codes = HashSet::new();
        for button in &self.buttons {
            if !button_codes.insert(button.code) {
                return Err(format!("button code {} declared twice", button.code));
            }
        }

        let mut hat_indexes = HashSet::new();
        for hat in &self.hats {
            if !hat_indexes.insert(hat.index) {
                return Err(format!("hat index {} declared twice", hat.index));
            }
        }

        Ok(())
    }

    /// Whether this description binds to a discovered device.
    pub fn matches(&self, item: &DeviceItem) -> bool {
        match &self.match_rule {
            Some(rule) => rule.matches(item),
            None => item.name == self.device_name,
        }
    }

    /// Builds the rest-value state for every declared signal.
    ///
    /// This seeds a freshly opened device so declared signals are visible
    /// at rest before the hardware first reports them.
    pub fn build_state(&self) -> JoystickState {
        let mut state = JoystickState::new();
        for axis in &self.axes {
            state.axes.insert(axis.code, 0.0);
        }
        for button in &self.buttons {
            state.buttons.insert(button.code, false);
        }
        for hat in &self.hats {
            state.hats.insert(hat.index, HatDirection::Centered);
        }
        state
    }
}
