//! Debounced, non-blocking state reading for joystick/HID devices.
//!
//! The crate hides device enumeration, raw event decoding, and hardware
//! bounce behind two surfaces:
//!
//! - [`Joystick`] for direct, single-device use: open a path, call
//!   [`Joystick::read_latest`] whenever convenient.
//! - [`DevicePool`] for multi-device use: declare the devices you care
//!   about in TOML descriptions, then poll [`DevicePool::fetch_nowait`]
//!   from your own loop while the pool debounces each device on its own
//!   schedule.
//!
//! ```no_run
//! use stickpool::DevicePool;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), stickpool::PoolError> {
//! let pool = DevicePool::new(&["descriptions/t16000m.toml"], 0.05)?;
//! pool.reset().await;
//! let snapshot = pool.fetch_nowait();
//! for (device, state) in &snapshot {
//!     println!("{}: {:?}", device, state.axes);
//! }
//! pool.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod device;
pub mod pool;

pub use device::description::{
    AxisKind, AxisSpec, ButtonSpec, ConfigError, DeviceDescription, HatSpec, MatchRule,
};
pub use device::enumerator::{list_devices, DeviceItem};
pub use device::joystick::{AxisCalibration, DeviceError, Joystick};
pub use device::state::{HatDirection, JoystickState};
pub use pool::device_pool::{DevicePool, PoolError, PoolSettings};
