//! WiFi connection logic and the radio stack seam.
//!
//! # Components
//!
//! - [`WifiController`] - connection state machine driving every
//!   provisioning operation
//! - [`WifiStack`] - command seam between the controller and a radio
//! - [`EventBridge`] - shared routing of radio events back into waiting
//!   operations
//! - `EspWifiStack` - ESP-IDF radio behind the seam (ESP32 only)
//! - `SimStack` - scripted radio for host builds and tests
//!
//! The controller never talks to ESP-IDF directly. Everything
//! platform-specific sits behind [`WifiStack`], which is why the whole
//! connection flow runs unmodified on a development machine.

mod controller;
mod events;
mod signal;
mod stack;

#[cfg(feature = "esp32")]
mod esp;
#[cfg(not(feature = "esp32"))]
mod sim;

pub use controller::{WifiController, WifiError};
pub use events::{ConnectionMode, EventBridge, FollowUp, StackEvent};
pub use stack::{StackError, WifiStack};

#[cfg(feature = "esp32")]
pub use esp::EspWifiStack;
#[cfg(not(feature = "esp32"))]
pub use sim::{SimNetwork, SimProbe, SimStack};
