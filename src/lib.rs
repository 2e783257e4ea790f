//! Wi-Fi provisioning for ESP32 devices.
//!
//! On boot the device tries to join the network whose credentials are
//! stored in NVS. When nothing is stored or the join fails, it stands up
//! its own access point with a captive configuration portal (HTTP plus a
//! catch-all DNS responder) where a phone submits new credentials, which
//! are persisted and connected to on the spot.
//!
//! The radio sits behind the [`wifi::WifiStack`] trait, so the whole flow
//! also runs on a development host against a simulated stack.

// Allow the crate to reference itself by name (needed for proc-macro generated code)
extern crate self as wifi_provision_esp32;

pub mod config;
pub mod portal;
pub mod provision;
pub mod storage;
#[cfg(feature = "tap-tests")]
pub mod testing;
pub mod wifi;

// Re-export commonly used items
pub use config::{AuthMode, ConfigError, ConnectionOutcome, Credentials, NetworkRecord};
pub use portal::{ConfigServer, PortalError};
pub use provision::WifiProvisioning;
pub use storage::{CredentialStore, StoreError};
pub use wifi::{ConnectionMode, WifiController, WifiError};

// Re-export testing items (only with tap-tests feature)
#[cfg(feature = "tap-tests")]
pub use testing::TestRunner;

/// Take the default NVS partition, sharing one handle across the process.
///
/// `EspDefaultNvsPartition::take()` succeeds only once per boot; the radio
/// driver, the credential store and the device tests all go through here
/// so they end up holding the same partition.
#[cfg(feature = "esp32")]
pub fn nvs_default_partition(
) -> Result<esp_idf_svc::nvs::EspDefaultNvsPartition, esp_idf_sys::EspError> {
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use std::sync::Mutex;

    static PARTITION: Mutex<Option<EspDefaultNvsPartition>> = Mutex::new(None);

    let mut guard = PARTITION.lock().unwrap();
    if let Some(partition) = guard.as_ref() {
        return Ok(partition.clone());
    }
    let partition = EspDefaultNvsPartition::take()?;
    *guard = Some(partition.clone());
    Ok(partition)
}
