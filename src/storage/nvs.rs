//! Credential persistence in ESP32 Non-Volatile Storage.
//!
//! Credentials live in the `wifi_settings` namespace under the `ssid` and
//! `password` keys, so a device provisioned by an earlier firmware keeps
//! its network across an upgrade.
//!
//! # Usage
//!
//! ```ignore
//! use wifi_provision_esp32::storage::{CredentialStore, NvsCredentialStore};
//!
//! let partition = wifi_provision_esp32::nvs_default_partition()?;
//! let store = NvsCredentialStore::new(partition)?;
//! let creds = store.load()?;
//! log::info!("Provisioned for: {}", creds.ssid);
//! ```

use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_sys::EspError;
use log::info;
use zeroize::Zeroize;

use crate::config::{Credentials, MAX_PASSWORD_LEN, MAX_SSID_LEN};
use crate::storage::{CredentialStore, StoreError, KEY_PASSWORD, KEY_SSID, NVS_NAMESPACE};

/// Credential store backed by the default NVS partition.
pub struct NvsCredentialStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvsCredentialStore {
    /// Open the `wifi_settings` namespace on `partition`, creating it if
    /// this is the first boot.
    pub fn new(partition: EspNvsPartition<NvsDefault>) -> Result<Self, EspError> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;
        Ok(Self { nvs })
    }

    fn read_key(&self, key: &'static str, max: usize) -> Result<Option<String>, StoreError> {
        let len = match self.nvs.str_len(key).map_err(backend)? {
            Some(len) => len,
            None => return Ok(None),
        };
        // NVS reports the length including the NUL terminator
        if len > max + 1 {
            return Err(StoreError::ValueTooLong {
                key,
                len: len.saturating_sub(1),
                max,
            });
        }

        let mut buf = vec![0u8; max + 1];
        let value = self
            .nvs
            .get_str(key, &mut buf)
            .map_err(backend)?
            .map(|s| s.trim_end_matches('\0').to_string());
        buf.zeroize();
        Ok(value)
    }

    /// Write one key and read it back to catch silent flash write failures.
    fn write_key(&mut self, key: &'static str, value: &str) -> Result<(), StoreError> {
        self.nvs.set_str(key, value).map_err(|e| StoreError::Write {
            key,
            reason: e.to_string(),
        })?;

        let mut buf = vec![0u8; value.len() + 1];
        let result = match self.nvs.get_str(key, &mut buf) {
            Ok(Some(read)) if read.trim_end_matches('\0') == value => Ok(()),
            Ok(_) => Err(StoreError::Write {
                key,
                reason: "read-back mismatch after write".to_string(),
            }),
            Err(e) => Err(StoreError::Write {
                key,
                reason: e.to_string(),
            }),
        };
        buf.zeroize();
        result
    }
}

impl CredentialStore for NvsCredentialStore {
    fn load(&self) -> Result<Credentials, StoreError> {
        let ssid = match self.read_key(KEY_SSID, MAX_SSID_LEN)? {
            Some(ssid) => ssid,
            None => return Err(StoreError::NotProvisioned),
        };
        // A device provisioned for an open network has no password key
        let password = self
            .read_key(KEY_PASSWORD, MAX_PASSWORD_LEN)?
            .unwrap_or_default();
        Ok(Credentials::new(ssid, password)?)
    }

    fn save(&mut self, creds: &Credentials) -> Result<(), StoreError> {
        self.write_key(KEY_SSID, &creds.ssid)?;
        self.write_key(KEY_PASSWORD, &creds.password)?;
        info!("WiFi credentials for {} saved and verified in NVS", creds.ssid);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        for key in [KEY_SSID, KEY_PASSWORD] {
            self.nvs.remove(key).map_err(backend)?;
        }
        info!("WiFi credentials cleared from NVS");
        Ok(())
    }
}

fn backend(e: EspError) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[cfg(all(feature = "esp32", feature = "tap-tests"))]
mod tap_tests {
    use super::*;
    use wifi_provision_esp32_macros::tap_test;

    #[tap_test]
    fn nvs_credentials_roundtrip() {
        let partition = crate::nvs_default_partition().expect("NVS partition unavailable");
        let mut store = NvsCredentialStore::new(partition).expect("failed to open NVS namespace");

        // Keep whatever the device is provisioned with
        let previous = store.load().ok();

        let creds = Credentials::new("RoundtripNet", "roundtrip-pass").unwrap();
        store.save(&creds).expect("save failed");
        let loaded = store.load().expect("load after save failed");
        assert_eq!(loaded.ssid, "RoundtripNet");
        assert_eq!(loaded.password, "roundtrip-pass");

        store.clear().expect("clear failed");
        assert!(matches!(store.load(), Err(StoreError::NotProvisioned)));

        if let Some(previous) = previous {
            store.save(&previous).expect("failed to restore credentials");
        }
    }

    #[tap_test]
    fn nvs_open_network_has_no_password() {
        let partition = crate::nvs_default_partition().expect("NVS partition unavailable");
        let mut store = NvsCredentialStore::new(partition).expect("failed to open NVS namespace");

        let previous = store.load().ok();

        let creds = Credentials::open("OpenRoundtrip").unwrap();
        store.save(&creds).expect("save failed");
        let loaded = store.load().expect("load after save failed");
        assert!(loaded.is_open());

        store.clear().expect("clear failed");
        if let Some(previous) = previous {
            store.save(&previous).expect("failed to restore credentials");
        }
    }
}
