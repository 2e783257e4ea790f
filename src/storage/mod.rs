//! Credential persistence.
//!
//! The connection logic talks to storage through [`CredentialStore`], so the
//! same auto-connect and portal code runs against NVS on the device, a file
//! in the home directory on the host, and an in-memory store in tests.
//!
//! The stored record is two string keys, `ssid` and `password`, in one
//! namespace. A missing SSID means the device is not provisioned; a missing
//! password means an open network. Stored values over their bound are a
//! hard error, never silently truncated.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::config::{ConfigError, Credentials};

#[cfg(feature = "esp32")]
mod nvs;

#[cfg(not(feature = "esp32"))]
mod host;

#[cfg(feature = "esp32")]
pub use nvs::NvsCredentialStore;

#[cfg(not(feature = "esp32"))]
pub use host::FileCredentialStore;

/// NVS namespace holding the Wi-Fi settings.
pub const NVS_NAMESPACE: &str = "wifi_settings";

/// Key for the network SSID.
pub const KEY_SSID: &str = "ssid";

/// Key for the network password.
pub const KEY_PASSWORD: &str = "password";

/// Persistent credential storage.
pub trait CredentialStore: Send {
    /// Load the stored credentials.
    ///
    /// Returns [`StoreError::NotProvisioned`] when no SSID is stored. A
    /// missing password is treated as an open network.
    fn load(&self) -> Result<Credentials, StoreError>;

    /// Persist the credentials, SSID first. A failed save may have
    /// partially applied; the error names the key that failed.
    fn save(&mut self, creds: &Credentials) -> Result<(), StoreError>;

    /// Erase the stored credentials. Succeeds when nothing was stored.
    fn clear(&mut self) -> Result<(), StoreError>;
}

/// Credential storage errors.
#[derive(Debug)]
pub enum StoreError {
    /// No credentials have been stored.
    NotProvisioned,
    /// A stored value exceeds its bound.
    ValueTooLong {
        key: &'static str,
        len: usize,
        max: usize,
    },
    /// The stored values do not form valid credentials.
    Invalid(ConfigError),
    /// Writing one key failed.
    Write { key: &'static str, reason: String },
    /// The storage backend failed.
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotProvisioned => write!(f, "no credentials stored"),
            Self::ValueTooLong { key, len, max } => {
                write!(f, "stored {} too long: {} bytes (max {})", key, len, max)
            }
            Self::Invalid(e) => write!(f, "stored credentials invalid: {}", e),
            Self::Write { key, reason } => write!(f, "writing {} failed: {}", key, reason),
            Self::Backend(reason) => write!(f, "storage backend error: {}", reason),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Invalid(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for StoreError {
    fn from(e: ConfigError) -> Self {
        Self::Invalid(e)
    }
}

/// RAM-only credential store.
///
/// Cloning yields a handle onto the same slot, which is how tests observe
/// what the connection logic persisted.
#[derive(Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<Credentials>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start out provisioned with the given credentials.
    pub fn with_credentials(creds: Credentials) -> Self {
        let store = Self::new();
        *store.slot.lock().unwrap() = Some(creds);
        store
    }

    /// Current contents of the store.
    pub fn stored(&self) -> Option<Credentials> {
        self.slot.lock().unwrap().clone()
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Result<Credentials, StoreError> {
        let creds = self
            .slot
            .lock()
            .unwrap()
            .clone()
            .ok_or(StoreError::NotProvisioned)?;
        creds.validate()?;
        Ok(creds)
    }

    fn save(&mut self, creds: &Credentials) -> Result<(), StoreError> {
        *self.slot.lock().unwrap() = Some(creds.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.slot.lock().unwrap().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let mut store = MemoryStore::new();
        assert!(matches!(store.load(), Err(StoreError::NotProvisioned)));

        let creds = Credentials::new("Home", "password123").unwrap();
        store.save(&creds).unwrap();
        assert_eq!(store.load().unwrap(), creds);

        store.clear().unwrap();
        assert!(matches!(store.load(), Err(StoreError::NotProvisioned)));
    }

    #[test]
    fn test_memory_store_clone_shares_slot() {
        let mut store = MemoryStore::new();
        let observer = store.clone();

        let creds = Credentials::new("Home", "password123").unwrap();
        store.save(&creds).unwrap();
        assert_eq!(observer.stored(), Some(creds));
    }

    #[test]
    fn test_open_network_roundtrip() {
        let mut store = MemoryStore::new();
        let creds = Credentials::open("CafeFree").unwrap();
        store.save(&creds).unwrap();
        let loaded = store.load().unwrap();
        assert!(loaded.is_open());
        assert_eq!(loaded, creds);
    }

    #[test]
    fn test_clear_when_empty_is_ok() {
        let mut store = MemoryStore::new();
        assert!(store.clear().is_ok());
    }
}
