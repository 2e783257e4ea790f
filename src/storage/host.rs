//! File-backed credential store for host (development) builds.
//!
//! Persists credentials as JSON under `~/.wifi-provision-esp32/` so the
//! host demo behaves like a provisioned device across runs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{CredentialStore, StoreError};
use crate::config::Credentials;

/// On-disk record. Mirrors [`Credentials`] so the secret type itself does
/// not grow serde impls.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct StoredCredentials {
    ssid: String,
    password: String,
}

/// Credential store backed by a JSON file.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store at the default location, `~/.wifi-provision-esp32/credentials.json`.
    pub fn new() -> Result<Self, StoreError> {
        Ok(Self {
            path: default_store_path().map_err(|e| StoreError::Backend(e.to_string()))?,
        })
    }

    /// Store at a specific path (used by tests).
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Where this store persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Default credential file path.
///
/// Returns `~/.wifi-provision-esp32/credentials.json`.
pub fn default_store_path() -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home)
        .join(".wifi-provision-esp32")
        .join("credentials.json"))
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Credentials, StoreError> {
        let mut raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no credential file at {:?}", self.path);
                return Err(StoreError::NotProvisioned);
            }
            Err(e) => return Err(StoreError::Backend(format!("reading {:?}: {}", self.path, e))),
        };

        let stored: StoredCredentials = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                raw.zeroize();
                return Err(StoreError::Backend(format!(
                    "parsing {:?}: {}",
                    self.path, e
                )));
            }
        };
        raw.zeroize();

        Ok(Credentials::new(stored.ssid.clone(), stored.password.clone())?)
    }

    fn save(&mut self, creds: &Credentials) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Write {
                key: super::KEY_SSID,
                reason: format!("creating {:?}: {}", parent, e),
            })?;
        }

        let stored = StoredCredentials {
            ssid: creds.ssid.clone(),
            password: creds.password.clone(),
        };
        let json = serde_json::to_string(&stored).map_err(|e| StoreError::Write {
            key: super::KEY_SSID,
            reason: e.to_string(),
        })?;
        fs::write(&self.path, &json).map_err(|e| StoreError::Write {
            key: super::KEY_SSID,
            reason: format!("writing {:?}: {}", self.path, e),
        })?;

        // Verify the write by reading back
        let read_back = fs::read_to_string(&self.path).map_err(|e| StoreError::Write {
            key: super::KEY_PASSWORD,
            reason: format!("verifying {:?}: {}", self.path, e),
        })?;
        if read_back != json {
            return Err(StoreError::Write {
                key: super::KEY_PASSWORD,
                reason: "verification mismatch after write".to_string(),
            });
        }

        info!("credentials for \"{}\" saved to {:?}", creds.ssid, self.path);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("credentials cleared from {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Backend(format!(
                "removing {:?}: {}",
                self.path, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::atomic::{AtomicU32, Ordering};

    // Counter to ensure unique test files even in parallel execution
    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_store() -> FileCredentialStore {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        FileCredentialStore::at(env::temp_dir().join(format!("wifi-provision-test-{}-{}.json", pid, id)))
    }

    #[test]
    fn test_file_store_roundtrip() {
        let mut store = unique_store();
        let creds = Credentials::new("Home", "password123").unwrap();

        store.save(&creds).unwrap();
        assert_eq!(store.load().unwrap(), creds);

        store.clear().unwrap();
        assert!(matches!(store.load(), Err(StoreError::NotProvisioned)));
    }

    #[test]
    fn test_missing_file_is_not_provisioned() {
        let store = unique_store();
        assert!(matches!(store.load(), Err(StoreError::NotProvisioned)));
    }

    #[test]
    fn test_corrupted_file_is_backend_error() {
        let store = unique_store();
        fs::write(store.path(), "not json at all").unwrap();
        assert!(matches!(store.load(), Err(StoreError::Backend(_))));
        let _ = fs::remove_file(store.path());
    }

    #[test]
    fn test_invalid_stored_values_rejected() {
        let store = unique_store();
        // Bypass save() to plant an out-of-bounds password
        let bogus = format!(
            "{{\"ssid\":\"Home\",\"password\":\"{}\"}}",
            "a".repeat(65)
        );
        fs::write(store.path(), bogus).unwrap();
        assert!(matches!(store.load(), Err(StoreError::Invalid(_))));
        let _ = fs::remove_file(store.path());
    }

    #[test]
    fn test_clear_when_missing_is_ok() {
        let mut store = unique_store();
        assert!(store.clear().is_ok());
    }

    #[test]
    fn test_open_network_roundtrip() {
        let mut store = unique_store();
        let creds = Credentials::open("CafeFree").unwrap();
        store.save(&creds).unwrap();
        assert!(store.load().unwrap().is_open());
        store.clear().unwrap();
    }
}
