//! Wi-Fi credential and network data structures.
//!
//! This module contains the platform-independent types shared by the
//! connection logic, the credential store and the captive portal, so they
//! can be tested on the host machine.
//!
//! # Example
//!
//! ```
//! use wifi_provision_esp32::config::Credentials;
//!
//! let creds = Credentials::new("MyNetwork", "MyPassword").unwrap();
//! assert!(!creds.is_open());
//! assert!(Credentials::new("", "MyPassword").is_err());
//! ```

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum password length for WPA2.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Minimum password length for WPA2.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Station connect timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Network scan timeout in seconds.
pub const SCAN_TIMEOUT_SECS: u64 = 20;

/// Wi-Fi credentials for joining or announcing a network.
///
/// Both fields are wiped when the value is dropped. `Debug` prints the
/// password length only, never its contents.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    /// Network SSID (1-32 bytes).
    pub ssid: String,
    /// Network password (8-64 bytes for WPA2, empty for open networks).
    pub password: String,
}

impl Credentials {
    /// Create a new credential pair.
    ///
    /// Returns an error if SSID or password are invalid.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let creds = Self {
            ssid: ssid.into(),
            password: password.into(),
        };
        creds.validate()?;
        Ok(creds)
    }

    /// Create credentials for an open network (no password).
    pub fn open(ssid: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(ssid, String::new())
    }

    /// Validate the credential pair.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.is_empty() {
            return Err(ConfigError::SsidEmpty);
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::SsidTooLong {
                len: self.ssid.len(),
                max: MAX_SSID_LEN,
            });
        }

        // Empty password is OK (open network)
        if !self.password.is_empty() && self.password.len() < MIN_PASSWORD_LEN {
            return Err(ConfigError::PasswordTooShort {
                len: self.password.len(),
                min: MIN_PASSWORD_LEN,
            });
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(ConfigError::PasswordTooLong {
                len: self.password.len(),
                max: MAX_PASSWORD_LEN,
            });
        }

        Ok(())
    }

    /// Check if this is an open network (no password).
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password_len", &self.password.len())
            .finish()
    }
}

/// Errors that can occur during credential validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password is too short for WPA2.
    PasswordTooShort { len: usize, min: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooShort { len, min } => {
                write!(f, "password too short: {} bytes (min {})", len, min)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Authentication mode of a scanned network.
///
/// The discriminants match the ESP-IDF auth-mode codes so the value can be
/// reported as-is on the portal's JSON surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthMode {
    Open = 0,
    Wep = 1,
    WpaPsk = 2,
    Wpa2Psk = 3,
    WpaWpa2Psk = 4,
    Wpa2Enterprise = 5,
    Wpa3Psk = 6,
    Wpa2Wpa3Psk = 7,
    Wapi = 8,
}

impl AuthMode {
    /// Wire code used by the portal's scan list.
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Whether the network requires a password.
    pub fn is_secured(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Wep => "WEP",
            Self::WpaPsk => "WPA-PSK",
            Self::Wpa2Psk => "WPA2-PSK",
            Self::WpaWpa2Psk => "WPA/WPA2-PSK",
            Self::Wpa2Enterprise => "WPA2-Enterprise",
            Self::Wpa3Psk => "WPA3-PSK",
            Self::Wpa2Wpa3Psk => "WPA2/WPA3-PSK",
            Self::Wapi => "WAPI",
        };
        write!(f, "{}", name)
    }
}

#[cfg(feature = "esp32")]
impl From<Option<esp_idf_svc::wifi::AuthMethod>> for AuthMode {
    fn from(method: Option<esp_idf_svc::wifi::AuthMethod>) -> Self {
        use esp_idf_svc::wifi::AuthMethod;
        match method {
            None | Some(AuthMethod::None) => Self::Open,
            Some(AuthMethod::WEP) => Self::Wep,
            Some(AuthMethod::WPA) => Self::WpaPsk,
            Some(AuthMethod::WPA2Personal) => Self::Wpa2Psk,
            Some(AuthMethod::WPAWPA2Personal) => Self::WpaWpa2Psk,
            Some(AuthMethod::WPA2Enterprise) => Self::Wpa2Enterprise,
            Some(AuthMethod::WPA3Personal) => Self::Wpa3Psk,
            Some(AuthMethod::WPA2WPA3Personal) => Self::Wpa2Wpa3Psk,
            Some(AuthMethod::WAPIPersonal) => Self::Wapi,
        }
    }
}

/// One network found by a scan cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRecord {
    /// Network SSID (may be empty for hidden networks).
    pub ssid: String,
    /// Received signal strength in dBm.
    pub rssi: i8,
    /// Authentication mode.
    pub auth_mode: AuthMode,
}

/// Terminal result of an auto-connect attempt, delivered via callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Connected to the named network and acquired an IP address.
    Connected(String),
    /// The attempt failed; carries the SSID that was tried (possibly empty
    /// when no credentials were stored).
    Failed(String),
}

impl ConnectionOutcome {
    /// The SSID the outcome refers to.
    pub fn ssid(&self) -> &str {
        match self {
            Self::Connected(ssid) | Self::Failed(ssid) => ssid,
        }
    }

    /// Whether the attempt succeeded.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

impl fmt::Display for ConnectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected(ssid) => write!(f, "connected to \"{}\"", ssid),
            Self::Failed(ssid) if ssid.is_empty() => write!(f, "connection failed"),
            Self::Failed(ssid) => write!(f, "connection to \"{}\" failed", ssid),
        }
    }
}

/// Callback invoked exactly once with the result of an auto-connect.
pub type ConnectCallback = Box<dyn FnOnce(ConnectionOutcome) + Send>;

/// Callback invoked with a non-empty scan result.
pub type ScanCallback = Box<dyn FnOnce(Vec<NetworkRecord>) + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Credentials Tests ====================

    #[test]
    fn test_valid_credentials() {
        let creds = Credentials::new("TestNetwork", "password123").unwrap();
        assert_eq!(creds.ssid, "TestNetwork");
        assert_eq!(creds.password, "password123");
        assert!(creds.validate().is_ok());
    }

    #[test]
    fn test_open_network() {
        let creds = Credentials::open("OpenNetwork").unwrap();
        assert!(creds.is_open());
        assert!(creds.validate().is_ok());
    }

    #[test]
    fn test_empty_ssid() {
        let result = Credentials::new("", "password123");
        assert_eq!(result, Err(ConfigError::SsidEmpty));
    }

    #[test]
    fn test_ssid_too_long() {
        let long_ssid = "a".repeat(33);
        let result = Credentials::new(long_ssid, "password123");
        assert!(matches!(result, Err(ConfigError::SsidTooLong { .. })));
    }

    #[test]
    fn test_ssid_max_length() {
        let max_ssid = "a".repeat(32);
        let creds = Credentials::new(max_ssid, "password123").unwrap();
        assert!(creds.validate().is_ok());
    }

    #[test]
    fn test_password_too_short() {
        let result = Credentials::new("TestNetwork", "short");
        assert!(matches!(result, Err(ConfigError::PasswordTooShort { .. })));
    }

    #[test]
    fn test_password_min_length() {
        let creds = Credentials::new("TestNetwork", "12345678").unwrap();
        assert!(creds.validate().is_ok());
    }

    #[test]
    fn test_password_too_long() {
        let long_password = "a".repeat(65);
        let result = Credentials::new("TestNetwork", long_password);
        assert!(matches!(result, Err(ConfigError::PasswordTooLong { .. })));
    }

    #[test]
    fn test_password_max_length() {
        let max_password = "a".repeat(64);
        let creds = Credentials::new("TestNetwork", max_password).unwrap();
        assert!(creds.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("TestNetwork", "supersecret").unwrap();
        let debug = format!("{:?}", creds);
        assert!(debug.contains("TestNetwork"));
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("password_len"));
    }

    // ==================== AuthMode Tests ====================

    #[test]
    fn test_auth_mode_codes() {
        assert_eq!(AuthMode::Open.code(), 0);
        assert_eq!(AuthMode::Wpa2Psk.code(), 3);
        assert_eq!(AuthMode::WpaWpa2Psk.code(), 4);
        assert_eq!(AuthMode::Wapi.code(), 8);
    }

    #[test]
    fn test_auth_mode_secured() {
        assert!(!AuthMode::Open.is_secured());
        assert!(AuthMode::Wpa2Psk.is_secured());
        assert!(AuthMode::Wep.is_secured());
    }

    // ==================== ConnectionOutcome Tests ====================

    #[test]
    fn test_outcome_accessors() {
        let ok = ConnectionOutcome::Connected("Home".to_string());
        assert!(ok.is_connected());
        assert_eq!(ok.ssid(), "Home");

        let failed = ConnectionOutcome::Failed("Home".to_string());
        assert!(!failed.is_connected());
        assert_eq!(failed.ssid(), "Home");
    }

    #[test]
    fn test_outcome_display() {
        let ok = ConnectionOutcome::Connected("Home".to_string());
        assert_eq!(ok.to_string(), "connected to \"Home\"");

        let anonymous = ConnectionOutcome::Failed(String::new());
        assert_eq!(anonymous.to_string(), "connection failed");
    }
}
