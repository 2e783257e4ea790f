//! WiFi credential seeding utility.
//!
//! Writes an SSID and password into the credential store so the device (or
//! the host demo) connects on the next boot without going through the
//! captive portal.
//!
//! Usage:
//!   WIFI_SSID="MyNetwork" WIFI_PASSWORD="secret" cargo run --bin configure-wifi
//!
//! For open networks (no password):
//!   WIFI_SSID="OpenNetwork" WIFI_PASSWORD="" cargo run --bin configure-wifi
//!
//! On the device, build with `--features esp32` for the Xtensa target and
//! flash; the credentials land in NVS and persist across reboots.

use wifi_provision_esp32::config::{ConfigError, Credentials};

/// Network SSID, baked in from the WIFI_SSID environment variable at
/// compile time.
const WIFI_SSID: Option<&str> = option_env!("WIFI_SSID");

/// Network password, baked in from WIFI_PASSWORD at compile time. Empty
/// string for open networks.
const WIFI_PASSWORD: Option<&str> = option_env!("WIFI_PASSWORD");

/// Print an error message and terminate. Pauses briefly on the device so
/// the serial monitor shows the output before the process exits.
fn halt_with_error(msg: &str) -> ! {
    eprintln!("\n{}", msg);
    eprintln!("\n=== Configuration failed ===\n");
    #[cfg(feature = "esp32")]
    std::thread::sleep(std::time::Duration::from_secs(2));
    std::process::exit(1);
}

/// Read and validate the compile-time credentials.
fn credentials_from_build_env() -> Credentials {
    let ssid = match WIFI_SSID {
        Some(s) if !s.is_empty() => s,
        _ => {
            halt_with_error(
                "Error: WIFI_SSID environment variable not set at compile time.\n\n\
                 Usage:\n  \
                 WIFI_SSID=\"MyNetwork\" WIFI_PASSWORD=\"secret\" cargo run --bin configure-wifi\n\n\
                 For open networks:\n  \
                 WIFI_SSID=\"OpenNetwork\" WIFI_PASSWORD=\"\" cargo run --bin configure-wifi",
            );
        }
    };

    let password = WIFI_PASSWORD.unwrap_or("");

    println!("SSID: {}", ssid);
    println!(
        "Password: {} ({} chars)",
        if password.is_empty() {
            "(none)"
        } else {
            "****"
        },
        password.len()
    );

    match Credentials::new(ssid, password) {
        Ok(creds) => creds,
        Err(ConfigError::SsidEmpty) => {
            halt_with_error("Error: SSID cannot be empty");
        }
        Err(ConfigError::SsidTooLong { len, max }) => {
            halt_with_error(&format!("Error: SSID too long ({} bytes, max {})", len, max));
        }
        Err(ConfigError::PasswordTooShort { len, min }) => {
            halt_with_error(&format!(
                "Error: Password too short ({} bytes, min {} for WPA)",
                len, min
            ));
        }
        Err(ConfigError::PasswordTooLong { len, max }) => {
            halt_with_error(&format!(
                "Error: Password too long ({} bytes, max {})",
                len, max
            ));
        }
    }
}

#[cfg(feature = "esp32")]
fn main() {
    use wifi_provision_esp32::storage::{CredentialStore, NvsCredentialStore};

    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    println!("\n=== WiFi Configuration Utility ===\n");

    let creds = credentials_from_build_env();

    let partition = match wifi_provision_esp32::nvs_default_partition() {
        Ok(partition) => partition,
        Err(e) => {
            halt_with_error(&format!("Error initializing NVS: {}", e));
        }
    };
    let mut store = match NvsCredentialStore::new(partition) {
        Ok(store) => store,
        Err(e) => {
            halt_with_error(&format!("Error opening NVS namespace: {}", e));
        }
    };

    match store.save(&creds) {
        Ok(()) => {
            println!("\n=== WiFi configuration saved to NVS ===");
            println!("\nThe device will use these credentials on the next boot.");
            println!("Credentials persist across reboots.");
        }
        Err(e) => {
            halt_with_error(&format!("Error saving to NVS: {}", e));
        }
    }

    println!("\n=== Done - you can disconnect the device ===\n");

    // Pause so the serial output is visible over the monitor, then exit
    std::thread::sleep(std::time::Duration::from_secs(2));
}

#[cfg(not(feature = "esp32"))]
fn main() {
    use wifi_provision_esp32::storage::{CredentialStore, FileCredentialStore};

    println!("\n=== WiFi Configuration Utility ===\n");

    let creds = credentials_from_build_env();

    let mut store = match FileCredentialStore::new() {
        Ok(store) => store,
        Err(e) => {
            halt_with_error(&format!("Error opening credential file: {}", e));
        }
    };

    match store.save(&creds) {
        Ok(()) => {
            println!("\nCredentials saved to {:?}", store.path());
            println!("The host demo will use them on its next run.");
        }
        Err(e) => {
            halt_with_error(&format!("Error saving credentials: {}", e));
        }
    }
}
