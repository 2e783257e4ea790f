//! Wi-Fi provisioning firmware binary.
//!
//! Tries the stored credentials first; when that fails the device becomes
//! an access point named [`AP_SSID`] with the captive configuration portal.
//! Built without the `esp32` feature, the same flow runs against the
//! simulated radio so the portal can be tried in a browser on the host.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use log::{error, info};

use wifi_provision_esp32::{ConnectionMode, ConnectionOutcome, WifiProvisioning};

/// Name of the configuration access point.
const AP_SSID: &str = "ESP32-Setup";

/// Password of the configuration access point. Empty means open.
const AP_PASSWORD: &str = "";

/// Run the provisioning flow on an already-built engine.
///
/// Blocks in a heartbeat loop. Once a station connection is up, provisioning
/// resources (portal, subscriptions) are released; the connection stays.
fn provision_and_monitor(provisioning: WifiProvisioning, portal_port: u16) {
    let (tx, rx) = mpsc::channel();
    provisioning.auto_connect(move |outcome| {
        let _ = tx.send(outcome);
    });

    let mut released = false;
    match rx.recv() {
        Ok(ConnectionOutcome::Connected(ssid)) => {
            info!("Connected to '{}', releasing provisioning resources", ssid);
            provisioning.stop();
            released = true;
        }
        _ => {
            error!("Auto-connect failed, starting the configuration portal");
            match provisioning.start_config_server(AP_SSID, AP_PASSWORD, portal_port) {
                Ok(()) => {
                    if let Some(addr) = provisioning.portal_addr() {
                        info!("Portal listening on {}", addr);
                    }
                }
                Err(e) => error!("Configuration portal failed to start: {}", e),
            }
        }
    }

    loop {
        thread::sleep(Duration::from_secs(5));

        // A portal submission flips the mode to Station; once the address
        // is up, the portal has done its job
        if !released
            && provisioning.mode() == ConnectionMode::Station
            && provisioning.connected_ip().is_some()
        {
            info!("Provisioned through the portal, releasing resources");
            provisioning.stop();
            released = true;
        }

        match provisioning.connected_ip() {
            Some(ip) => info!("IP address: {}", ip),
            None => info!("No address yet"),
        }
    }
}

#[cfg(feature = "esp32")]
fn main() -> Result<(), esp_idf_sys::EspError> {
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;

    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();

    // Initialize ESP-IDF logger for log crate integration
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("Wi-Fi provisioning starting");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;

    let provisioning = WifiProvisioning::esp32(peripherals.modem, sysloop)?;
    provision_and_monitor(provisioning, wifi_provision_esp32::portal::DEFAULT_PORTAL_PORT);
    Ok(())
}

#[cfg(not(feature = "esp32"))]
fn main() {
    use wifi_provision_esp32::storage::FileCredentialStore;
    use wifi_provision_esp32::wifi::SimStack;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Wi-Fi provisioning starting (host demo, simulated radio)");

    // Two networks in "range"; point a browser at the logged portal
    // address and provision against them
    let stack = SimStack::new()
        .with_network("HomeNet", "password123", -45)
        .with_network("CoffeeShop", "", -70);
    let store = match FileCredentialStore::new() {
        Ok(store) => store,
        Err(e) => {
            error!("Credential store unavailable: {}", e);
            std::process::exit(1);
        }
    };

    let provisioning = WifiProvisioning::new(Box::new(stack), Box::new(store));
    provision_and_monitor(provisioning, 8080);
}
