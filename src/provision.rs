//! Caller-facing provisioning facade.
//!
//! [`WifiProvisioning`] owns the connection state machine, a handle to its
//! event bridge, and the running portal, and is the object firmware talks
//! to:
//!
//! ```ignore
//! let provisioning = WifiProvisioning::esp32(peripherals.modem, sysloop)?;
//! provisioning.auto_connect(|outcome| match outcome {
//!     ConnectionOutcome::Connected(ssid) => info!("Online as {}", ssid),
//!     ConnectionOutcome::Failed(_) => { /* fall back to the portal */ }
//! });
//! ```
//!
//! `connect_wifi`, `auto_connect` and `scan_networks` block the calling
//! thread until the operation resolves or times out; callbacks run on the
//! calling thread. `stop()` releases provisioning resources (portal, event
//! subscriptions, pending callbacks) but never disconnects an established
//! link; tearing the station down is a separate decision, made through a
//! later `connect_wifi`, `create_ap` or a reboot.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use crate::config::{ConnectionOutcome, NetworkRecord};
use crate::portal::{ConfigServer, PortalError};
use crate::storage::{CredentialStore, StoreError};
use crate::wifi::{ConnectionMode, EventBridge, WifiController, WifiError, WifiStack};

#[cfg(feature = "esp32")]
use crate::storage::NvsCredentialStore;
#[cfg(feature = "esp32")]
use crate::wifi::EspWifiStack;

/// One provisioning engine: auto-connect, manual connect, scan, and the
/// captive configuration portal.
pub struct WifiProvisioning {
    controller: Arc<Mutex<WifiController>>,
    // Bridge handle kept outside the mutex so stop() can cancel a blocked
    // operation whose thread is holding the controller lock.
    bridge: EventBridge,
    portal: Mutex<Option<ConfigServer>>,
}

impl WifiProvisioning {
    /// Build from a radio stack and a credential store.
    pub fn new(stack: Box<dyn WifiStack>, store: Box<dyn CredentialStore>) -> Self {
        Self::from_controller(WifiController::new(stack, store))
    }

    /// Build from an already-configured controller.
    pub fn from_controller(controller: WifiController) -> Self {
        let bridge = controller.bridge().clone();
        Self {
            controller: Arc::new(Mutex::new(controller)),
            bridge,
            portal: Mutex::new(None),
        }
    }

    /// Build the full device setup: ESP-IDF radio plus NVS-backed store,
    /// both on the default NVS partition.
    #[cfg(feature = "esp32")]
    pub fn esp32(
        modem: esp_idf_hal::modem::Modem,
        sysloop: esp_idf_svc::eventloop::EspSystemEventLoop,
    ) -> Result<Self, esp_idf_sys::EspError> {
        let partition = crate::nvs_default_partition()?;
        let stack = EspWifiStack::new(modem, sysloop, Some(partition.clone()))?;
        let store = NvsCredentialStore::new(partition)?;
        Ok(Self::new(Box::new(stack), Box::new(store)))
    }

    /// Connect with the stored credentials.
    ///
    /// The callback fires exactly once with the outcome, on every branch:
    /// nothing stored, unreadable store, connect failure, connect success.
    /// A `stop()` racing the attempt suppresses the callback instead.
    pub fn auto_connect(&self, callback: impl FnOnce(ConnectionOutcome) + Send + 'static) {
        self.controller.lock().unwrap().auto_connect(Box::new(callback));
    }

    /// Connect to the named network, replacing whatever the radio was doing.
    pub fn connect_wifi(&self, ssid: &str, password: &str) -> Result<(), WifiError> {
        self.controller.lock().unwrap().connect(ssid, password)
    }

    /// Stand up the configuration access point without the portal servers.
    pub fn create_ap(&self, ssid: &str, password: &str) -> Result<(), WifiError> {
        self.controller.lock().unwrap().create_access_point(ssid, password)
    }

    /// Scan and deliver the found networks to `callback`.
    ///
    /// The callback is skipped when the scan finds nothing or fails, and
    /// when `stop()` aborted the cycle.
    pub fn scan_networks(&self, callback: impl FnOnce(Vec<NetworkRecord>) + Send + 'static) {
        self.controller.lock().unwrap().scan_networks(Box::new(callback));
    }

    /// Bring up the access point and both portal servers, replacing a
    /// portal that is already running.
    pub fn start_config_server(
        &self,
        ap_ssid: &str,
        ap_password: &str,
        port: u16,
    ) -> Result<(), PortalError> {
        let mut slot = self.portal.lock().unwrap();
        if let Some(mut old) = slot.take() {
            old.stop();
        }
        let server = ConfigServer::start(self.controller.clone(), ap_ssid, ap_password, port)?;
        *slot = Some(server);
        Ok(())
    }

    /// Address of the running portal's HTTP listener, if any.
    pub fn portal_addr(&self) -> Option<std::net::SocketAddr> {
        self.portal.lock().unwrap().as_ref().and_then(|p| p.http_addr())
    }

    /// Release provisioning resources. Idempotent.
    ///
    /// Cancels a blocked `connect`/`scan` (its callback is suppressed),
    /// shuts down the portal and drops the event subscriptions. An
    /// established connection stays up.
    pub fn stop(&self) {
        // Wake any thread blocked inside the state machine before touching
        // the controller mutex, which that thread is holding.
        self.bridge.abort();
        self.bridge.cancel_active();

        if let Some(mut portal) = self.portal.lock().unwrap().take() {
            portal.stop();
        }

        self.controller.lock().unwrap().stop();
    }

    /// SSID of the network we are connected to (or announcing).
    pub fn connected_ssid(&self) -> Option<String> {
        self.controller
            .lock()
            .unwrap()
            .connected_ssid()
            .map(str::to_owned)
    }

    /// Our address: the station's once connected, the gateway's while the
    /// access point is authoritative.
    pub fn connected_ip(&self) -> Option<Ipv4Addr> {
        self.controller.lock().unwrap().ip()
    }

    /// Which side of the radio currently drives the connection.
    pub fn mode(&self) -> ConnectionMode {
        self.controller.lock().unwrap().mode()
    }

    /// Forget the stored credentials.
    pub fn clear_saved_credentials(&self) -> Result<(), StoreError> {
        self.controller.lock().unwrap().clear_credentials()
    }
}

impl Drop for WifiProvisioning {
    fn drop(&mut self) {
        self.stop();
    }
}
