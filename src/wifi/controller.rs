//! Connection state machine.
//!
//! `WifiController` owns the radio stack and the credential store and runs
//! every provisioning operation as a bounded request/response cycle: issue
//! radio commands, park on a fresh completion, map the outcome. Success for
//! a connect attempt means IP acquisition, not just an established link.
//!
//! The controller is synchronous by design. Callers that need the boot-time
//! auto-connect outcome asynchronously get it through [`auto_connect`]'s
//! callback, which is guaranteed to fire exactly once unless `stop()` has
//! been called.
//!
//! [`auto_connect`]: WifiController::auto_connect

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::{
    ConfigError, ConnectCallback, Credentials, NetworkRecord, ScanCallback, CONNECT_TIMEOUT_SECS,
    SCAN_TIMEOUT_SECS,
};
use crate::storage::{CredentialStore, StoreError};
use crate::wifi::events::{ConnectionMode, EventBridge};
use crate::wifi::signal::{OutcomeGuard, WaitResult};
use crate::wifi::stack::{StackError, WifiStack};

/// Errors from provisioning operations.
#[derive(Debug)]
pub enum WifiError {
    /// Credentials failed validation; no radio command was issued.
    InvalidConfig(ConfigError),
    /// The radio rejected a command.
    Stack(StackError),
    /// The network never handed out an IP address.
    ConnectionFailed,
    /// The radio finished a scan cycle but could not deliver results.
    ScanFailed,
    /// No completion event arrived within the operation deadline.
    Timeout,
    /// `stop()` interrupted the operation.
    Cancelled,
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WifiError::InvalidConfig(e) => write!(f, "invalid credentials: {}", e),
            WifiError::Stack(e) => write!(f, "radio command failed: {}", e),
            WifiError::ConnectionFailed => write!(f, "connection attempt failed"),
            WifiError::ScanFailed => write!(f, "network scan failed"),
            WifiError::Timeout => write!(f, "operation timed out"),
            WifiError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for WifiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WifiError::InvalidConfig(e) => Some(e),
            WifiError::Stack(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for WifiError {
    fn from(e: ConfigError) -> Self {
        WifiError::InvalidConfig(e)
    }
}

impl From<StackError> for WifiError {
    fn from(e: StackError) -> Self {
        WifiError::Stack(e)
    }
}

/// Owns the radio stack and credential store, and sequences every
/// provisioning operation against them.
pub struct WifiController {
    stack: Box<dyn WifiStack>,
    store: Box<dyn CredentialStore>,
    bridge: EventBridge,
    active_ssid: Option<String>,
    networks: Vec<NetworkRecord>,
    connect_timeout: Duration,
    scan_timeout: Duration,
}

impl WifiController {
    pub fn new(stack: Box<dyn WifiStack>, store: Box<dyn CredentialStore>) -> Self {
        let bridge = stack.bridge().clone();
        Self {
            stack,
            store,
            bridge,
            active_ssid: None,
            networks: Vec::new(),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            scan_timeout: Duration::from_secs(SCAN_TIMEOUT_SECS),
        }
    }

    /// Override the operation deadlines. Intended for tests.
    pub fn with_timeouts(mut self, connect: Duration, scan: Duration) -> Self {
        self.connect_timeout = connect;
        self.scan_timeout = scan;
        self
    }

    /// Connect to a network from a clean slate, tearing down whatever the
    /// radio was doing before. Blocks until an IP is acquired, the attempt
    /// fails, the deadline passes, or `stop()` cancels it.
    pub fn connect(&mut self, ssid: &str, password: &str) -> Result<(), WifiError> {
        let creds = Credentials::new(ssid, password)?;
        self.connect_station(&creds, true)
    }

    /// Connect to a network while keeping an announced access point up, so
    /// a reply sent over the access point can still reach its client. The
    /// connection mode still switches to station.
    pub fn connect_in_place(&mut self, creds: &Credentials) -> Result<(), WifiError> {
        self.connect_station(creds, false)
    }

    fn connect_station(&mut self, creds: &Credentials, clean_slate: bool) -> Result<(), WifiError> {
        creds.validate()?;
        self.bridge.reset_abort();
        self.bridge.set_mode(ConnectionMode::Station);
        self.active_ssid = None;

        info!("Connecting to WiFi network: {}", creds.ssid);

        // Completion installed before any command so an early event cannot
        // slip past the waiter.
        let waiter = self.bridge.begin_op();
        let issued = if clean_slate {
            self.stack.restart_station(creds)
        } else {
            self.stack.apply_station(creds)
        }
        .and_then(|()| self.stack.connect());
        if let Err(e) = issued {
            self.bridge.end_op();
            return Err(e.into());
        }

        let result = waiter.wait(self.connect_timeout);
        self.bridge.end_op();

        match result {
            WaitResult::Done => {
                self.active_ssid = Some(creds.ssid.clone());
                match self.stack.station_ip() {
                    Some(ip) => info!("Connected to {} with IP {}", creds.ssid, ip),
                    None => info!("Connected to {}", creds.ssid),
                }
                Ok(())
            }
            WaitResult::Failed => {
                warn!("Connection to {} failed", creds.ssid);
                Err(WifiError::ConnectionFailed)
            }
            WaitResult::TimedOut => {
                warn!(
                    "Connection to {} timed out after {:?}",
                    creds.ssid, self.connect_timeout
                );
                Err(WifiError::Timeout)
            }
            WaitResult::Cancelled => Err(WifiError::Cancelled),
        }
    }

    /// Bring up the configuration access point on the fixed gateway
    /// address. Returns as soon as the access point is announced.
    pub fn create_access_point(&mut self, ssid: &str, password: &str) -> Result<(), WifiError> {
        let creds = Credentials::new(ssid, password)?;
        self.bridge.reset_abort();
        self.bridge.set_mode(ConnectionMode::AccessPoint);
        info!("Starting configuration access point: {}", creds.ssid);
        self.stack.restart_access_point(&creds)?;
        Ok(())
    }

    /// Boot-time connect from stored credentials.
    ///
    /// The callback fires exactly once with the outcome. No stored
    /// credentials, a store failure, and a failed attempt all count as
    /// failure, so the caller can fall back to the configuration portal.
    pub fn auto_connect(&mut self, callback: ConnectCallback) {
        // Re-armed before the guard exists so an earlier stop() cannot
        // swallow this attempt's outcome.
        self.bridge.reset_abort();
        let mut guard = OutcomeGuard::new(callback, self.bridge.abort_flag());

        let creds = match self.store.load() {
            Ok(creds) => creds,
            Err(StoreError::NotProvisioned) => {
                info!("No stored WiFi credentials, skipping auto-connect");
                return;
            }
            Err(e) => {
                warn!("Failed to load stored credentials: {}", e);
                return;
            }
        };

        guard.set_ssid(&creds.ssid);
        info!("Auto-connecting to stored network: {}", creds.ssid);
        match self.connect_station(&creds, true) {
            Ok(()) => guard.succeed(),
            Err(e) => warn!("Auto-connect to {} failed: {}", creds.ssid, e),
        }
    }

    /// Run one scan cycle and return the networks it saw. The cached list
    /// is replaced only when the cycle completes and yields results.
    pub fn scan(&mut self) -> Result<Vec<NetworkRecord>, WifiError> {
        self.bridge.reset_abort();
        debug!("Starting WiFi scan");

        let waiter = self.bridge.begin_op();
        if let Err(e) = self.stack.start_scan() {
            self.bridge.end_op();
            return Err(e.into());
        }

        let result = waiter.wait(self.scan_timeout);
        // Single stop point covers completion, timeout and cancellation.
        self.stack.stop_scan();
        self.bridge.end_op();

        match result {
            WaitResult::Done => {
                let records = self.stack.scan_results()?;
                debug!("Scan found {} networks", records.len());
                self.networks = records.clone();
                Ok(records)
            }
            WaitResult::Failed => Err(WifiError::ScanFailed),
            WaitResult::TimedOut => {
                warn!("WiFi scan timed out after {:?}", self.scan_timeout);
                Err(WifiError::Timeout)
            }
            WaitResult::Cancelled => Err(WifiError::Cancelled),
        }
    }

    /// Scan and hand the results to `callback`. The callback is skipped
    /// when the scan fails, sees no networks, or `stop()` was called.
    pub fn scan_networks(&mut self, callback: ScanCallback) {
        match self.scan() {
            Ok(records) if records.is_empty() => {
                info!("Scan finished with no visible networks");
            }
            Ok(records) => {
                if self.bridge.is_aborted() {
                    debug!("Scan callback suppressed after stop");
                } else {
                    callback(records);
                }
            }
            Err(e) => warn!("WiFi scan failed: {}", e),
        }
    }

    /// Release provisioning resources: cancel the operation in flight and
    /// drop event subscriptions. An established connection is left alone.
    /// Safe to call repeatedly.
    pub fn stop(&mut self) {
        debug!("Stopping WiFi provisioning operations");
        self.bridge.abort();
        self.bridge.cancel_active();
        self.stack.detach();
    }

    /// Persist credentials for the next boot.
    pub fn save_credentials(&mut self, creds: &Credentials) -> Result<(), StoreError> {
        self.store.save(creds)
    }

    /// Remove persisted credentials.
    pub fn clear_credentials(&mut self) -> Result<(), StoreError> {
        self.store.clear()
    }

    pub fn mode(&self) -> ConnectionMode {
        self.bridge.mode()
    }

    /// SSID of the network the controller last connected to.
    pub fn connected_ssid(&self) -> Option<&str> {
        self.active_ssid.as_deref()
    }

    /// Address of the interface the current mode routes through.
    pub fn ip(&self) -> Option<Ipv4Addr> {
        match self.bridge.mode() {
            ConnectionMode::Station => self.stack.station_ip(),
            ConnectionMode::AccessPoint => self.stack.access_point_ip(),
            ConnectionMode::None => None,
        }
    }

    /// Networks seen by the most recent completed scan.
    pub fn networks(&self) -> &[NetworkRecord] {
        &self.networks
    }

    /// The event bridge shared with the platform glue.
    pub fn bridge(&self) -> &EventBridge {
        &self.bridge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMode, ConnectionOutcome};
    use crate::storage::MemoryStore;
    use crate::wifi::sim::{SimProbe, SimStack};
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn controller(stack: SimStack, store: MemoryStore) -> (WifiController, SimProbe) {
        let probe = stack.probe();
        let ctl = WifiController::new(Box::new(stack), Box::new(store));
        (ctl, probe)
    }

    fn recording_callback() -> (ConnectCallback, Arc<Mutex<Vec<ConnectionOutcome>>>) {
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = outcomes.clone();
        let callback: ConnectCallback = Box::new(move |outcome| sink.lock().unwrap().push(outcome));
        (callback, outcomes)
    }

    fn recording_scan_callback() -> (ScanCallback, Arc<Mutex<Vec<Vec<NetworkRecord>>>>) {
        let deliveries = Arc::new(Mutex::new(Vec::new()));
        let sink = deliveries.clone();
        let callback: ScanCallback = Box::new(move |records| sink.lock().unwrap().push(records));
        (callback, deliveries)
    }

    // ==================== Connect Tests ====================

    #[test]
    fn test_connect_success_sets_station_mode() {
        let stack = SimStack::new().with_network("Home", "password123", -40);
        let (mut ctl, probe) = controller(stack, MemoryStore::new());

        ctl.connect("Home", "password123").unwrap();

        assert_eq!(ctl.connected_ssid(), Some("Home"));
        assert_eq!(ctl.mode(), ConnectionMode::Station);
        assert_eq!(ctl.ip(), Some(Ipv4Addr::new(192, 168, 1, 100)));
        assert_eq!(probe.commands(), vec!["restart_station", "connect"]);
    }

    #[test]
    fn test_connect_wrong_password_fails() {
        let stack = SimStack::new().with_network("Home", "password123", -40);
        let (mut ctl, _probe) = controller(stack, MemoryStore::new());

        let err = ctl.connect("Home", "wrongpass99").unwrap_err();

        assert!(matches!(err, WifiError::ConnectionFailed));
        assert_eq!(ctl.connected_ssid(), None);
    }

    #[test]
    fn test_invalid_ssid_rejected_before_radio_commands() {
        let stack = SimStack::new();
        let (mut ctl, probe) = controller(stack, MemoryStore::new());

        let err = ctl.connect("", "password123").unwrap_err();

        assert!(matches!(
            err,
            WifiError::InvalidConfig(ConfigError::SsidEmpty)
        ));
        assert!(probe.commands().is_empty());
    }

    #[test]
    fn test_connect_times_out_when_radio_stays_silent() {
        let stack = SimStack::new().with_network("Home", "password123", -40).silent();
        let (ctl, _probe) = controller(stack, MemoryStore::new());
        let mut ctl = ctl.with_timeouts(Duration::from_millis(50), Duration::from_millis(50));

        let err = ctl.connect("Home", "password123").unwrap_err();

        assert!(matches!(err, WifiError::Timeout));
    }

    #[test]
    fn test_stop_cancels_blocked_connect() {
        let stack = SimStack::new().silent();
        let (ctl, _probe) = controller(stack, MemoryStore::new());
        let mut ctl = ctl.with_timeouts(Duration::from_secs(5), Duration::from_secs(5));

        let bridge = ctl.bridge().clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            bridge.abort();
            bridge.cancel_active();
        });

        let err = ctl.connect("Home", "password123").unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, WifiError::Cancelled));
    }

    // ==================== Auto-Connect Tests ====================

    #[test]
    fn test_auto_connect_success_fires_callback_once() {
        let stack = SimStack::new().with_network("Home", "password123", -40);
        let store = MemoryStore::with_credentials(
            Credentials::new("Home", "password123").unwrap(),
        );
        let (mut ctl, _probe) = controller(stack, store);

        let (callback, outcomes) = recording_callback();
        ctl.auto_connect(callback);

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_connected());
        assert_eq!(outcomes[0].ssid(), "Home");
    }

    #[test]
    fn test_auto_connect_without_stored_credentials_fails_fast() {
        let stack = SimStack::new().with_network("Home", "password123", -40);
        let (mut ctl, probe) = controller(stack, MemoryStore::new());

        let (callback, outcomes) = recording_callback();
        ctl.auto_connect(callback);

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].is_connected());
        assert_eq!(outcomes[0].ssid(), "");
        // The radio was never touched
        assert!(probe.commands().is_empty());
    }

    #[test]
    fn test_auto_connect_bad_credentials_reports_failure() {
        let stack = SimStack::new().with_network("Home", "password123", -40);
        let store = MemoryStore::with_credentials(
            Credentials::new("Home", "outdatedpass").unwrap(),
        );
        let (mut ctl, _probe) = controller(stack, store);

        let (callback, outcomes) = recording_callback();
        ctl.auto_connect(callback);

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].is_connected());
        assert_eq!(outcomes[0].ssid(), "Home");
    }

    // ==================== Scan Tests ====================

    #[test]
    fn test_scan_updates_network_list() {
        let stack = SimStack::new()
            .with_network("Home", "password123", -40)
            .with_network("Cafe", "", -70);
        let (mut ctl, probe) = controller(stack, MemoryStore::new());

        let records = ctl.scan().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(ctl.networks().len(), 2);
        assert_eq!(ctl.networks()[1].auth_mode, AuthMode::Open);

        // A later empty cycle clears the cached list
        probe.clear_networks();
        assert!(ctl.scan().unwrap().is_empty());
        assert!(ctl.networks().is_empty());
    }

    #[test]
    fn test_scan_result_failure_leaves_list_untouched() {
        let stack = SimStack::new()
            .with_network("Home", "password123", -40)
            .failing_scan_results();
        let (mut ctl, _probe) = controller(stack, MemoryStore::new());
        ctl.networks = vec![NetworkRecord {
            ssid: "Cached".to_string(),
            rssi: -50,
            auth_mode: AuthMode::WpaWpa2Psk,
        }];

        let err = ctl.scan().unwrap_err();

        assert!(matches!(err, WifiError::Stack(_)));
        assert_eq!(ctl.networks().len(), 1);
        assert_eq!(ctl.networks()[0].ssid, "Cached");
    }

    #[test]
    fn test_scan_times_out_when_radio_stays_silent() {
        let stack = SimStack::new().silent();
        let (ctl, probe) = controller(stack, MemoryStore::new());
        let mut ctl = ctl.with_timeouts(Duration::from_millis(50), Duration::from_millis(50));

        let err = ctl.scan().unwrap_err();

        assert!(matches!(err, WifiError::Timeout));
        // The cycle is stopped even though it never completed
        assert!(probe.commands().contains(&"stop_scan"));
    }

    #[test]
    fn test_scan_networks_delivers_records() {
        let stack = SimStack::new().with_network("Home", "password123", -40);
        let (mut ctl, _probe) = controller(stack, MemoryStore::new());

        let (callback, deliveries) = recording_scan_callback();
        ctl.scan_networks(callback);

        let deliveries = deliveries.lock().unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0][0].ssid, "Home");
    }

    #[test]
    fn test_scan_networks_skips_callback_when_list_empty() {
        let stack = SimStack::new();
        let (mut ctl, _probe) = controller(stack, MemoryStore::new());

        let (callback, deliveries) = recording_scan_callback();
        ctl.scan_networks(callback);

        assert!(deliveries.lock().unwrap().is_empty());
    }

    #[test]
    fn test_scan_networks_suppressed_after_stop() {
        let stack = SimStack::new()
            .with_network("Home", "password123", -40)
            .with_latency(Duration::from_millis(200));
        let (mut ctl, _probe) = controller(stack, MemoryStore::new());

        let bridge = ctl.bridge().clone();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            bridge.abort();
        });

        let (callback, deliveries) = recording_scan_callback();
        ctl.scan_networks(callback);
        stopper.join().unwrap();

        assert!(deliveries.lock().unwrap().is_empty());
    }

    // ==================== Stop and Access Point Tests ====================

    #[test]
    fn test_stop_detaches_but_keeps_connection() {
        let stack = SimStack::new().with_network("Home", "password123", -40);
        let (mut ctl, probe) = controller(stack, MemoryStore::new());

        ctl.connect("Home", "password123").unwrap();
        ctl.stop();
        ctl.stop();

        assert_eq!(probe.subscription_pairs(), 0);
        // The established connection is untouched
        assert_eq!(ctl.connected_ssid(), Some("Home"));
        assert_eq!(ctl.ip(), Some(Ipv4Addr::new(192, 168, 1, 100)));
    }

    #[test]
    fn test_access_point_restart_reuses_single_subscription() {
        let stack = SimStack::new();
        let (mut ctl, probe) = controller(stack, MemoryStore::new());

        ctl.create_access_point("ESP32", "").unwrap();
        ctl.create_access_point("ESP32", "").unwrap();

        assert_eq!(ctl.mode(), ConnectionMode::AccessPoint);
        assert_eq!(ctl.ip(), Some(Ipv4Addr::new(192, 168, 4, 1)));
        assert!(probe.access_point_announced());
        assert_eq!(probe.subscription_pairs(), 1);
    }

    #[test]
    fn test_connect_in_place_keeps_access_point_announced() {
        let stack = SimStack::new().with_network("Home", "password123", -40);
        let (mut ctl, probe) = controller(stack, MemoryStore::new());

        ctl.create_access_point("ESP32", "").unwrap();
        let creds = Credentials::new("Home", "password123").unwrap();
        ctl.connect_in_place(&creds).unwrap();

        assert!(probe.access_point_announced());
        assert_eq!(ctl.mode(), ConnectionMode::Station);
        assert_eq!(
            probe.commands(),
            vec!["restart_access_point", "apply_station", "connect"]
        );
    }

    #[test]
    fn test_auto_connect_rearms_after_stop() {
        let stack = SimStack::new().with_network("Home", "password123", -40);
        let store = MemoryStore::with_credentials(
            Credentials::new("Home", "password123").unwrap(),
        );
        let (mut ctl, _probe) = controller(stack, store);

        ctl.stop();
        let (callback, outcomes) = recording_callback();
        ctl.auto_connect(callback);

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_connected());
    }
}
