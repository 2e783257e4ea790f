//! Simulated radio stack for host builds.
//!
//! Stands in for the ESP-IDF stack so the full provisioning flow (connect,
//! scan, portal) runs on a development machine and in `cargo test`. The
//! simulation is scripted with a list of reachable networks; connect
//! attempts resolve against that list and report through the event bridge
//! from a background thread, like the real radio does.
//!
//! # Example
//!
//! ```
//! use wifi_provision_esp32::wifi::{SimStack, WifiStack};
//!
//! let stack = SimStack::new()
//!     .with_network("Home", "password123", -42)
//!     .with_network("Cafe", "", -70);
//! assert_eq!(stack.bridge().mode().to_string(), "none");
//! ```

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::debug;

use crate::config::{AuthMode, Credentials, NetworkRecord};
use crate::wifi::events::{EventBridge, StackEvent};
use crate::wifi::stack::{StackError, WifiStack};

/// Address handed to the simulated station once it "connects".
const SIM_STATION_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 100);

/// Gateway of the simulated access point.
const SIM_AP_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

/// One network reachable by the simulated radio.
#[derive(Debug, Clone)]
pub struct SimNetwork {
    pub ssid: String,
    pub password: String,
    pub rssi: i8,
    pub auth_mode: AuthMode,
}

#[derive(Default)]
struct SimState {
    networks: Vec<SimNetwork>,
    started: bool,
    sta_creds: Option<Credentials>,
    sta_ip: Option<Ipv4Addr>,
    ap_ip: Option<Ipv4Addr>,
    subscription_pairs: usize,
    commands: Vec<&'static str>,
}

/// Scripted radio stack.
pub struct SimStack {
    bridge: EventBridge,
    latency: Duration,
    silent: bool,
    fail_scan_results: bool,
    state: Arc<Mutex<SimState>>,
}

impl SimStack {
    pub fn new() -> Self {
        Self {
            bridge: EventBridge::new(),
            latency: Duration::from_millis(25),
            silent: false,
            fail_scan_results: false,
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Add a reachable network. An empty password makes it open.
    pub fn with_network(self, ssid: &str, password: &str, rssi: i8) -> Self {
        let auth_mode = if password.is_empty() {
            AuthMode::Open
        } else {
            AuthMode::WpaWpa2Psk
        };
        self.state.lock().unwrap().networks.push(SimNetwork {
            ssid: ssid.to_string(),
            password: password.to_string(),
            rssi,
            auth_mode,
        });
        self
    }

    /// How long the radio takes to report an event.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Never report events (connects and scans run into their timeouts).
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Make scan-result retrieval fail after a completed cycle.
    pub fn failing_scan_results(mut self) -> Self {
        self.fail_scan_results = true;
        self
    }

    /// Observer handle that stays valid after the stack is boxed away.
    pub fn probe(&self) -> SimProbe {
        SimProbe {
            state: self.state.clone(),
        }
    }

    fn record(&self, command: &'static str) {
        self.state.lock().unwrap().commands.push(command);
    }
}

impl Default for SimStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared view into a [`SimStack`], for assertions and mid-test rescripting.
#[derive(Clone)]
pub struct SimProbe {
    state: Arc<Mutex<SimState>>,
}

impl SimProbe {
    /// Commands issued so far, in order.
    pub fn commands(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Number of live event subscription pairs.
    pub fn subscription_pairs(&self) -> usize {
        self.state.lock().unwrap().subscription_pairs
    }

    /// Whether the access point is currently announced.
    pub fn access_point_announced(&self) -> bool {
        self.state.lock().unwrap().ap_ip.is_some()
    }

    /// Replace the reachable-network script.
    pub fn set_networks(&self, networks: Vec<SimNetwork>) {
        self.state.lock().unwrap().networks = networks;
    }

    /// Make every network unreachable.
    pub fn clear_networks(&self) {
        self.state.lock().unwrap().networks.clear();
    }
}

impl WifiStack for SimStack {
    fn bridge(&self) -> &EventBridge {
        &self.bridge
    }

    fn restart_station(&mut self, creds: &Credentials) -> Result<(), StackError> {
        self.record("restart_station");
        let mut state = self.state.lock().unwrap();
        state.started = true;
        state.subscription_pairs = 1;
        state.sta_creds = Some(creds.clone());
        state.sta_ip = None;
        state.ap_ip = None;
        Ok(())
    }

    fn restart_access_point(&mut self, creds: &Credentials) -> Result<(), StackError> {
        self.record("restart_access_point");
        let mut state = self.state.lock().unwrap();
        state.started = true;
        state.subscription_pairs = 1;
        state.sta_creds = None;
        state.sta_ip = None;
        state.ap_ip = Some(SIM_AP_IP);
        debug!("simulated access point \"{}\" at {}", creds.ssid, SIM_AP_IP);
        Ok(())
    }

    fn apply_station(&mut self, creds: &Credentials) -> Result<(), StackError> {
        self.record("apply_station");
        let mut state = self.state.lock().unwrap();
        if !state.started {
            return Err(StackError::NotReady("radio not started"));
        }
        // Access point stays announced; only the station side changes
        state.sta_creds = Some(creds.clone());
        state.sta_ip = None;
        Ok(())
    }

    fn connect(&mut self) -> Result<(), StackError> {
        self.record("connect");
        let creds = {
            let state = self.state.lock().unwrap();
            match &state.sta_creds {
                Some(creds) => creds.clone(),
                None => return Err(StackError::NotReady("no station credentials")),
            }
        };

        if self.silent {
            return Ok(());
        }

        let bridge = self.bridge.clone();
        let state = self.state.clone();
        let latency = self.latency;
        thread::spawn(move || {
            thread::sleep(latency);
            let reachable = {
                let state = state.lock().unwrap();
                state
                    .networks
                    .iter()
                    .any(|network| network.ssid == creds.ssid && network.password == creds.password)
            };
            if reachable {
                state.lock().unwrap().sta_ip = Some(SIM_STATION_IP);
                bridge.dispatch(StackEvent::StaConnected);
                bridge.dispatch(StackEvent::GotIp);
            } else {
                bridge.dispatch(StackEvent::StaDisconnected);
            }
        });
        Ok(())
    }

    fn start_scan(&mut self) -> Result<(), StackError> {
        self.record("start_scan");
        self.state.lock().unwrap().started = true;

        if self.silent {
            return Ok(());
        }

        let bridge = self.bridge.clone();
        let latency = self.latency;
        thread::spawn(move || {
            thread::sleep(latency);
            bridge.dispatch(StackEvent::ScanDone);
        });
        Ok(())
    }

    fn stop_scan(&mut self) {
        self.record("stop_scan");
    }

    fn scan_results(&mut self) -> Result<Vec<NetworkRecord>, StackError> {
        self.record("scan_results");
        if self.fail_scan_results {
            return Err(StackError::command(
                "scan result retrieval",
                "simulated failure",
            ));
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .networks
            .iter()
            .map(|network| NetworkRecord {
                ssid: network.ssid.clone(),
                rssi: network.rssi,
                auth_mode: network.auth_mode,
            })
            .collect())
    }

    fn station_ip(&self) -> Option<Ipv4Addr> {
        self.state.lock().unwrap().sta_ip
    }

    fn access_point_ip(&self) -> Option<Ipv4Addr> {
        self.state.lock().unwrap().ap_ip
    }

    fn detach(&mut self) {
        self.record("detach");
        self.state.lock().unwrap().subscription_pairs = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_requires_credentials() {
        let mut stack = SimStack::new();
        assert!(matches!(stack.connect(), Err(StackError::NotReady(_))));
    }

    #[test]
    fn test_apply_station_keeps_access_point() {
        let ap = Credentials::new("Portal", "portalpass").unwrap();
        let sta = Credentials::new("Home", "password123").unwrap();

        let mut stack = SimStack::new();
        let probe = stack.probe();
        stack.restart_access_point(&ap).unwrap();
        assert!(probe.access_point_announced());

        stack.apply_station(&sta).unwrap();
        assert!(probe.access_point_announced());
        assert_eq!(stack.access_point_ip(), Some(SIM_AP_IP));
    }

    #[test]
    fn test_restart_station_clears_access_point() {
        let ap = Credentials::new("Portal", "portalpass").unwrap();
        let sta = Credentials::new("Home", "password123").unwrap();

        let mut stack = SimStack::new();
        let probe = stack.probe();
        stack.restart_access_point(&ap).unwrap();
        stack.restart_station(&sta).unwrap();
        assert!(!probe.access_point_announced());
        assert_eq!(probe.subscription_pairs(), 1);
    }

    #[test]
    fn test_scan_results_reflect_script() {
        let mut stack = SimStack::new()
            .with_network("Home", "password123", -40)
            .with_network("Cafe", "", -70);
        let records = stack.scan_results().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ssid, "Home");
        assert_eq!(records[0].auth_mode, AuthMode::WpaWpa2Psk);
        assert_eq!(records[1].auth_mode, AuthMode::Open);
    }

    #[test]
    fn test_probe_rescripting() {
        let mut stack = SimStack::new().with_network("Home", "password123", -40);
        let probe = stack.probe();
        assert_eq!(stack.scan_results().unwrap().len(), 1);
        probe.clear_networks();
        assert!(stack.scan_results().unwrap().is_empty());
    }
}
