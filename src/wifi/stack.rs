//! Radio stack abstraction.
//!
//! The connection logic drives the radio exclusively through [`WifiStack`],
//! so the same code runs against ESP-IDF on the device and against the
//! simulated stack on the host (which is also what the test suite uses).
//!
//! Implementations own their event subscriptions and feed every radio event
//! into the [`EventBridge`] they were built around; the trait only exposes
//! commands plus read access to that bridge.

use std::fmt;
use std::net::Ipv4Addr;

use crate::config::{Credentials, NetworkRecord};
use crate::wifi::events::EventBridge;

/// Commands the connection logic issues to the radio.
pub trait WifiStack: Send {
    /// The event bridge this stack reports into.
    fn bridge(&self) -> &EventBridge;

    /// Tear the radio down to a clean slate and bring it back up as a
    /// station configured with `creds`. Does not issue the connect command.
    fn restart_station(&mut self, creds: &Credentials) -> Result<(), StackError>;

    /// Tear the radio down to a clean slate and bring it back up announcing
    /// an access point (open when the password is empty, WPA/WPA2 otherwise,
    /// fixed channel and client limit, DHCP on the fixed gateway address).
    /// The station interface stays available so scans and in-place connect
    /// attempts work while the portal is up.
    fn restart_access_point(&mut self, creds: &Credentials) -> Result<(), StackError>;

    /// Apply station credentials to the live radio without a clean-slate
    /// restart, keeping an active access point announced. Does not issue
    /// the connect command. Used by the portal so its HTTP reply can still
    /// reach the client.
    fn apply_station(&mut self, creds: &Credentials) -> Result<(), StackError>;

    /// Issue the station connect command.
    fn connect(&mut self) -> Result<(), StackError>;

    /// Start an asynchronous scan cycle, bringing the radio up first if
    /// needed. Completion is reported through the bridge.
    fn start_scan(&mut self) -> Result<(), StackError>;

    /// Stop a scan cycle. Safe to call when no scan is running.
    fn stop_scan(&mut self);

    /// Fetch the records collected by the finished scan cycle.
    fn scan_results(&mut self) -> Result<Vec<NetworkRecord>, StackError>;

    /// IP address of the station interface, if it has one.
    fn station_ip(&self) -> Option<Ipv4Addr>;

    /// Gateway address of the access point interface, if announced.
    fn access_point_ip(&self) -> Option<Ipv4Addr>;

    /// Drop the event subscriptions. The radio itself is left untouched so
    /// an established connection survives.
    fn detach(&mut self);
}

/// Radio stack errors.
#[derive(Debug)]
pub enum StackError {
    /// A radio command was rejected by the underlying stack.
    Command { op: &'static str, reason: String },
    /// The radio is not in a state where the command makes sense.
    NotReady(&'static str),
}

impl StackError {
    /// Wrap a rejected command with the operation it belonged to.
    pub fn command(op: &'static str, reason: impl fmt::Display) -> Self {
        Self::Command {
            op,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command { op, reason } => write!(f, "{} failed: {}", op, reason),
            Self::NotReady(what) => write!(f, "radio not ready: {}", what),
        }
    }
}

impl std::error::Error for StackError {}
