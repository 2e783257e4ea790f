//! Captive configuration portal.
//!
//! Brings up the device's own access point through the controller, answers
//! every DNS query with the portal address, and serves the configuration
//! page plus its JSON endpoints over HTTP. Joining the access point with a
//! phone pops the system's captive-portal sheet straight into the page.
//!
//! Stopping the portal tears down the HTTP and DNS threads but leaves the
//! access point up; the radio is torn down through the controller.

mod dns;
mod http;
mod page;

pub use dns::{DnsResponder, DNS_PORT};

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{info, warn};
use tiny_http::Server;

use crate::wifi::{WifiController, WifiError};

/// Default HTTP port for the portal.
pub const DEFAULT_PORTAL_PORT: u16 = 80;

/// Gateway address assumed when the stack does not report one.
const FALLBACK_GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

/// Errors that prevent the portal from starting.
#[derive(Debug)]
pub enum PortalError {
    /// The access point could not be brought up.
    AccessPoint(WifiError),
    /// The HTTP listener could not bind.
    Bind(io::Error),
}

impl fmt::Display for PortalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessPoint(e) => write!(f, "access point failed: {}", e),
            Self::Bind(e) => write!(f, "HTTP listener failed: {}", e),
        }
    }
}

impl std::error::Error for PortalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::AccessPoint(e) => Some(e),
            Self::Bind(e) => Some(e),
        }
    }
}

/// The running portal: access point, DNS responder and HTTP server.
///
/// Returned by [`ConfigServer::start`]. Drop it (or call
/// [`ConfigServer::stop`]) to shut the servers down.
pub struct ConfigServer {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    dns: Option<DnsResponder>,
    http_addr: Option<SocketAddr>,
}

impl ConfigServer {
    /// Bring up the access point and start serving the portal on `port`.
    ///
    /// A DNS bind failure is not fatal: clients can still reach the portal
    /// by address, so the portal runs without captive redirection rather
    /// than not at all.
    pub fn start(
        controller: Arc<Mutex<WifiController>>,
        ap_ssid: &str,
        ap_password: &str,
        port: u16,
    ) -> Result<Self, PortalError> {
        Self::start_with_ports(controller, ap_ssid, ap_password, port, DNS_PORT)
    }

    fn start_with_ports(
        controller: Arc<Mutex<WifiController>>,
        ap_ssid: &str,
        ap_password: &str,
        http_port: u16,
        dns_port: u16,
    ) -> Result<Self, PortalError> {
        let gateway = {
            let mut ctl = controller.lock().unwrap();
            ctl.create_access_point(ap_ssid, ap_password)
                .map_err(PortalError::AccessPoint)?;
            ctl.ip().unwrap_or(FALLBACK_GATEWAY)
        };

        let dns = match DnsResponder::start(gateway, dns_port) {
            Ok(responder) => Some(responder),
            Err(e) => {
                warn!("DNS responder failed to start: {} (no captive redirect)", e);
                None
            }
        };

        let addr = format!("0.0.0.0:{}", http_port);
        let server = Server::http(&addr).map_err(|e| {
            PortalError::Bind(io::Error::new(io::ErrorKind::AddrInUse, format!("{}", e)))
        })?;
        let http_addr = server.server_addr().to_ip();

        info!("Configuration portal at http://{}/webconfig", gateway);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let handle = thread::spawn(move || {
            http::run_server(server, controller, shutdown_clone);
        });

        Ok(Self {
            handle: Some(handle),
            shutdown,
            dns,
            http_addr,
        })
    }

    /// The bound HTTP listener address.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// Stop the HTTP and DNS threads. Safe to call twice.
    ///
    /// May take up to 100ms due to the polling interval.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        if let Some(mut dns) = self.dns.take() {
            dns.stop();
        }
    }
}

impl Drop for ConfigServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream, UdpSocket};
    use std::time::Duration;

    use crate::storage::MemoryStore;
    use crate::wifi::SimStack;

    fn portal_controller(stack: SimStack) -> Arc<Mutex<WifiController>> {
        let controller = WifiController::new(Box::new(stack), Box::new(MemoryStore::new()))
            .with_timeouts(Duration::from_secs(2), Duration::from_secs(2));
        Arc::new(Mutex::new(controller))
    }

    fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).expect("connect to portal");
        write!(
            stream,
            "GET {} HTTP/1.1\r\nHost: portal\r\nConnection: close\r\n\r\n",
            path
        )
        .expect("send request");
        let mut response = String::new();
        stream.read_to_string(&mut response).expect("read response");
        response
    }

    #[test]
    fn test_portal_lifecycle() {
        let stack = SimStack::new();
        let probe = stack.probe();
        let controller = portal_controller(stack);

        let mut portal =
            ConfigServer::start_with_ports(controller, "SetupAP", "", 0, 0).expect("portal");
        assert!(probe.access_point_announced());

        let addr = portal.http_addr().expect("bound address");
        let response = get(addr, "/test");
        assert!(response.contains("Hello, World!"));

        portal.stop();
        portal.stop();
        // Access point stays up after the servers are gone
        assert!(probe.access_point_announced());
    }

    #[test]
    fn test_portal_requires_valid_access_point_name() {
        let controller = portal_controller(SimStack::new());
        let result = ConfigServer::start_with_ports(controller, "", "", 0, 0);
        assert!(matches!(result, Err(PortalError::AccessPoint(_))));
    }

    #[test]
    fn test_portal_survives_dns_bind_failure() {
        let blocker = UdpSocket::bind("0.0.0.0:0").expect("occupy a UDP port");
        let dns_port = blocker.local_addr().unwrap().port();

        let controller = portal_controller(SimStack::new());
        let portal = ConfigServer::start_with_ports(controller, "SetupAP", "", 0, dns_port)
            .expect("portal starts without DNS");

        assert!(portal.dns.is_none());
        let addr = portal.http_addr().expect("bound address");
        let response = get(addr, "/webconfig");
        assert!(response.contains("wifiList"));
    }

    #[test]
    fn test_portal_http_bind_failure_is_fatal() {
        let blocker = TcpListener::bind("0.0.0.0:0").expect("occupy a TCP port");
        let http_port = blocker.local_addr().unwrap().port();

        let controller = portal_controller(SimStack::new());
        let result = ConfigServer::start_with_ports(controller, "SetupAP", "", http_port, 0);
        assert!(matches!(result, Err(PortalError::Bind(_))));
    }

    #[test]
    fn test_portal_dns_answers_with_gateway() {
        let controller = portal_controller(SimStack::new());
        let portal =
            ConfigServer::start_with_ports(controller, "SetupAP", "", 0, 0).expect("portal");
        let dns_port = portal.dns.as_ref().expect("DNS responder").port();

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        // Minimal query for "example.com", type A
        let mut query = vec![
            0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        query.extend_from_slice(b"\x07example\x03com\x00\x00\x01\x00\x01");
        client.send_to(&query, ("127.0.0.1", dns_port)).unwrap();

        let mut buf = [0u8; 512];
        let (len, _) = client.recv_from(&mut buf).expect("DNS answer");
        // Last four bytes are the gateway address
        assert_eq!(&buf[len - 4..len], &[192, 168, 4, 1]);
    }
}
