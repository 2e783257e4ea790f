//! Captive DNS responder.
//!
//! Answers every query on UDP/53 with the access point's own address, so a
//! client that joins the configuration network resolves any hostname to
//! the portal. Combined with the HTTP probe redirects this is what makes
//! phones pop the "sign in to network" sheet.
//!
//! The response is the query rewritten in place: response and
//! recursion-available flags set, answer count forced to one, and a single
//! A record appended that points back at the start of the question name.

use std::io;
use std::net::{Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

/// Standard DNS port.
pub const DNS_PORT: u16 = 53;

/// Largest UDP payload the responder will read.
const MAX_PACKET: usize = 512;

/// Bytes in a DNS header.
const HEADER_LEN: usize = 12;

/// Build the captive answer for `query`, resolving every name to `ip`.
///
/// Returns `None` for packets too short to carry a DNS header and for
/// packets that are already responses.
pub fn build_response(query: &[u8], ip: Ipv4Addr) -> Option<Vec<u8>> {
    if query.len() < HEADER_LEN {
        return None;
    }
    if query[2] & 0x80 != 0 {
        return None;
    }

    let mut packet = query.to_vec();
    packet[2] |= 0x80; // response
    packet[3] |= 0x80; // recursion available
    packet[6] = 0;
    packet[7] = 1; // one answer

    // Pointer to the question name at offset 12, then type A, class IN,
    // a short TTL and four bytes of address
    packet.extend_from_slice(&[0xc0, 0x0c]);
    packet.extend_from_slice(&[0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x1c, 0x00, 0x04]);
    packet.extend_from_slice(&ip.octets());
    Some(packet)
}

/// Background UDP responder.
///
/// Runs in its own thread and answers until stopped. Drop it to stop.
pub struct DnsResponder {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    port: u16,
}

impl DnsResponder {
    /// Bind the responder and start answering with `ip`.
    pub fn start(ip: Ipv4Addr, port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        socket.set_read_timeout(Some(Duration::from_millis(100)))?;
        let port = socket.local_addr()?.port();
        info!("DNS responder on port {} resolving everything to {}", port, ip);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let handle = thread::spawn(move || Self::run(socket, ip, shutdown_clone));

        Ok(Self {
            handle: Some(handle),
            shutdown,
            port,
        })
    }

    /// The port actually bound.
    pub fn port(&self) -> u16 {
        self.port
    }

    fn run(socket: UdpSocket, ip: Ipv4Addr, shutdown: Arc<AtomicBool>) {
        let mut buf = [0u8; MAX_PACKET];
        loop {
            if shutdown.load(Ordering::Acquire) {
                info!("DNS responder shutting down");
                break;
            }

            match socket.recv_from(&mut buf) {
                Ok((len, peer)) => {
                    debug!("DNS query from {}", peer);
                    if let Some(response) = build_response(&buf[..len], ip) {
                        if let Err(e) = socket.send_to(&response, peer) {
                            warn!("Failed to send DNS response: {}", e);
                        }
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    // Read timeout, check the shutdown flag and go again
                }
                Err(e) => warn!("DNS receive error: {}", e),
            }
        }
    }

    /// Stop the responder. May take up to 100ms due to the poll interval.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DnsResponder {
    fn drop(&mut self) {
        self.stop();
    }
}
