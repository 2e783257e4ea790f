//! Portal HTTP routes.
//!
//! The request loop for the configuration server. Routes:
//!
//! - `GET /webconfig` - the embedded configuration page
//! - `GET /wl` - scan and return nearby networks as a JSON array
//! - `POST /wc` - accept `{"ssid", "password"}`, save and connect
//! - `GET /test` - liveness probe
//! - OS captive-portal probe paths - `302` to the configuration page
//!
//! `/wc` always answers `200` with a JSON envelope `{"result": "..."}`;
//! `"ok"` means the credentials were saved and the station came up.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use tiny_http::{Header, Method, Request, Response, Server};

use crate::config::Credentials;
use crate::storage::StoreError;
use crate::wifi::{WifiController, WifiError};

use super::page::CONFIG_PAGE;

/// Where captive probes are sent. The fixed softAP gateway address, so the
/// redirect works regardless of which hostname the probe asked for.
const REDIRECT_TARGET: &str = "http://192.168.4.1/webconfig";

/// Paths operating systems request to detect a captive portal.
const CAPTIVE_PROBE_PATHS: [&str; 12] = [
    "/hotspot-detect.html",         // Apple
    "/generate_204",                // Android
    "/mobile/status.php",           // Android
    "/check_network_status.txt",    // Windows
    "/ncsi.txt",                    // Windows
    "/connecttest.txt",             // Windows
    "/redirect",                    // Windows
    "/fwlink/",                     // Microsoft
    "/connectivity-check.html",     // Firefox
    "/success.txt",                 // Various
    "/portal.html",                 // Various
    "/library/test/success.html",   // Apple
];

/// Largest accepted `/wc` request body in bytes. Bigger submissions are
/// rejected whole rather than truncated.
const MAX_BODY_LEN: usize = 256;

/// One scanned network on the `/wl` wire.
#[derive(Serialize)]
struct NetworkEntry<'a> {
    ssid: &'a str,
    rssi: i8,
    auth_mode: u8,
}

fn result_envelope(msg: &str) -> String {
    json!({ "result": msg }).to_string()
}

/// Run the request loop until `shutdown` is set or the listener fails.
pub(super) fn run_server(
    server: Server,
    controller: Arc<Mutex<WifiController>>,
    shutdown: Arc<AtomicBool>,
) {
    // Pre-create headers to avoid repeated allocations
    let json_type = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("static header");
    let html_type =
        Header::from_bytes(&b"Content-Type"[..], &b"text/html"[..]).expect("static header");
    let location =
        Header::from_bytes(&b"Location"[..], REDIRECT_TARGET.as_bytes()).expect("static header");
    let close = Header::from_bytes(&b"Connection"[..], &b"close"[..]).expect("static header");

    loop {
        // Use Acquire ordering to ensure we see the shutdown flag from stop()
        if shutdown.load(Ordering::Acquire) {
            info!("Config server shutting down");
            break;
        }

        match server.recv_timeout(Duration::from_millis(100)) {
            Ok(Some(mut request)) => {
                let method = request.method().clone();
                // Probes may carry query strings; route on the path alone
                let path = request
                    .url()
                    .split('?')
                    .next()
                    .unwrap_or("")
                    .to_string();

                match (method, path.as_str()) {
                    (Method::Get, "/webconfig") => {
                        let response =
                            Response::from_string(CONFIG_PAGE).with_header(html_type.clone());
                        if let Err(e) = request.respond(response) {
                            warn!("Failed to send configuration page: {}", e);
                        }
                    }
                    (Method::Get, "/wl") => {
                        let response = match network_list_json(&controller) {
                            Ok(body) => Response::from_string(body)
                                .with_header(json_type.clone())
                                .with_status_code(200),
                            Err(e) => {
                                warn!("Scan for network list failed: {}", e);
                                Response::from_string("scan failed").with_status_code(500)
                            }
                        };
                        if let Err(e) = request.respond(response) {
                            warn!("Failed to send network list: {}", e);
                        }
                    }
                    (Method::Post, "/wc") => {
                        let verdict = apply_submitted_config(&mut request, &controller);
                        let response = Response::from_string(result_envelope(&verdict))
                            .with_header(json_type.clone());
                        if let Err(e) = request.respond(response) {
                            warn!("Failed to send config verdict: {}", e);
                        }
                    }
                    (Method::Get, "/test") => {
                        let _ = request.respond(Response::from_string("Hello, World!"));
                    }
                    (Method::Get, p) if CAPTIVE_PROBE_PATHS.contains(&p) => {
                        debug!("Captive probe {} redirected", p);
                        let response = Response::empty(302)
                            .with_header(location.clone())
                            .with_header(close.clone());
                        if let Err(e) = request.respond(response) {
                            warn!("Failed to send probe redirect: {}", e);
                        }
                    }
                    _ => {
                        let response = Response::from_string("Not Found").with_status_code(404);
                        if let Err(e) = request.respond(response) {
                            warn!("Failed to send 404: {}", e);
                        }
                    }
                }
            }
            Ok(None) => {
                // Timeout, check shutdown flag and continue
            }
            Err(e) => {
                error!("Config server error: {}", e);
                break;
            }
        }
    }
}

/// Scan through the controller and serialize the results.
fn network_list_json(controller: &Mutex<WifiController>) -> Result<String, WifiError> {
    let records = controller.lock().unwrap().scan()?;
    let entries: Vec<NetworkEntry> = records
        .iter()
        .map(|record| NetworkEntry {
            ssid: &record.ssid,
            rssi: record.rssi,
            auth_mode: record.auth_mode.code(),
        })
        .collect();
    Ok(serde_json::to_string(&entries).expect("network list serializes"))
}

/// Process a `/wc` submission and produce the envelope message.
///
/// Saves first, then connects, so a power cut between the two still leaves
/// the device provisioned for the next boot.
fn apply_submitted_config(request: &mut Request, controller: &Mutex<WifiController>) -> String {
    let mut raw = Vec::new();
    let limit = (MAX_BODY_LEN + 1) as u64;
    if request.as_reader().take(limit).read_to_end(&mut raw).is_err() {
        return "json parse error".into();
    }
    if raw.len() > MAX_BODY_LEN {
        warn!("Rejected config submission over {} bytes", MAX_BODY_LEN);
        return "request too large".into();
    }
    let body = match String::from_utf8(raw) {
        Ok(body) => body,
        Err(_) => return "json parse error".into(),
    };

    let parsed: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!("Config submission is not valid JSON: {}", e);
            return "json parse error".into();
        }
    };
    let ssid = parsed.get("ssid").and_then(Value::as_str);
    let password = parsed.get("password").and_then(Value::as_str);
    let (ssid, password) = match (ssid, password) {
        (Some(ssid), Some(password)) => (ssid, password),
        _ => return "ssid or password is null".into(),
    };

    info!("Received credentials for '{}'", ssid);

    let creds = match Credentials::new(ssid, password) {
        Ok(creds) => creds,
        Err(e) => {
            warn!("Submitted credentials rejected: {}", e);
            return e.to_string();
        }
    };

    let mut ctl = controller.lock().unwrap();
    if let Err(e) = ctl.save_credentials(&creds) {
        warn!("Saving submitted credentials failed: {}", e);
        return match e {
            StoreError::Write { key, .. } => format!("{} save error", key),
            _ => "save error".into(),
        };
    }

    match ctl.connect_in_place(&creds) {
        Ok(()) => "ok".into(),
        Err(e) => {
            warn!("Connection with submitted credentials failed: {}", e);
            "failed".into()
        }
    }
}
