//! ESP-IDF radio behind the [`WifiStack`] seam.
//!
//! Wraps `WifiDriver` with both interfaces so the access point and the
//! station can run at the same time: the access point interface carries a
//! fixed gateway address and a DHCP server that advertises the device as
//! the DNS server, which is what lets the captive portal catch clients.
//!
//! Radio events arrive on the system event loop and are translated into
//! [`StackEvent`]s for the shared bridge. Subscriptions are dropped before
//! the radio is torn down, so events from a teardown cannot resolve the
//! operation that triggered it.

use std::net::Ipv4Addr;

use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::ipv4::{self, Mask, Subnet};
use esp_idf_svc::netif::{EspNetif, IpEvent, NetifConfiguration, NetifStack};
use esp_idf_svc::nvs::{EspNvsPartition, NvsDefault};
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi, ScanConfig,
    WifiDriver, WifiEvent,
};
use esp_idf_sys::{esp, esp_wifi_connect, EspError};
use log::{debug, warn};

use crate::config::{Credentials, NetworkRecord};
use crate::wifi::events::{EventBridge, FollowUp, StackEvent};
use crate::wifi::stack::{StackError, WifiStack};

/// Fixed address of the configuration access point.
pub const AP_GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

const AP_NETMASK: Mask = Mask(24);
const AP_CHANNEL: u8 = 1;
const AP_MAX_CONNECTIONS: u16 = 4;

/// ESP-IDF implementation of [`WifiStack`].
pub struct EspWifiStack {
    wifi: EspWifi<'static>,
    sysloop: EspSystemEventLoop,
    bridge: EventBridge,
    subscriptions: Vec<EspSubscription<'static, System>>,
    ap_config: Option<AccessPointConfiguration>,
}

impl EspWifiStack {
    /// Wrap the modem with a station interface and an access point
    /// interface on the fixed gateway address.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspNvsPartition<NvsDefault>>,
    ) -> Result<Self, EspError> {
        let driver = WifiDriver::new(modem, sysloop.clone(), nvs)?;
        let sta_netif = EspNetif::new(NetifStack::Sta)?;
        let ap_netif = EspNetif::new_with_conf(&NetifConfiguration {
            ip_configuration: Some(ipv4::Configuration::Router(ipv4::RouterConfiguration {
                subnet: Subnet {
                    gateway: AP_GATEWAY,
                    mask: AP_NETMASK,
                },
                dhcp_enabled: true,
                // Clients are told to resolve DNS through us
                dns: Some(AP_GATEWAY),
                secondary_dns: None,
            })),
            ..NetifConfiguration::wifi_default_router()
        })?;
        let wifi = EspWifi::wrap_all(driver, sta_netif, ap_netif)?;

        Ok(Self {
            wifi,
            sysloop,
            bridge: EventBridge::new(),
            subscriptions: Vec::new(),
            ap_config: None,
        })
    }

    /// Register fresh event loop subscriptions that feed the bridge.
    fn resubscribe(&mut self) -> Result<(), EspError> {
        self.subscriptions.clear();

        let bridge = self.bridge.clone();
        let wifi_sub = self.sysloop.subscribe::<WifiEvent, _>(move |event| {
            if let Some(event) = map_wifi_event(&event) {
                if let Some(FollowUp::IssueConnect) = bridge.dispatch(event) {
                    if let Err(e) = esp!(unsafe { esp_wifi_connect() }) {
                        warn!("Connect from event context failed: {}", e);
                    }
                }
            }
        })?;

        let bridge = self.bridge.clone();
        let ip_sub = self.sysloop.subscribe::<IpEvent, _>(move |event| {
            if let Some(event) = map_ip_event(&event) {
                bridge.dispatch(event);
            }
        })?;

        self.subscriptions.push(wifi_sub);
        self.subscriptions.push(ip_sub);
        Ok(())
    }

    /// Stop the radio with no subscriptions attached, so teardown events
    /// go nowhere.
    fn silent_stop(&mut self) -> Result<(), StackError> {
        self.subscriptions.clear();
        if self.wifi.is_started().unwrap_or(false) {
            self.wifi
                .stop()
                .map_err(|e| StackError::command("radio stop", e))?;
        }
        Ok(())
    }

    fn client_configuration(creds: &Credentials) -> Result<ClientConfiguration, StackError> {
        Ok(ClientConfiguration {
            ssid: creds
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| StackError::command("station configuration", "SSID does not fit"))?,
            password: creds.password.as_str().try_into().map_err(|_| {
                StackError::command("station configuration", "password does not fit")
            })?,
            auth_method: auth_method_for(creds),
            ..Default::default()
        })
    }

    fn access_point_configuration(
        creds: &Credentials,
    ) -> Result<AccessPointConfiguration, StackError> {
        Ok(AccessPointConfiguration {
            ssid: creds.ssid.as_str().try_into().map_err(|_| {
                StackError::command("access point configuration", "SSID does not fit")
            })?,
            password: creds.password.as_str().try_into().map_err(|_| {
                StackError::command("access point configuration", "password does not fit")
            })?,
            channel: AP_CHANNEL,
            auth_method: auth_method_for(creds),
            max_connections: AP_MAX_CONNECTIONS,
            ..Default::default()
        })
    }
}

impl WifiStack for EspWifiStack {
    fn bridge(&self) -> &EventBridge {
        &self.bridge
    }

    fn restart_station(&mut self, creds: &Credentials) -> Result<(), StackError> {
        self.silent_stop()?;
        self.ap_config = None;

        let client = Self::client_configuration(creds)?;
        self.wifi
            .set_configuration(&Configuration::Client(client))
            .map_err(|e| StackError::command("station configuration", e))?;

        // Subscriptions go in before start so the started event is seen
        self.resubscribe()
            .map_err(|e| StackError::command("event subscription", e))?;
        self.wifi
            .start()
            .map_err(|e| StackError::command("radio start", e))?;
        Ok(())
    }

    fn restart_access_point(&mut self, creds: &Credentials) -> Result<(), StackError> {
        self.silent_stop()?;

        // Mixed mode keeps the station interface usable, so scans and
        // in-place connect attempts work while the portal is up
        let ap = Self::access_point_configuration(creds)?;
        self.wifi
            .set_configuration(&Configuration::Mixed(ClientConfiguration::default(), ap.clone()))
            .map_err(|e| StackError::command("access point configuration", e))?;
        self.ap_config = Some(ap);

        self.resubscribe()
            .map_err(|e| StackError::command("event subscription", e))?;
        self.wifi
            .start()
            .map_err(|e| StackError::command("radio start", e))?;
        Ok(())
    }

    fn apply_station(&mut self, creds: &Credentials) -> Result<(), StackError> {
        if !self.wifi.is_started().unwrap_or(false) {
            return Err(StackError::NotReady("radio not started"));
        }

        let client = Self::client_configuration(creds)?;
        let config = match &self.ap_config {
            Some(ap) => Configuration::Mixed(client, ap.clone()),
            None => Configuration::Client(client),
        };
        self.wifi
            .set_configuration(&config)
            .map_err(|e| StackError::command("station configuration", e))?;
        Ok(())
    }

    fn connect(&mut self) -> Result<(), StackError> {
        self.wifi
            .connect()
            .map_err(|e| StackError::command("connect", e))
    }

    fn start_scan(&mut self) -> Result<(), StackError> {
        if self.subscriptions.is_empty() {
            self.resubscribe()
                .map_err(|e| StackError::command("event subscription", e))?;
        }
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi
                .set_configuration(&Configuration::Client(ClientConfiguration::default()))
                .map_err(|e| StackError::command("scan configuration", e))?;
            self.wifi
                .start()
                .map_err(|e| StackError::command("radio start", e))?;
        }

        self.wifi
            .driver_mut()
            .start_scan(&ScanConfig::default(), false)
            .map_err(|e| StackError::command("scan start", e))
    }

    fn stop_scan(&mut self) {
        if let Err(e) = self.wifi.driver_mut().stop_scan() {
            debug!("Stopping scan cycle: {}", e);
        }
    }

    fn scan_results(&mut self) -> Result<Vec<NetworkRecord>, StackError> {
        let infos = self
            .wifi
            .driver_mut()
            .get_scan_result()
            .map_err(|e| StackError::command("scan result retrieval", e))?;

        Ok(infos
            .into_iter()
            .map(|info| NetworkRecord {
                ssid: info.ssid.as_str().to_string(),
                rssi: info.signal_strength,
                auth_mode: info.auth_method.into(),
            })
            .collect())
    }

    fn station_ip(&self) -> Option<Ipv4Addr> {
        self.wifi
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
            .filter(|ip| !ip.is_unspecified())
    }

    fn access_point_ip(&self) -> Option<Ipv4Addr> {
        self.wifi
            .ap_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
            .filter(|ip| !ip.is_unspecified())
    }

    fn detach(&mut self) {
        self.subscriptions.clear();
    }
}

fn auth_method_for(creds: &Credentials) -> AuthMethod {
    if creds.is_open() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    }
}

fn map_wifi_event(event: &WifiEvent) -> Option<StackEvent> {
    match event {
        WifiEvent::StaStarted => Some(StackEvent::StaStarted),
        WifiEvent::StaConnected(_) => Some(StackEvent::StaConnected),
        WifiEvent::StaDisconnected(_) => Some(StackEvent::StaDisconnected),
        WifiEvent::ScanDone(_) => Some(StackEvent::ScanDone),
        WifiEvent::ApStaConnected(_) => Some(StackEvent::ApClientJoined),
        WifiEvent::ApStaDisconnected(_) => Some(StackEvent::ApClientLeft),
        _ => None,
    }
}

fn map_ip_event(event: &IpEvent) -> Option<StackEvent> {
    match event {
        IpEvent::DhcpIpAssigned(_) => Some(StackEvent::GotIp),
        _ => None,
    }
}

#[cfg(feature = "tap-tests")]
mod tap_tests {
    use super::*;
    use esp_idf_hal::peripherals::Peripherals;
    use wifi_provision_esp32_macros::tap_test;

    #[tap_test]
    fn access_point_announces_gateway_address() {
        let peripherals = Peripherals::take().expect("peripherals already taken");
        let sysloop = EspSystemEventLoop::take().expect("event loop unavailable");
        let nvs = crate::nvs_default_partition().ok();

        let mut stack =
            EspWifiStack::new(peripherals.modem, sysloop, nvs).expect("failed to wrap radio");
        let creds = Credentials::open("ProvisionSelfTest").unwrap();
        stack
            .restart_access_point(&creds)
            .expect("access point restart failed");

        assert_eq!(stack.access_point_ip(), Some(AP_GATEWAY));
        stack.detach();
    }
}
