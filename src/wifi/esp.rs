//! ESP-IDF soft-AP driver.
//!
//! Wraps `EspWifi` so the provisioner can drive it step by step. The AP
//! interface gets a fixed router address, `192.168.4.1/24`, with DHCP for
//! associated stations.

use super::{EventCallback, MacAddress, RadioError, RadioEvent, RadioStack};
use crate::config::{AccessPointConfig, AuthMode};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::ipv4::{self, Ipv4Addr, Mask, Subnet};
use esp_idf_svc::netif::{EspNetif, NetifConfiguration, NetifStack};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, BlockingWifi, Configuration, EspWifi, WifiDriver,
    WifiEvent,
};
use esp_idf_sys::{esp, wifi_config_t, wifi_interface_t_WIFI_IF_AP, wifi_mode_t_WIFI_MODE_AP};
use log::{debug, info, warn};

/// Address of the access point on its own network.
pub const AP_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);
const AP_NETMASK: Mask = Mask(24);

/// Soft-AP radio backed by the ESP-IDF Wi-Fi driver.
pub struct EspRadio<'a> {
    modem: Option<Modem>,
    sysloop: EspSystemEventLoop,
    wifi: Option<BlockingWifi<EspWifi<'a>>>,
    subscription: Option<EspSubscription<'static, System>>,
}

impl<'a> EspRadio<'a> {
    /// Prepare the radio. Nothing touches the hardware until
    /// [`RadioStack::init`].
    ///
    /// The default NVS partition is claimed during `init`, so storage must be
    /// initialized by then.
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> Self {
        Self {
            modem: Some(modem),
            sysloop,
            wifi: None,
            subscription: None,
        }
    }

    fn wifi(&mut self) -> Result<&mut BlockingWifi<EspWifi<'a>>, RadioError> {
        self.wifi
            .as_mut()
            .ok_or_else(|| RadioError::new("Wi-Fi driver not initialized"))
    }
}

impl<'a> RadioStack for EspRadio<'a> {
    fn init(&mut self) -> Result<(), RadioError> {
        if self.wifi.is_some() {
            debug!("Wi-Fi driver already initialized, reusing it");
            return Ok(());
        }

        let modem = self
            .modem
            .take()
            .ok_or_else(|| RadioError::new("modem already in use"))?;

        let ap_netif_config = NetifConfiguration {
            ip_configuration: Some(ipv4::Configuration::Router(ipv4::RouterConfiguration {
                subnet: Subnet {
                    gateway: AP_IP,
                    mask: AP_NETMASK,
                },
                dhcp_enabled: true,
                dns: Some(AP_IP),
                secondary_dns: None,
            })),
            ..NetifConfiguration::wifi_default_router()
        };
        let ap_netif = EspNetif::new_with_conf(&ap_netif_config)?;
        let sta_netif = EspNetif::new(NetifStack::Sta)?;

        let nvs = match EspDefaultNvsPartition::take() {
            Ok(nvs) => Some(nvs),
            Err(e) => {
                warn!("NVS partition unavailable, Wi-Fi settings will not persist: {:?}", e);
                None
            }
        };

        let driver = WifiDriver::new(modem, self.sysloop.clone(), nvs)?;
        let wifi = BlockingWifi::wrap(
            EspWifi::wrap_all(driver, sta_netif, ap_netif)?,
            self.sysloop.clone(),
        )?;

        self.wifi = Some(wifi);
        info!("Wi-Fi driver initialized");
        Ok(())
    }

    fn subscribe(&mut self, callback: EventCallback) -> Result<(), RadioError> {
        let subscription = self.sysloop.subscribe::<WifiEvent, _>(move |event| {
            callback(translate(&event));
        })?;
        // Replacing the old subscription unsubscribes it.
        self.subscription = Some(subscription);
        Ok(())
    }

    fn set_mode_access_point(&mut self) -> Result<(), RadioError> {
        self.wifi()?;
        esp!(unsafe { esp_idf_sys::esp_wifi_set_mode(wifi_mode_t_WIFI_MODE_AP) })?;
        Ok(())
    }

    fn apply_config(&mut self, config: &AccessPointConfig) -> Result<(), RadioError> {
        let ap_config = AccessPointConfiguration {
            ssid: config
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| RadioError::new("SSID does not fit the driver"))?,
            password: config
                .passphrase
                .as_str()
                .try_into()
                .map_err(|_| RadioError::new("passphrase does not fit the driver"))?,
            ssid_hidden: false,
            channel: config.channel,
            auth_method: auth_method(config.auth_mode),
            max_connections: config.max_connections,
            ..Default::default()
        };

        self.wifi()?
            .set_configuration(&Configuration::AccessPoint(ap_config))?;

        // The high-level configuration has no PMF knob; patch the raw AP config.
        unsafe {
            let mut raw: wifi_config_t = core::mem::zeroed();
            esp!(esp_idf_sys::esp_wifi_get_config(
                wifi_interface_t_WIFI_IF_AP,
                &mut raw
            ))?;
            raw.ap.pmf_cfg.required = config.pmf_required;
            esp!(esp_idf_sys::esp_wifi_set_config(
                wifi_interface_t_WIFI_IF_AP,
                &mut raw
            ))?;
        }

        Ok(())
    }

    fn start(&mut self) -> Result<(), RadioError> {
        self.wifi()?.start()?;
        info!("Soft AP up at {}", AP_IP);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RadioError> {
        self.wifi()?.stop()?;
        Ok(())
    }
}

fn auth_method(mode: AuthMode) -> AuthMethod {
    match mode {
        AuthMode::Open => AuthMethod::None,
        AuthMode::Wpa2Psk => AuthMethod::WPA2Personal,
        AuthMode::Wpa3Psk => AuthMethod::WPA3Personal,
        AuthMode::Wpa2Wpa3Psk => AuthMethod::WPA2WPA3Personal,
    }
}

fn translate(event: &WifiEvent<'_>) -> RadioEvent {
    match event {
        WifiEvent::ApStaConnected(sta) => RadioEvent::StationConnected {
            mac: MacAddress(sta.mac()),
            aid: sta.aid(),
        },
        WifiEvent::ApStaDisconnected(sta) => RadioEvent::StationDisconnected {
            mac: MacAddress(sta.mac()),
            aid: sta.aid(),
        },
        other => RadioEvent::Unrecognized(format!("{:?}", other)),
    }
}
