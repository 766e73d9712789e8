//! Soft-AP provisioning firmware binary.
//!
//! Runs on both ESP32 and host platforms:
//! - **Host**: `SOFTAP_SSID=esp_tutorial SOFTAP_PASSPHRASE=test_esp12 cargo run`
//!   (simulated radio, store under `~/.softap-provisioner`, HTTP on 8080)
//! - **ESP32**: `SOFTAP_SSID=... SOFTAP_PASSPHRASE=... cargo espflash flash --features esp32 --release`
//!   (settings are taken from the build environment, HTTP on 80)
//!
//! ## Endpoints
//!
//! - `GET /` - landing page
//! - `POST /echo` - echoes the request body
//! - `GET /stations` - associated stations as JSON
//!
//! Exits non-zero if anything fails during startup.

use log::{error, info};
use softap_provisioner::network::routes;
use softap_provisioner::{
    AccessPointConfig, AccessPointProvisioner, BootError, ConfigError, HttpConfig, Provisioning,
    RadioStack,
};
use std::time::Duration;

/// Exit code for unusable configuration.
const EXIT_BAD_CONFIG: i32 = 1;

/// How often the main loop reports the station count.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Access point settings baked in by the build environment.
#[cfg(feature = "esp32")]
fn load_ap_config() -> Result<AccessPointConfig, ConfigError> {
    use softap_provisioner::config::{
        ENV_AUTH, ENV_CHANNEL, ENV_MAX_CONNECTIONS, ENV_PASSPHRASE, ENV_SSID,
    };
    AccessPointConfig::from_lookup(|key| {
        let value = match key {
            k if k == ENV_SSID => option_env!("SOFTAP_SSID"),
            k if k == ENV_PASSPHRASE => option_env!("SOFTAP_PASSPHRASE"),
            k if k == ENV_CHANNEL => option_env!("SOFTAP_CHANNEL"),
            k if k == ENV_MAX_CONNECTIONS => option_env!("SOFTAP_MAX_CONNECTIONS"),
            k if k == ENV_AUTH => option_env!("SOFTAP_AUTH"),
            _ => None,
        };
        value.map(str::to_string)
    })
}

#[cfg(not(feature = "esp32"))]
fn load_ap_config() -> Result<AccessPointConfig, ConfigError> {
    AccessPointConfig::from_env()
}

#[cfg(feature = "esp32")]
fn run(ap_config: &AccessPointConfig) -> Result<Provisioning<impl RadioStack>, BootError> {
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use softap_provisioner::persistence::NvsFlash;
    use softap_provisioner::wifi::EspRadio;

    use softap_provisioner::ProvisionError;

    // Without the modem or the event loop the radio cannot come up.
    let radio_unavailable = |e: esp_idf_sys::EspError| {
        BootError::Provision(ProvisionError::RadioInitFailed(e.into()))
    };
    let peripherals = Peripherals::take().map_err(radio_unavailable)?;
    let sysloop = EspSystemEventLoop::take().map_err(radio_unavailable)?;

    let http_config = HttpConfig::default();
    let mut store = NvsFlash::new();
    Provisioning::bootstrap(
        &mut store,
        AccessPointProvisioner::new(EspRadio::new(peripherals.modem, sysloop)),
        ap_config,
        http_config,
        |ap| routes::default_routes(ap.stations()),
    )
}

#[cfg(not(feature = "esp32"))]
fn run(ap_config: &AccessPointConfig) -> Result<Provisioning<impl RadioStack>, BootError> {
    use softap_provisioner::{FileStore, SimulatedRadio};

    /// Unprivileged default so the host build runs without root.
    const HOST_HTTP_PORT: u16 = 8080;

    let http_config = match HttpConfig::from_env(HOST_HTTP_PORT) {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid HTTP configuration: {}", e);
            std::process::exit(EXIT_BAD_CONFIG);
        }
    };
    let mut store = match FileStore::at_default_path() {
        Ok(s) => s,
        Err(e) => {
            error!("No location for the store: {}", e);
            std::process::exit(EXIT_BAD_CONFIG);
        }
    };

    Provisioning::bootstrap(
        &mut store,
        AccessPointProvisioner::new(SimulatedRadio::new()),
        ap_config,
        http_config,
        |ap| routes::default_routes(ap.stations()),
    )
}

fn main() {
    platform_init();

    info!("=== softap-provisioner starting ===");

    #[cfg(feature = "esp32")]
    info!("Platform: ESP32");
    #[cfg(not(feature = "esp32"))]
    info!("Platform: Host");

    let ap_config = match load_ap_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid access point configuration: {}", e);
            std::process::exit(EXIT_BAD_CONFIG);
        }
    };

    let provisioning = match run(&ap_config) {
        Ok(p) => p,
        Err(e) => e.exit(),
    };

    if let Some(addr) = provisioning.http().local_addr() {
        info!("Connect to {} and browse to port {}", ap_config.ssid, addr.port());
    }

    loop {
        std::thread::sleep(HEARTBEAT_INTERVAL);
        info!(
            "Heartbeat: {} station(s) on {}",
            provisioning.access_point().station_count(),
            provisioning.access_point().ssid()
        );
    }
}
