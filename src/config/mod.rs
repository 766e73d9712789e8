//! Device configuration.
//!
//! # Components
//!
//! - [`AccessPointConfig`] - network identity of the hosted access point
//!   (host-testable)
//!
//! Settings come from `SOFTAP_*` variables: the host binary reads the process
//! environment via [`AccessPointConfig::from_env`], the ESP32 binary reads
//! the build environment through [`AccessPointConfig::from_lookup`].

mod access_point;

pub use access_point::{
    AccessPointConfig, AuthMode, ConfigError, ENV_AUTH, ENV_CHANNEL, ENV_MAX_CONNECTIONS,
    ENV_PASSPHRASE, ENV_SSID, MAX_CHANNEL, MAX_PASSPHRASE_LEN, MAX_SSID_LEN, MAX_STATIONS,
    MIN_PASSPHRASE_LEN,
};
