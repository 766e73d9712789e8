//! Access point configuration.
//!
//! Platform-independent types describing the network the device hosts.
//! Everything here is testable on the host machine.
//!
//! # Example
//!
//! ```
//! use softap_provisioner::config::{AccessPointConfig, AuthMode};
//!
//! let config = AccessPointConfig::wpa2("esp_tutorial", "test_esp12").unwrap();
//! assert_eq!(config.auth_mode, AuthMode::Wpa2Psk);
//! assert!(config.validate().is_ok());
//! ```

use std::fmt;
use zeroize::Zeroizing;

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum passphrase length for WPA2/WPA3 personal.
pub const MAX_PASSPHRASE_LEN: usize = 64;

/// Minimum passphrase length for WPA2/WPA3 personal.
pub const MIN_PASSPHRASE_LEN: usize = 8;

/// Highest 2.4 GHz channel accepted.
pub const MAX_CHANNEL: u8 = 13;

/// Station limit of the ESP-IDF soft-AP (`ESP_WIFI_MAX_CONN_NUM`).
pub const MAX_STATIONS: u16 = 10;

/// Environment variable holding the SSID.
pub const ENV_SSID: &str = "SOFTAP_SSID";
/// Environment variable holding the passphrase.
pub const ENV_PASSPHRASE: &str = "SOFTAP_PASSPHRASE";
/// Environment variable holding the channel.
pub const ENV_CHANNEL: &str = "SOFTAP_CHANNEL";
/// Environment variable holding the station limit.
pub const ENV_MAX_CONNECTIONS: &str = "SOFTAP_MAX_CONNECTIONS";
/// Environment variable holding the auth mode (`open`, `wpa2`, `wpa3`, `wpa2-wpa3`).
pub const ENV_AUTH: &str = "SOFTAP_AUTH";

/// Authentication mode advertised by the access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// No authentication.
    Open,
    /// WPA2 personal (pre-shared key).
    #[default]
    Wpa2Psk,
    /// WPA3 personal (SAE).
    Wpa3Psk,
    /// WPA2/WPA3 transition mode.
    Wpa2Wpa3Psk,
}

impl AuthMode {
    /// Whether this mode needs a passphrase.
    pub fn requires_passphrase(&self) -> bool {
        !matches!(self, Self::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Wpa2Psk => "wpa2",
            Self::Wpa3Psk => "wpa3",
            Self::Wpa2Wpa3Psk => "wpa2-wpa3",
        }
    }
}

impl std::str::FromStr for AuthMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" | "none" => Ok(Self::Open),
            "wpa2" | "wpa2-psk" => Ok(Self::Wpa2Psk),
            "wpa3" | "wpa3-psk" => Ok(Self::Wpa3Psk),
            "wpa2-wpa3" | "wpa2wpa3" => Ok(Self::Wpa2Wpa3Psk),
            _ => Err(ConfigError::InvalidValue {
                key: ENV_AUTH,
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Network identity of the hosted access point.
///
/// The passphrase is wiped from memory when the config is dropped and never
/// shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessPointConfig {
    /// Network SSID (1-32 bytes).
    pub ssid: String,
    /// Passphrase (8-64 bytes, empty for open networks).
    pub passphrase: Zeroizing<String>,
    /// 2.4 GHz channel (1-13).
    pub channel: u8,
    /// Maximum number of associated stations.
    pub max_connections: u16,
    /// Authentication mode.
    pub auth_mode: AuthMode,
    /// Require Protected Management Frames from stations.
    pub pmf_required: bool,
}

impl AccessPointConfig {
    /// Create a validated WPA2 configuration with default channel and limits.
    pub fn wpa2(ssid: impl Into<String>, passphrase: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            ssid: ssid.into(),
            passphrase: Zeroizing::new(passphrase.into()),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a validated configuration for an open network.
    pub fn open(ssid: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            ssid: ssid.into(),
            auth_mode: AuthMode::Open,
            pmf_required: false,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u16) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_pmf_required(mut self, required: bool) -> Self {
        self.pmf_required = required;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.is_empty() {
            return Err(ConfigError::SsidEmpty);
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::SsidTooLong {
                len: self.ssid.len(),
                max: MAX_SSID_LEN,
            });
        }

        if self.auth_mode.requires_passphrase() {
            let len = self.passphrase.len();
            if len < MIN_PASSPHRASE_LEN {
                return Err(ConfigError::PassphraseTooShort {
                    len,
                    min: MIN_PASSPHRASE_LEN,
                });
            }
            if len > MAX_PASSPHRASE_LEN {
                return Err(ConfigError::PassphraseTooLong {
                    len,
                    max: MAX_PASSPHRASE_LEN,
                });
            }
        } else if !self.passphrase.is_empty() {
            return Err(ConfigError::PassphraseOnOpenNetwork);
        }

        if self.channel == 0 || self.channel > MAX_CHANNEL {
            return Err(ConfigError::InvalidChannel(self.channel));
        }
        if self.max_connections == 0 || self.max_connections > MAX_STATIONS {
            return Err(ConfigError::InvalidMaxConnections(self.max_connections));
        }

        // SAE mandates management frame protection.
        if self.auth_mode == AuthMode::Wpa3Psk && !self.pmf_required {
            return Err(ConfigError::PmfRequired);
        }

        Ok(())
    }

    /// Check if this is an open network (no passphrase).
    pub fn is_open(&self) -> bool {
        self.auth_mode == AuthMode::Open
    }

    /// Build a configuration from the process environment.
    ///
    /// `SOFTAP_SSID` is mandatory; the passphrase is mandatory unless
    /// `SOFTAP_AUTH=open`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ssid = lookup(ENV_SSID).ok_or(ConfigError::Missing(ENV_SSID))?;

        let auth_mode = match lookup(ENV_AUTH) {
            Some(raw) => raw.parse()?,
            None => AuthMode::default(),
        };

        let passphrase = match (auth_mode.requires_passphrase(), lookup(ENV_PASSPHRASE)) {
            (true, Some(pass)) => pass,
            (true, None) => return Err(ConfigError::Missing(ENV_PASSPHRASE)),
            (false, _) => String::new(),
        };

        let mut config = Self {
            ssid,
            passphrase: Zeroizing::new(passphrase),
            auth_mode,
            pmf_required: auth_mode != AuthMode::Open,
            ..Self::default()
        };

        if let Some(raw) = lookup(ENV_CHANNEL) {
            config.channel = parse_number(ENV_CHANNEL, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_CONNECTIONS) {
            config.max_connections = parse_number(ENV_MAX_CONNECTIONS, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

impl Default for AccessPointConfig {
    /// Channel 1, four stations, WPA2 with PMF. SSID and passphrase are empty
    /// and must be filled in before the config validates.
    fn default() -> Self {
        Self {
            ssid: String::new(),
            passphrase: Zeroizing::new(String::new()),
            channel: 1,
            max_connections: 4,
            auth_mode: AuthMode::Wpa2Psk,
            pmf_required: true,
        }
    }
}

impl fmt::Debug for AccessPointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPointConfig")
            .field("ssid", &self.ssid)
            .field("passphrase", &"<redacted>")
            .field("channel", &self.channel)
            .field("max_connections", &self.max_connections)
            .field("auth_mode", &self.auth_mode)
            .field("pmf_required", &self.pmf_required)
            .finish()
    }
}

/// Errors that can occur while building or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Passphrase is too short for a PSK mode.
    PassphraseTooShort { len: usize, min: usize },
    /// Passphrase exceeds maximum length.
    PassphraseTooLong { len: usize, max: usize },
    /// A passphrase was given for an open network.
    PassphraseOnOpenNetwork,
    /// Channel outside 1-13.
    InvalidChannel(u8),
    /// Station limit outside 1-10.
    InvalidMaxConnections(u16),
    /// WPA3 without PMF.
    PmfRequired,
    /// Required setting not provided.
    Missing(&'static str),
    /// Setting present but unparseable.
    InvalidValue { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PassphraseTooShort { len, min } => {
                write!(f, "passphrase too short: {} bytes (min {})", len, min)
            }
            Self::PassphraseTooLong { len, max } => {
                write!(f, "passphrase too long: {} bytes (max {})", len, max)
            }
            Self::PassphraseOnOpenNetwork => {
                write!(f, "open networks must not have a passphrase")
            }
            Self::InvalidChannel(ch) => {
                write!(f, "invalid channel {} (expected 1-{})", ch, MAX_CHANNEL)
            }
            Self::InvalidMaxConnections(n) => {
                write!(f, "invalid station limit {} (expected 1-{})", n, MAX_STATIONS)
            }
            Self::PmfRequired => write!(f, "WPA3 requires protected management frames"),
            Self::Missing(key) => write!(f, "missing setting: {}", key),
            Self::InvalidValue { key, value } => {
                write!(f, "invalid value for {}: {:?}", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
