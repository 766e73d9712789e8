//! Access point provisioner.
//!
//! Validates the configuration, then drives the radio through
//! init → subscribe → set mode → apply config → start. The event callback is
//! registered before the radio is switched on so no early association is
//! missed. The driver is brought up once per radio; a restart after `stop`,
//! or a retry after a failed `start`, begins at `subscribe`.

use super::stations::{StationEvent, StationRegistry};
use super::{EventCallback, RadioError, RadioEvent, RadioStack};
use crate::config::{AccessPointConfig, ConfigError};
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;

/// Brings up a soft access point on a [`RadioStack`].
pub struct AccessPointProvisioner<R: RadioStack> {
    radio: R,
    initialized: bool,
    started: bool,
    relay: Option<SyncSender<StationEvent>>,
}

/// Proof that the access point is running. Pass it back to
/// [`AccessPointProvisioner::stop`].
#[derive(Debug)]
pub struct ProvisionerHandle {
    ssid: String,
    channel: u8,
    stations: Arc<StationRegistry>,
}

impl ProvisionerHandle {
    /// SSID the access point is beaconing.
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Shared registry of associated stations.
    pub fn stations(&self) -> Arc<StationRegistry> {
        self.stations.clone()
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }
}

impl<R: RadioStack> AccessPointProvisioner<R> {
    pub fn new(radio: R) -> Self {
        Self {
            radio,
            initialized: false,
            started: false,
            relay: None,
        }
    }

    /// Relay station events to a bounded channel.
    ///
    /// The radio callback never waits on the channel: when it is full the
    /// event is dropped with a warning. Must be called before [`start`].
    ///
    /// [`start`]: Self::start
    pub fn with_event_channel(&mut self, capacity: usize) -> Receiver<StationEvent> {
        let (tx, rx) = mpsc::sync_channel(capacity);
        self.relay = Some(tx);
        rx
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Configure and start the access point.
    ///
    /// Nothing is retried; on failure the radio is left wherever the failing
    /// step put it and the caller decides what to do.
    pub fn start(&mut self, config: &AccessPointConfig) -> Result<ProvisionerHandle, ProvisionError> {
        if self.started {
            return Err(ProvisionError::AlreadyStarted);
        }

        config.validate()?;

        let stations = Arc::new(StationRegistry::new());

        if !self.initialized {
            self.radio
                .init()
                .map_err(ProvisionError::RadioInitFailed)?;
            self.initialized = true;
        }
        self.radio
            .subscribe(event_callback(stations.clone(), self.relay.clone()))
            .map_err(ProvisionError::RadioInitFailed)?;
        self.radio
            .set_mode_access_point()
            .map_err(ProvisionError::ApplyConfigFailed)?;
        self.radio
            .apply_config(config)
            .map_err(ProvisionError::ApplyConfigFailed)?;
        self.radio.start().map_err(ProvisionError::StartFailed)?;

        self.started = true;
        info!(
            "Soft AP started. SSID: {} channel: {} auth: {} max stations: {}",
            config.ssid, config.channel, config.auth_mode, config.max_connections
        );

        Ok(ProvisionerHandle {
            ssid: config.ssid.clone(),
            channel: config.channel,
            stations,
        })
    }

    /// Stop the access point. A later [`start`](Self::start) is allowed.
    pub fn stop(&mut self, handle: ProvisionerHandle) {
        if let Err(e) = self.radio.stop() {
            error!("Failed to stop soft AP {}: {}", handle.ssid, e);
        } else {
            info!("Soft AP {} stopped", handle.ssid);
        }
        self.started = false;
    }
}

/// Build the callback handed to the radio stack.
fn event_callback(
    stations: Arc<StationRegistry>,
    relay: Option<SyncSender<StationEvent>>,
) -> EventCallback {
    Arc::new(move |event| {
        let station_event = match event {
            RadioEvent::StationConnected { mac, aid } => {
                info!("Station {} joined, AID={}", mac, aid);
                StationEvent::connected(mac, aid)
            }
            RadioEvent::StationDisconnected { mac, aid } => {
                info!("Station {} left, AID={}", mac, aid);
                StationEvent::disconnected(mac, aid)
            }
            RadioEvent::Unrecognized(what) => {
                debug!("Ignoring radio event: {}", what);
                return;
            }
        };

        if !stations.apply(&station_event) {
            debug!("Disconnect for unknown station {}", station_event.station_id);
        }

        if let Some(tx) = &relay {
            match tx.try_send(station_event) {
                Ok(()) => {}
                Err(TrySendError::Full(ev)) => {
                    warn!("Station event queue full, dropping {:?}", ev.kind);
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!("Station event receiver gone");
                }
            }
        }
    })
}

/// Errors from [`AccessPointProvisioner::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    /// Driver init or event subscription failed.
    RadioInitFailed(RadioError),
    /// Configuration rejected before touching the radio.
    InvalidConfig(ConfigError),
    /// Mode switch or configuration apply failed.
    ApplyConfigFailed(RadioError),
    /// Radio refused to start.
    StartFailed(RadioError),
    /// `start` called on a running access point.
    AlreadyStarted,
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RadioInitFailed(e) => write!(f, "radio init failed: {}", e),
            Self::InvalidConfig(e) => write!(f, "invalid AP config: {}", e),
            Self::ApplyConfigFailed(e) => write!(f, "failed to apply AP config: {}", e),
            Self::StartFailed(e) => write!(f, "failed to start AP: {}", e),
            Self::AlreadyStarted => write!(f, "access point already started"),
        }
    }
}

impl std::error::Error for ProvisionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RadioInitFailed(e) | Self::ApplyConfigFailed(e) | Self::StartFailed(e) => {
                Some(e)
            }
            Self::InvalidConfig(e) => Some(e),
            Self::AlreadyStarted => None,
        }
    }
}

impl From<ConfigError> for ProvisionError {
    fn from(e: ConfigError) -> Self {
        Self::InvalidConfig(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wifi::{MacAddress, RadioCall, SimulatedRadio, StationEventKind};
    use zeroize::Zeroizing;

    const MAC: MacAddress = MacAddress([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]);

    fn tutorial_config() -> AccessPointConfig {
        AccessPointConfig::wpa2("esp_tutorial", "test_esp12")
            .unwrap()
            .with_channel(1)
            .with_max_connections(2)
    }

    #[test]
    fn test_start_calls_radio_in_order() {
        let radio = SimulatedRadio::new();
        let mut provisioner = AccessPointProvisioner::new(radio.clone());

        let handle = provisioner.start(&tutorial_config()).unwrap();

        assert_eq!(handle.ssid(), "esp_tutorial");
        assert_eq!(handle.channel(), 1);
        assert_eq!(
            radio.calls(),
            vec![
                RadioCall::Init,
                RadioCall::Subscribe,
                RadioCall::SetMode,
                RadioCall::ApplyConfig,
                RadioCall::Start,
            ]
        );
        assert!(radio.is_running());
        assert_eq!(radio.applied_config().unwrap().ssid, "esp_tutorial");
    }

    #[test]
    fn test_short_and_long_passphrases_rejected() {
        let too_long = "x".repeat(65);
        for passphrase in ["", "1234567", too_long.as_str()] {
            let radio = SimulatedRadio::new();
            let mut provisioner = AccessPointProvisioner::new(radio.clone());
            let config = AccessPointConfig {
                passphrase: Zeroizing::new(passphrase.to_string()),
                ..tutorial_config()
            };

            let result = provisioner.start(&config);

            assert!(
                matches!(result, Err(ProvisionError::InvalidConfig(_))),
                "passphrase of {} bytes accepted",
                passphrase.len()
            );
            assert!(radio.calls().is_empty(), "radio touched on invalid config");
        }
    }

    #[test]
    fn test_second_start_rejected() {
        let mut provisioner = AccessPointProvisioner::new(SimulatedRadio::new());
        let _handle = provisioner.start(&tutorial_config()).unwrap();

        assert_eq!(
            provisioner.start(&tutorial_config()).unwrap_err(),
            ProvisionError::AlreadyStarted
        );
    }

    #[test]
    fn test_restart_after_stop() {
        let radio = SimulatedRadio::new();
        let mut provisioner = AccessPointProvisioner::new(radio.clone());
        let handle = provisioner.start(&tutorial_config()).unwrap();

        provisioner.stop(handle);
        assert!(!provisioner.is_started());
        assert!(!radio.is_running());

        assert!(provisioner.start(&tutorial_config()).is_ok());
    }

    #[test]
    fn test_restart_reuses_driver() {
        let radio = SimulatedRadio::with_single_init();
        let mut provisioner = AccessPointProvisioner::new(radio.clone());
        let handle = provisioner.start(&tutorial_config()).unwrap();
        provisioner.stop(handle);

        let handle = provisioner.start(&tutorial_config()).unwrap();

        assert_eq!(
            radio.calls(),
            vec![
                RadioCall::Init,
                RadioCall::Subscribe,
                RadioCall::SetMode,
                RadioCall::ApplyConfig,
                RadioCall::Start,
                RadioCall::Stop,
                RadioCall::Subscribe,
                RadioCall::SetMode,
                RadioCall::ApplyConfig,
                RadioCall::Start,
            ]
        );
        assert!(radio.is_running());

        // Events go to the registry of the current run.
        radio.emit(RadioEvent::StationConnected { mac: MAC, aid: 2 });
        assert_eq!(handle.station_count(), 1);
    }

    #[test]
    fn test_retry_after_failed_start() {
        let radio = SimulatedRadio::with_single_init();
        radio.fail_on(RadioCall::Start, RadioError::new("busy"));
        let mut provisioner = AccessPointProvisioner::new(radio.clone());

        assert!(matches!(
            provisioner.start(&tutorial_config()),
            Err(ProvisionError::StartFailed(_))
        ));

        radio.clear_failure();
        assert!(provisioner.start(&tutorial_config()).is_ok());
        assert_eq!(
            radio.calls().iter().filter(|c| **c == RadioCall::Init).count(),
            1
        );
    }

    #[test]
    fn test_failures_map_to_kinds() {
        let cases = [
            (RadioCall::Init, "RadioInitFailed"),
            (RadioCall::Subscribe, "RadioInitFailed"),
            (RadioCall::SetMode, "ApplyConfigFailed"),
            (RadioCall::ApplyConfig, "ApplyConfigFailed"),
            (RadioCall::Start, "StartFailed"),
        ];

        for (call, expected) in cases {
            let radio = SimulatedRadio::new();
            radio.fail_on(call, RadioError::with_code(0x3001, "boom"));
            let mut provisioner = AccessPointProvisioner::new(radio);

            let err = provisioner.start(&tutorial_config()).unwrap_err();
            let kind = match err {
                ProvisionError::RadioInitFailed(_) => "RadioInitFailed",
                ProvisionError::ApplyConfigFailed(_) => "ApplyConfigFailed",
                ProvisionError::StartFailed(_) => "StartFailed",
                other => panic!("unexpected error {:?}", other),
            };
            assert_eq!(kind, expected, "failure on {:?}", call);
            assert!(!provisioner.is_started());
        }
    }

    #[test]
    fn test_events_update_registry() {
        let radio = SimulatedRadio::new();
        let mut provisioner = AccessPointProvisioner::new(radio.clone());
        let handle = provisioner.start(&tutorial_config()).unwrap();

        assert!(radio.emit(RadioEvent::StationConnected { mac: MAC, aid: 1 }));
        assert_eq!(handle.station_count(), 1);

        assert!(radio.emit(RadioEvent::Unrecognized("WIFI_EVENT_AP_PROBEREQRECVED".into())));
        assert_eq!(handle.station_count(), 1);

        assert!(radio.emit(RadioEvent::StationDisconnected { mac: MAC, aid: 1 }));
        assert_eq!(handle.station_count(), 0);
    }

    #[test]
    fn test_events_relayed_without_blocking() {
        let radio = SimulatedRadio::new();
        let mut provisioner = AccessPointProvisioner::new(radio.clone());
        let rx = provisioner.with_event_channel(1);
        let handle = provisioner.start(&tutorial_config()).unwrap();

        radio.emit(RadioEvent::StationConnected { mac: MAC, aid: 1 });
        // Queue is full now; this one must be dropped, not block.
        radio.emit(RadioEvent::StationDisconnected { mac: MAC, aid: 1 });

        let first = rx.try_recv().unwrap();
        assert_eq!(first.kind, StationEventKind::Connected);
        assert_eq!(first.station_id, MAC);
        assert!(rx.try_recv().is_err());

        // Registry still saw both.
        assert_eq!(handle.station_count(), 0);
    }

    #[test]
    fn test_dropped_receiver_is_harmless() {
        let radio = SimulatedRadio::new();
        let mut provisioner = AccessPointProvisioner::new(radio.clone());
        drop(provisioner.with_event_channel(4));
        let handle = provisioner.start(&tutorial_config()).unwrap();

        radio.emit(RadioEvent::StationConnected { mac: MAC, aid: 7 });
        assert_eq!(handle.station_count(), 1);
    }
}
