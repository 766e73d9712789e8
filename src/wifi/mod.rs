//! Soft access point bring-up.
//!
//! The radio itself is an external collaborator reached through the
//! [`RadioStack`] trait. The [`AccessPointProvisioner`] drives it in a fixed
//! order and turns its raw events into [`StationEvent`]s.
//!
//! # Components
//!
//! - [`provisioner`] - start/stop sequencing and event relay (host-testable)
//! - [`stations`] - associated-station bookkeeping (host-testable)
//! - [`simulated`] - in-process radio for host runs and tests
//! - [`esp`] - ESP-IDF soft-AP driver (ESP32 only)

use crate::config::AccessPointConfig;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "esp32")]
mod esp;
mod provisioner;
mod simulated;
mod stations;

#[cfg(feature = "esp32")]
pub use esp::EspRadio;
pub use provisioner::{AccessPointProvisioner, ProvisionError, ProvisionerHandle};
pub use simulated::{RadioCall, SimulatedRadio};
pub use stations::{MacAddress, StationEvent, StationEventKind, StationInfo, StationRegistry};

/// Callback the radio stack invokes for every Wi-Fi event.
///
/// Runs on the radio's own context. It must return quickly and never panic.
pub type EventCallback = Arc<dyn Fn(RadioEvent) + Send + Sync + 'static>;

/// Raw event as reported by the radio stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// A station associated with the access point.
    StationConnected { mac: MacAddress, aid: u16 },
    /// A station left the access point.
    StationDisconnected { mac: MacAddress, aid: u16 },
    /// Any event the provisioner does not handle, described by the stack.
    Unrecognized(String),
}

/// Operations the provisioner needs from a Wi-Fi radio stack.
///
/// [`AccessPointProvisioner`] calls these strictly in the order
/// `init`, `subscribe`, `set_mode_access_point`, `apply_config`, `start`.
/// After a successful `init` later starts skip it.
pub trait RadioStack {
    /// Bring up the driver.
    fn init(&mut self) -> Result<(), RadioError>;

    /// Register the event callback, replacing any earlier one.
    fn subscribe(&mut self, callback: EventCallback) -> Result<(), RadioError>;

    /// Switch the driver into access-point mode.
    fn set_mode_access_point(&mut self) -> Result<(), RadioError>;

    /// Apply the access point configuration verbatim.
    fn apply_config(&mut self, config: &AccessPointConfig) -> Result<(), RadioError>;

    /// Start beaconing.
    fn start(&mut self) -> Result<(), RadioError>;

    /// Stop the access point.
    fn stop(&mut self) -> Result<(), RadioError>;
}

/// Failure reported by a radio stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioError {
    /// Native error code, if the stack has one.
    pub code: Option<i32>,
    /// Human-readable description.
    pub message: String,
}

impl RadioError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RadioError {}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for RadioError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::with_code(e.code(), format!("ESP error: {:?}", e))
    }
}
