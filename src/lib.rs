//! Soft-AP provisioning firmware library.
//!
//! Brings up a Wi-Fi access point and serves a small static-route HTTP
//! service on it. The radio, the key-value store and the HTTP listener are
//! external collaborators behind traits, so everything here can be tested on
//! the host machine without ESP32 hardware. The ESP-IDF backends are compiled
//! with the `esp32` feature.

pub mod bootstrap;
pub mod config;
pub mod network;
pub mod persistence;
pub mod wifi;

// Re-export commonly used items
pub use bootstrap::{BootError, Provisioning};
pub use config::{AccessPointConfig, AuthMode, ConfigError};
pub use network::{
    HandlerError, HttpConfig, Method, ProvisioningHttpService, Request, Response, RouteHandler,
    ServiceError, ServiceHandle, ServiceState, DEFAULT_HTTP_PORT,
};
pub use persistence::{init_with_recovery, FileStore, KeyValueStore, StorageError};
pub use wifi::{
    AccessPointProvisioner, ProvisionError, ProvisionerHandle, RadioEvent, RadioStack,
    SimulatedRadio, StationEvent,
};
