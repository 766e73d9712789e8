//! Startup sequence.
//!
//! storage → access point → HTTP service. Storage gets one erase-and-retry;
//! every other failure aborts startup and maps to a process exit code.
//!
//! ```ignore
//! let provisioning = Provisioning::bootstrap(
//!     &mut store,
//!     AccessPointProvisioner::new(radio),
//!     &ap_config,
//!     http_config,
//!     |ap| routes::default_routes(ap.stations()),
//! )?;
//! ```

use crate::config::AccessPointConfig;
use crate::network::{HttpConfig, ProvisioningHttpService, RouteHandler, ServiceError, ServiceHandle};
use crate::persistence::{init_with_recovery, KeyValueStore, StorageError};
use crate::wifi::{AccessPointProvisioner, ProvisionError, ProvisionerHandle, RadioStack};
use log::{error, info};
use std::fmt;

/// Everything that is running after a successful startup.
pub struct Provisioning<R: RadioStack> {
    provisioner: AccessPointProvisioner<R>,
    access_point: ProvisionerHandle,
    http: ServiceHandle,
}

impl<R: RadioStack> Provisioning<R> {
    /// Run the startup sequence.
    ///
    /// `routes` is called once the access point is up, so handlers can hold
    /// on to its station registry.
    pub fn bootstrap<S, F>(
        store: &mut S,
        mut provisioner: AccessPointProvisioner<R>,
        ap_config: &AccessPointConfig,
        http_config: HttpConfig,
        routes: F,
    ) -> Result<Self, BootError>
    where
        S: KeyValueStore + ?Sized,
        F: FnOnce(&ProvisionerHandle) -> Vec<RouteHandler>,
    {
        init_with_recovery(store)?;

        let access_point = provisioner.start(ap_config)?;

        let http = match ProvisioningHttpService::new(http_config).start(routes(&access_point)) {
            Ok(http) => http,
            Err(e) => {
                provisioner.stop(access_point);
                return Err(e.into());
            }
        };

        info!("Provisioning ready on SSID {}", access_point.ssid());
        Ok(Self {
            provisioner,
            access_point,
            http,
        })
    }

    pub fn access_point(&self) -> &ProvisionerHandle {
        &self.access_point
    }

    pub fn http(&self) -> &ServiceHandle {
        &self.http
    }

    /// Stop the HTTP service, then the access point.
    pub fn shutdown(self) {
        let Self {
            mut provisioner,
            access_point,
            http,
        } = self;
        ProvisioningHttpService::stop(http);
        provisioner.stop(access_point);
    }
}

/// Startup failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootError {
    Storage(StorageError),
    Provision(ProvisionError),
    Service(ServiceError),
}

impl BootError {
    /// Process exit code for this failure. Never zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Storage(_) => 2,
            Self::Provision(_) => 3,
            Self::Service(_) => 4,
        }
    }

    /// Log the failure and terminate the process.
    pub fn exit(&self) -> ! {
        error!("Startup failed: {}", self);
        std::process::exit(self.exit_code())
    }
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "{}", e),
            Self::Provision(e) => write!(f, "{}", e),
            Self::Service(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BootError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Provision(e) => Some(e),
            Self::Service(e) => Some(e),
        }
    }
}

impl From<StorageError> for BootError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ProvisionError> for BootError {
    fn from(e: ProvisionError) -> Self {
        Self::Provision(e)
    }
}

impl From<ServiceError> for BootError {
    fn from(e: ServiceError) -> Self {
        Self::Service(e)
    }
}
