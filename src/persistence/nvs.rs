//! ESP32 NVS flash partition.
//!
//! Initializes the default NVS partition before the Wi-Fi driver claims it.
//! `ESP_ERR_NVS_NO_FREE_PAGES` and `ESP_ERR_NVS_NEW_VERSION_FOUND` are both
//! fixed by erasing the partition.

use super::{KeyValueStore, StorageError};
use esp_idf_sys::{esp, esp_err_t, EspError};

/// The default NVS partition.
#[derive(Debug, Default)]
pub struct NvsFlash;

impl NvsFlash {
    pub fn new() -> Self {
        Self
    }
}

impl KeyValueStore for NvsFlash {
    fn init(&mut self) -> Result<(), StorageError> {
        esp!(unsafe { esp_idf_sys::nvs_flash_init() }).map_err(classify)
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        esp!(unsafe { esp_idf_sys::nvs_flash_erase() }).map_err(classify)
    }
}

fn classify(e: EspError) -> StorageError {
    let code = e.code();
    if code == esp_idf_sys::ESP_ERR_NVS_NO_FREE_PAGES as esp_err_t {
        StorageError::Corrupt(format!("no free pages ({:?})", e))
    } else if code == esp_idf_sys::ESP_ERR_NVS_NEW_VERSION_FOUND as esp_err_t {
        StorageError::VersionMismatch(format!("partition has newer format ({:?})", e))
    } else {
        StorageError::Other(format!("{:?}", e))
    }
}
