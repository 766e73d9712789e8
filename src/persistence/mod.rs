//! Persistent key-value storage bring-up.
//!
//! The Wi-Fi driver keeps calibration data and its own settings in the
//! key-value store, so it has to be initialized before the radio. A store
//! left behind by an older firmware, or one that ran out of free pages, is
//! erased and initialized once more; anything else is fatal.
//!
//! # Backends
//!
//! - [`FileStore`] - directory on the host filesystem
//! - [`NvsFlash`] - ESP32 NVS flash partition (ESP32 only)

use log::{info, warn};
use std::fmt;

mod host;
#[cfg(feature = "esp32")]
mod nvs;

pub use host::{FileStore, STORE_VERSION};
#[cfg(feature = "esp32")]
pub use nvs::NvsFlash;

/// A persistent key-value store as seen during startup.
pub trait KeyValueStore {
    /// Make the store usable.
    fn init(&mut self) -> Result<(), StorageError>;

    /// Wipe the store so the next [`init`](Self::init) starts fresh.
    fn erase(&mut self) -> Result<(), StorageError>;
}

/// Initialize `store`, erasing and retrying exactly once if the failure is
/// recoverable.
pub fn init_with_recovery<S: KeyValueStore + ?Sized>(store: &mut S) -> Result<(), StorageError> {
    match store.init() {
        Ok(()) => {
            info!("Storage initialized");
            Ok(())
        }
        Err(e) if e.is_recoverable() => {
            warn!("Storage unusable ({}), erasing and retrying", e);
            store.erase()?;
            store.init()?;
            info!("Storage initialized after erase");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Storage failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Store is damaged or has no free pages left.
    Corrupt(String),
    /// Store was written by an incompatible format version.
    VersionMismatch(String),
    /// Anything else.
    Other(String),
}

impl StorageError {
    /// Whether erasing the store can fix this.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Corrupt(_) | Self::VersionMismatch(_))
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupt(detail) => write!(f, "storage corrupt: {}", detail),
            Self::VersionMismatch(detail) => write!(f, "storage version mismatch: {}", detail),
            Self::Other(detail) => write!(f, "storage error: {}", detail),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Store that replays scripted `init` results.
    #[derive(Default)]
    struct ScriptedStore {
        init_results: VecDeque<Result<(), StorageError>>,
        init_calls: usize,
        erase_calls: usize,
        erase_result: Option<StorageError>,
    }

    impl ScriptedStore {
        fn new(results: Vec<Result<(), StorageError>>) -> Self {
            Self {
                init_results: results.into(),
                ..Self::default()
            }
        }
    }

    impl KeyValueStore for ScriptedStore {
        fn init(&mut self) -> Result<(), StorageError> {
            self.init_calls += 1;
            self.init_results.pop_front().unwrap_or(Ok(()))
        }

        fn erase(&mut self) -> Result<(), StorageError> {
            self.erase_calls += 1;
            match &self.erase_result {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
    }

    fn version_mismatch() -> StorageError {
        StorageError::VersionMismatch("found 0, expected 1".into())
    }

    #[test]
    fn test_clean_init() {
        let mut store = ScriptedStore::new(vec![Ok(())]);
        assert!(init_with_recovery(&mut store).is_ok());
        assert_eq!(store.init_calls, 1);
        assert_eq!(store.erase_calls, 0);
    }

    #[test]
    fn test_version_mismatch_recovered_by_erase() {
        let mut store = ScriptedStore::new(vec![Err(version_mismatch()), Ok(())]);
        assert!(init_with_recovery(&mut store).is_ok());
        assert_eq!(store.init_calls, 2);
        assert_eq!(store.erase_calls, 1);
    }

    #[test]
    fn test_corrupt_recovered_by_erase() {
        let mut store = ScriptedStore::new(vec![Err(StorageError::Corrupt("no free pages".into()))]);
        assert!(init_with_recovery(&mut store).is_ok());
        assert_eq!(store.erase_calls, 1);
    }

    #[test]
    fn test_second_failure_propagates() {
        let mut store = ScriptedStore::new(vec![Err(version_mismatch()), Err(version_mismatch())]);
        assert_eq!(init_with_recovery(&mut store), Err(version_mismatch()));
        assert_eq!(store.init_calls, 2, "retried more than once");
        assert_eq!(store.erase_calls, 1);
    }

    #[test]
    fn test_other_error_not_retried() {
        let mut store = ScriptedStore::new(vec![Err(StorageError::Other("no partition".into()))]);
        assert!(matches!(
            init_with_recovery(&mut store),
            Err(StorageError::Other(_))
        ));
        assert_eq!(store.init_calls, 1);
        assert_eq!(store.erase_calls, 0);
    }

    #[test]
    fn test_erase_failure_propagates() {
        let mut store = ScriptedStore::new(vec![Err(version_mismatch())]);
        store.erase_result = Some(StorageError::Other("flash locked".into()));
        assert_eq!(
            init_with_recovery(&mut store),
            Err(StorageError::Other("flash locked".into()))
        );
        assert_eq!(store.init_calls, 1);
    }
}
