//! Directory-backed store for host (development) builds.
//!
//! Uses `~/.softap-provisioner/store` by default. The directory carries a
//! `VERSION` marker; a marker from another format version makes `init` fail
//! with [`StorageError::VersionMismatch`].

use super::{KeyValueStore, StorageError};
use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// On-disk format version written by this build.
pub const STORE_VERSION: u32 = 1;

const VERSION_FILE: &str = "VERSION";

/// Key-value store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store under `~/.softap-provisioner/store`.
    pub fn at_default_path() -> io::Result<Self> {
        let home = std::env::var("HOME")
            .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
        Ok(Self::new(
            PathBuf::from(home).join(".softap-provisioner").join("store"),
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_path(&self) -> PathBuf {
        self.root.join(VERSION_FILE)
    }
}

impl KeyValueStore for FileStore {
    fn init(&mut self) -> Result<(), StorageError> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)?;
            fs::write(self.version_path(), format!("{}\n", STORE_VERSION))?;
            info!("Created store at {:?}", self.root);
            return Ok(());
        }

        let raw = match fs::read(self.version_path()) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::Corrupt(format!(
                    "{:?} has no version marker",
                    self.root
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let found: u32 = std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| StorageError::Corrupt("unreadable version marker".into()))?;

        if found != STORE_VERSION {
            return Err(StorageError::VersionMismatch(format!(
                "found {}, expected {}",
                found, STORE_VERSION
            )));
        }

        debug!("Opened store at {:?}", self.root);
        Ok(())
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {
                info!("Erased store at {:?}", self.root);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_with_recovery;
    use std::env;
    use std::sync::atomic::{AtomicU32, Ordering};

    // Unique directories even when tests run in parallel
    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_store() -> FileStore {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        FileStore::new(env::temp_dir().join(format!("softap-store-test-{}-{}", pid, id)))
    }

    #[test]
    fn test_fresh_store_created() {
        let mut store = unique_store();
        store.init().unwrap();

        let marker = fs::read_to_string(store.root().join(VERSION_FILE)).unwrap();
        assert_eq!(marker.trim(), STORE_VERSION.to_string());

        // Reopening is fine.
        store.init().unwrap();
        store.erase().unwrap();
    }

    #[test]
    fn test_version_mismatch_detected() {
        let mut store = unique_store();
        fs::create_dir_all(store.root()).unwrap();
        fs::write(store.root().join(VERSION_FILE), "0\n").unwrap();

        assert!(matches!(store.init(), Err(StorageError::VersionMismatch(_))));
        store.erase().unwrap();
    }

    #[test]
    fn test_missing_marker_is_corrupt() {
        let mut store = unique_store();
        fs::create_dir_all(store.root()).unwrap();

        assert!(matches!(store.init(), Err(StorageError::Corrupt(_))));
        store.erase().unwrap();
    }

    #[test]
    fn test_garbage_marker_is_corrupt() {
        let mut store = unique_store();
        fs::create_dir_all(store.root()).unwrap();
        fs::write(store.root().join(VERSION_FILE), [0xff, 0xfe]).unwrap();

        assert!(matches!(store.init(), Err(StorageError::Corrupt(_))));
        store.erase().unwrap();
    }

    #[test]
    fn test_recovery_rewrites_old_store() {
        let mut store = unique_store();
        fs::create_dir_all(store.root()).unwrap();
        fs::write(store.root().join(VERSION_FILE), "99\n").unwrap();
        fs::write(store.root().join("stale"), "old data").unwrap();

        init_with_recovery(&mut store).unwrap();

        assert!(!store.root().join("stale").exists());
        store.init().unwrap();
        store.erase().unwrap();
    }

    #[test]
    fn test_erase_missing_is_ok() {
        let mut store = unique_store();
        assert!(store.erase().is_ok());
    }
}
