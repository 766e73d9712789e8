//! Associated-station bookkeeping.
//!
//! The registry is written from the radio callback and read from HTTP
//! handlers, possibly at the same time, so every access goes through a mutex.

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// 48-bit station MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

/// Kind of station event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationEventKind {
    Connected,
    Disconnected,
}

/// A station joined or left the access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationEvent {
    pub kind: StationEventKind,
    /// Station identifier (its MAC address).
    pub station_id: MacAddress,
    /// Association id assigned by the access point.
    pub aid: u16,
}

impl StationEvent {
    pub fn connected(station_id: MacAddress, aid: u16) -> Self {
        Self {
            kind: StationEventKind::Connected,
            station_id,
            aid,
        }
    }

    pub fn disconnected(station_id: MacAddress, aid: u16) -> Self {
        Self {
            kind: StationEventKind::Disconnected,
            station_id,
            aid,
        }
    }
}

/// A currently associated station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StationInfo {
    pub mac: MacAddress,
    pub aid: u16,
}

/// Stations currently associated with the access point, in join order.
#[derive(Debug, Default)]
pub struct StationRegistry {
    stations: Mutex<Vec<StationInfo>>,
}

impl StationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StationInfo>> {
        // Entries are plain data, a panic elsewhere cannot leave them half-written.
        self.stations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an association. A station that re-associates keeps one entry
    /// with its new AID.
    pub fn insert(&self, mac: MacAddress, aid: u16) {
        let mut stations = self.lock();
        match stations.iter_mut().find(|s| s.mac == mac) {
            Some(existing) => existing.aid = aid,
            None => stations.push(StationInfo { mac, aid }),
        }
    }

    /// Forget a station. Returns `false` if it was not known.
    pub fn remove(&self, mac: &MacAddress) -> bool {
        let mut stations = self.lock();
        let before = stations.len();
        stations.retain(|s| &s.mac != mac);
        stations.len() != before
    }

    /// Apply a station event.
    pub fn apply(&self, event: &StationEvent) -> bool {
        match event.kind {
            StationEventKind::Connected => {
                self.insert(event.station_id, event.aid);
                true
            }
            StationEventKind::Disconnected => self.remove(&event.station_id),
        }
    }

    pub fn contains(&self, mac: &MacAddress) -> bool {
        self.lock().iter().any(|s| &s.mac == mac)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current station list.
    pub fn snapshot(&self) -> Vec<StationInfo> {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const MAC_A: MacAddress = MacAddress([0x24, 0x0a, 0xc4, 0x00, 0x00, 0x01]);
    const MAC_B: MacAddress = MacAddress([0x24, 0x0a, 0xc4, 0x00, 0x00, 0x02]);

    #[test]
    fn test_mac_display() {
        assert_eq!(MAC_A.to_string(), "24:0a:c4:00:00:01");
    }

    #[test]
    fn test_mac_serializes_as_string() {
        let json = serde_json::to_string(&StationInfo { mac: MAC_B, aid: 3 }).unwrap();
        assert_eq!(json, r#"{"mac":"24:0a:c4:00:00:02","aid":3}"#);
    }

    #[test]
    fn test_insert_and_remove() {
        let registry = StationRegistry::new();
        registry.insert(MAC_A, 1);
        registry.insert(MAC_B, 2);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&MAC_A));

        assert!(registry.remove(&MAC_A));
        assert!(!registry.remove(&MAC_A));
        assert_eq!(registry.snapshot(), vec![StationInfo { mac: MAC_B, aid: 2 }]);
    }

    #[test]
    fn test_reassociation_updates_aid() {
        let registry = StationRegistry::new();
        registry.insert(MAC_A, 1);
        registry.insert(MAC_A, 4);
        assert_eq!(registry.snapshot(), vec![StationInfo { mac: MAC_A, aid: 4 }]);
    }

    #[test]
    fn test_apply_events() {
        let registry = StationRegistry::new();
        assert!(registry.apply(&StationEvent::connected(MAC_A, 1)));
        assert!(registry.apply(&StationEvent::disconnected(MAC_A, 1)));
        assert!(!registry.apply(&StationEvent::disconnected(MAC_B, 2)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_updates() {
        let registry = Arc::new(StationRegistry::new());
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let mac = MacAddress([0, 0, 0, 0, 0, i]);
                    for _ in 0..100 {
                        registry.insert(mac, i as u16);
                        registry.remove(&mac);
                    }
                    registry.insert(mac, i as u16);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 8);
    }
}
