//! Per-peer synchronization snapshots.

use serde::{Deserialize, Serialize};
use sync_types::{DeviceId, VectorClock};

use crate::state::SyncStatus;

/// Last known sync status of one remote device.
///
/// A value snapshot: the engine replaces it wholesale whenever contact with
/// the peer occurs, so callers can hold and compare historical copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSyncState {
    /// The remote device.
    pub device_id: DeviceId,
    /// The peer's clock as of the last completed exchange.
    pub last_synced_clock: VectorClock,
    /// Unix timestamp (millis) of the last contact with this peer.
    pub last_contact_at_ms: u64,
    /// The peer's status as last observed.
    pub status: SyncStatus,
    /// Operations the peer reported as not yet propagated.
    pub pending_operation_count: u64,
}

impl PeerSyncState {
    /// Snapshot a freshly-contacted peer: status [`SyncStatus::Synced`],
    /// no pending operations.
    pub fn new(device_id: DeviceId, last_synced_clock: VectorClock, last_contact_at_ms: u64) -> Self {
        Self {
            device_id,
            last_synced_clock,
            last_contact_at_ms,
            status: SyncStatus::Synced,
            pending_operation_count: 0,
        }
    }

    /// Whether the peer is participating in synchronization (not offline).
    pub fn is_active(&self) -> bool {
        self.status != SyncStatus::Offline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_peer_starts_synced_with_no_pending() {
        let device = DeviceId::new("peer-1").unwrap();
        let clock = VectorClock::new(device.clone());
        let peer = PeerSyncState::new(device, clock, 42);

        assert_eq!(peer.status, SyncStatus::Synced);
        assert_eq!(peer.pending_operation_count, 0);
        assert_eq!(peer.last_contact_at_ms, 42);
        assert!(peer.is_active());
    }

    #[test]
    fn offline_peer_is_not_active() {
        let device = DeviceId::new("peer-1").unwrap();
        let clock = VectorClock::new(device.clone());
        let peer = PeerSyncState {
            status: SyncStatus::Offline,
            ..PeerSyncState::new(device, clock, 0)
        };
        assert!(!peer.is_active());
    }
}
