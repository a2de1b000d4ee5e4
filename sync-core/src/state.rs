//! Synchronization state machine for causal-sync.
//!
//! This module provides the [`SyncState`] aggregate: the local device's
//! clock, its synchronization status, per-peer snapshots, and the conflict
//! and pending-operation counters that drive the status.
//!
//! The aggregate is a persistent value. Every transition returns a new
//! `SyncState` and never mutates the receiver, so the aggregate is safe to
//! hold in any concurrency model provided updates are published by
//! replacing the reference. No method blocks or performs I/O.
//!
//! The core invariant: outside explicit [`update_status`] overrides, the
//! status is [`SyncStatus::Synced`] exactly when both counters are zero.
//!
//! [`update_status`]: SyncState::update_status

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use sync_types::{DeviceId, VectorClock};
use thiserror::Error;

use crate::peer::PeerSyncState;

/// Synchronization status of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Fully reconciled: no conflicts, no pending operations.
    Synced,
    /// Local operations are waiting to be propagated.
    Syncing,
    /// At least one detected conflict awaits resolution.
    ConflictPending,
    /// The transport layer reports the device as unreachable.
    Offline,
    /// The transport layer reports a failure; see the error message.
    Error,
}

/// Invariant violations on [`SyncState`] transitions.
///
/// These are genuine runtime errors, never silently clamped. Inputs whose
/// invalid range is unrepresentable (negative counts) have no variant here:
/// they are prevented by construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// `decrement_conflict_count` was called with the counter at zero.
    #[error("cannot decrement conflict count below zero")]
    ConflictCountUnderflow,
}

/// Aggregate root for one local device's synchronization state.
///
/// Fields are private: all reads go through accessors and all writes
/// through transitions that uphold the status/counter invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    local_device_id: DeviceId,
    local_clock: VectorClock,
    status: SyncStatus,
    peers: BTreeMap<DeviceId, PeerSyncState>,
    last_sync_at_ms: Option<u64>,
    conflict_count: u64,
    pending_operation_count: u64,
    error_message: Option<String>,
}

impl SyncState {
    /// Create the initial state for a local device: status
    /// [`SyncStatus::Synced`], zero counters, clock seeded with the local
    /// device's own entry.
    pub fn new(local_device_id: DeviceId) -> Self {
        let local_clock = VectorClock::new(local_device_id.clone());
        Self::with_clock(local_device_id, local_clock)
    }

    /// Create the initial state with a specific clock.
    ///
    /// Useful when resuming from a persisted clock.
    pub fn with_clock(local_device_id: DeviceId, local_clock: VectorClock) -> Self {
        Self {
            local_device_id,
            local_clock,
            status: SyncStatus::Synced,
            peers: BTreeMap::new(),
            last_sync_at_ms: None,
            conflict_count: 0,
            pending_operation_count: 0,
            error_message: None,
        }
    }

    /// The local device this state belongs to.
    pub fn local_device_id(&self) -> &DeviceId {
        &self.local_device_id
    }

    /// The local device's current vector clock.
    pub fn local_clock(&self) -> &VectorClock {
        &self.local_clock
    }

    /// The current synchronization status.
    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// The last known snapshot for a peer, if any.
    pub fn peer(&self, device_id: &DeviceId) -> Option<&PeerSyncState> {
        self.peers.get(device_id)
    }

    /// Read-only iteration over peer snapshots, ordered by device id.
    pub fn peers(&self) -> impl Iterator<Item = &PeerSyncState> {
        self.peers.values()
    }

    /// Unix timestamp (millis) of the last completed sync.
    pub fn last_sync_at_ms(&self) -> Option<u64> {
        self.last_sync_at_ms
    }

    /// Number of unresolved conflicts.
    pub fn conflict_count(&self) -> u64 {
        self.conflict_count
    }

    /// Number of local operations not yet propagated.
    pub fn pending_operation_count(&self) -> u64 {
        self.pending_operation_count
    }

    /// The error message accompanying an [`SyncStatus::Error`] override.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Replace the local clock. Status is untouched.
    pub fn update_local_clock(&self, local_clock: VectorClock) -> Self {
        Self {
            local_clock,
            ..self.clone()
        }
    }

    /// Explicit manual status override.
    ///
    /// The escape hatch for transport-driven conditions the counters
    /// cannot express ([`SyncStatus::Offline`], [`SyncStatus::Error`]):
    /// any status is accepted without counter cross-checks. The error
    /// message is replaced wholesale; passing `None` clears it.
    pub fn update_status(&self, status: SyncStatus, error_message: Option<String>) -> Self {
        Self {
            status,
            error_message,
            ..self.clone()
        }
    }

    /// Replace one peer's snapshot. Status is untouched.
    pub fn update_peer(&self, peer: PeerSyncState) -> Self {
        let mut peers = self.peers.clone();
        peers.insert(peer.device_id.clone(), peer);
        Self {
            peers,
            ..self.clone()
        }
    }

    /// Remove one peer's snapshot. Status is untouched.
    pub fn remove_peer(&self, device_id: &DeviceId) -> Self {
        let mut peers = self.peers.clone();
        peers.remove(device_id);
        Self {
            peers,
            ..self.clone()
        }
    }

    /// Record one newly-detected conflict.
    ///
    /// The first conflict (counter 0 -> 1) trips the status to
    /// [`SyncStatus::ConflictPending`]; further conflicts leave the status
    /// untouched.
    pub fn increment_conflict_count(&self) -> Self {
        let status = if self.conflict_count == 0 {
            SyncStatus::ConflictPending
        } else {
            self.status
        };
        Self {
            conflict_count: self.conflict_count + 1,
            status,
            ..self.clone()
        }
    }

    /// Record one resolved conflict.
    ///
    /// Fails when the counter is already zero; the counter is never
    /// observably negative. Resolving the last conflict with nothing
    /// pending returns the status to [`SyncStatus::Synced`].
    pub fn decrement_conflict_count(&self) -> Result<Self, StateError> {
        if self.conflict_count == 0 {
            return Err(StateError::ConflictCountUnderflow);
        }
        let conflict_count = self.conflict_count - 1;
        let status = if conflict_count == 0 && self.pending_operation_count == 0 {
            SyncStatus::Synced
        } else {
            self.status
        };
        Ok(Self {
            conflict_count,
            status,
            ..self.clone()
        })
    }

    /// Replace the pending-operation counter.
    ///
    /// Zero with no conflicts means [`SyncStatus::Synced`]; anything
    /// pending means [`SyncStatus::Syncing`]; zero with live conflicts
    /// leaves the status untouched (typically
    /// [`SyncStatus::ConflictPending`]).
    pub fn update_pending_operation_count(&self, count: u64) -> Self {
        let status = if count == 0 && self.conflict_count == 0 {
            SyncStatus::Synced
        } else if count > 0 {
            SyncStatus::Syncing
        } else {
            self.status
        };
        Self {
            pending_operation_count: count,
            status,
            ..self.clone()
        }
    }

    /// Mark a sync round as completed, stamping the current wall clock.
    pub fn mark_sync_completed(&self) -> Self {
        self.mark_sync_completed_at(now_millis())
    }

    /// Mark a sync round as completed at a caller-supplied instant.
    ///
    /// Pending operations drop to zero; the status lands on
    /// [`SyncStatus::Synced`] unless conflicts remain. `last_sync_at_ms`
    /// is strictly monotonically increasing across calls: when the wall
    /// clock has not advanced past the previous stamp, the new stamp is
    /// the previous one plus a millisecond.
    pub fn mark_sync_completed_at(&self, now_ms: u64) -> Self {
        let status = if self.conflict_count == 0 {
            SyncStatus::Synced
        } else {
            SyncStatus::ConflictPending
        };
        let last_sync_at_ms = match self.last_sync_at_ms {
            Some(previous) if now_ms <= previous => previous + 1,
            _ => now_ms,
        };
        Self {
            pending_operation_count: 0,
            status,
            last_sync_at_ms: Some(last_sync_at_ms),
            ..self.clone()
        }
    }

    /// Fully reconciled: status and both counters agree.
    pub fn is_synced(&self) -> bool {
        self.status == SyncStatus::Synced
            && self.conflict_count == 0
            && self.pending_operation_count == 0
    }

    /// Whether any detected conflict awaits resolution.
    pub fn has_conflicts(&self) -> bool {
        self.conflict_count > 0
    }

    /// Whether the transport layer marked this device offline.
    pub fn is_offline(&self) -> bool {
        self.status == SyncStatus::Offline
    }

    /// Whether the transport layer reported an error.
    pub fn has_errors(&self) -> bool {
        self.status == SyncStatus::Error
    }

    /// Number of peers not currently offline.
    pub fn active_peer_count(&self) -> usize {
        self.peers.values().filter(|p| p.is_active()).count()
    }

    /// Peers that cannot be assumed fully reconciled.
    ///
    /// A peer is in sync only when its status is [`SyncStatus::Synced`],
    /// it reports nothing pending, and its last-known clock is not
    /// concurrent with ours. A concurrent last-known clock may hide an
    /// undetected conflict, so such a peer is conservatively out of sync.
    pub fn out_of_sync_peers(&self) -> Vec<&PeerSyncState> {
        self.peers
            .values()
            .filter(|p| {
                !(p.status == SyncStatus::Synced
                    && p.pending_operation_count == 0
                    && !p.last_synced_clock.is_concurrent_with(&self.local_clock))
            })
            .collect()
    }
}

/// Current wall-clock time in unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(raw: &str) -> DeviceId {
        DeviceId::new(raw).unwrap()
    }

    fn state() -> SyncState {
        SyncState::new(device("local-device"))
    }

    #[test]
    fn new_state_is_synced_with_zero_counters() {
        let s = state();
        assert_eq!(s.status(), SyncStatus::Synced);
        assert_eq!(s.conflict_count(), 0);
        assert_eq!(s.pending_operation_count(), 0);
        assert!(s.is_synced());
        assert_eq!(s.last_sync_at_ms(), None);
        assert_eq!(s.local_clock().get(s.local_device_id()), 0);
    }

    #[test]
    fn with_clock_uses_supplied_clock() {
        let local = device("local-device");
        let other = device("other");
        let clock = VectorClock::new(local.clone()).increment(&other);
        let s = SyncState::with_clock(local, clock.clone());
        assert_eq!(s.local_clock(), &clock);
    }

    #[test]
    fn update_local_clock_leaves_status_alone() {
        let s = state().update_status(SyncStatus::Syncing, None);
        let clock = s.local_clock().increment(s.local_device_id());
        let next = s.update_local_clock(clock.clone());

        assert_eq!(next.local_clock(), &clock);
        assert_eq!(next.status(), SyncStatus::Syncing);
    }

    #[test]
    fn update_status_is_an_unchecked_override() {
        // Counters say Synced, but the transport can still force Offline.
        let s = state().update_status(SyncStatus::Offline, None);
        assert_eq!(s.status(), SyncStatus::Offline);
        assert!(s.is_offline());
        assert!(!s.is_synced());
    }

    #[test]
    fn update_status_replaces_error_message_wholesale() {
        let s = state().update_status(SyncStatus::Error, Some("relay unreachable".into()));
        assert!(s.has_errors());
        assert_eq!(s.error_message(), Some("relay unreachable"));

        let recovered = s.update_status(SyncStatus::Synced, None);
        assert_eq!(recovered.error_message(), None);
    }

    #[test]
    fn transitions_never_mutate_the_receiver() {
        let s = state();
        let _ = s.increment_conflict_count();
        let _ = s.update_pending_operation_count(5);
        let _ = s.update_status(SyncStatus::Offline, None);

        assert_eq!(s.status(), SyncStatus::Synced);
        assert_eq!(s.conflict_count(), 0);
        assert_eq!(s.pending_operation_count(), 0);
    }

    #[test]
    fn first_conflict_trips_conflict_pending() {
        let s = state().increment_conflict_count();
        assert_eq!(s.status(), SyncStatus::ConflictPending);
        assert_eq!(s.conflict_count(), 1);
        assert!(s.has_conflicts());
    }

    #[test]
    fn further_conflicts_leave_status_untouched() {
        // Second conflict while Offline must not drag the status back.
        let s = state()
            .increment_conflict_count()
            .update_status(SyncStatus::Offline, None)
            .increment_conflict_count();
        assert_eq!(s.status(), SyncStatus::Offline);
        assert_eq!(s.conflict_count(), 2);
    }

    #[test]
    fn decrement_at_zero_fails() {
        let err = state().decrement_conflict_count().unwrap_err();
        assert_eq!(err, StateError::ConflictCountUnderflow);
        assert_eq!(
            err.to_string(),
            "cannot decrement conflict count below zero"
        );
    }

    #[test]
    fn resolving_last_conflict_returns_to_synced() {
        let s = state()
            .increment_conflict_count()
            .decrement_conflict_count()
            .unwrap();
        assert_eq!(s.status(), SyncStatus::Synced);
        assert!(s.is_synced());
    }

    #[test]
    fn resolving_with_pending_operations_stays_put() {
        let s = state()
            .update_pending_operation_count(2)
            .increment_conflict_count()
            .decrement_conflict_count()
            .unwrap();
        // Conflicts are gone but operations are still pending.
        assert_eq!(s.conflict_count(), 0);
        assert_eq!(s.status(), SyncStatus::ConflictPending);
        assert!(!s.is_synced());
    }

    #[test]
    fn pending_operations_flip_to_syncing() {
        let s = state().update_pending_operation_count(3);
        assert_eq!(s.status(), SyncStatus::Syncing);
        assert_eq!(s.pending_operation_count(), 3);
    }

    #[test]
    fn draining_pending_operations_returns_to_synced() {
        let s = state()
            .update_pending_operation_count(3)
            .update_pending_operation_count(0);
        assert_eq!(s.status(), SyncStatus::Synced);
        assert!(s.is_synced());
    }

    #[test]
    fn draining_pending_with_live_conflicts_leaves_status_unchanged() {
        // Status was ConflictPending: stays there.
        let s = state()
            .increment_conflict_count()
            .update_pending_operation_count(0);
        assert_eq!(s.status(), SyncStatus::ConflictPending);

        // Status was Syncing when drained with conflicts live: also unchanged.
        let s = state()
            .increment_conflict_count()
            .update_pending_operation_count(3)
            .update_pending_operation_count(0);
        assert_eq!(s.status(), SyncStatus::Syncing);
    }

    #[test]
    fn mark_sync_completed_clears_pending() {
        let s = state()
            .update_pending_operation_count(4)
            .mark_sync_completed_at(1_000);
        assert_eq!(s.pending_operation_count(), 0);
        assert_eq!(s.status(), SyncStatus::Synced);
        assert_eq!(s.last_sync_at_ms(), Some(1_000));
    }

    #[test]
    fn mark_sync_completed_with_conflicts_lands_on_conflict_pending() {
        let s = state()
            .increment_conflict_count()
            .update_pending_operation_count(4)
            .mark_sync_completed_at(1_000);
        assert_eq!(s.pending_operation_count(), 0);
        assert_eq!(s.status(), SyncStatus::ConflictPending);
    }

    #[test]
    fn last_sync_at_is_strictly_monotonic_under_a_stalled_clock() {
        let first = state().mark_sync_completed_at(1_000);
        let second = first.mark_sync_completed_at(1_000); // clock stalled
        let third = second.mark_sync_completed_at(999); // clock went backwards

        assert_eq!(first.last_sync_at_ms(), Some(1_000));
        assert_eq!(second.last_sync_at_ms(), Some(1_001));
        assert_eq!(third.last_sync_at_ms(), Some(1_002));
    }

    #[test]
    fn mark_sync_completed_uses_wall_clock() {
        let s = state().mark_sync_completed();
        assert!(s.last_sync_at_ms().is_some());
    }

    #[test]
    fn peer_snapshots_are_replaced_wholesale() {
        let peer_id = device("peer-1");
        let clock = VectorClock::new(peer_id.clone());
        let s = state().update_peer(PeerSyncState::new(peer_id.clone(), clock.clone(), 10));

        let replaced = s.update_peer(PeerSyncState::new(peer_id.clone(), clock, 20));
        assert_eq!(
            replaced.peer(&peer_id).map(|p| p.last_contact_at_ms),
            Some(20)
        );
        assert_eq!(replaced.peers().count(), 1);
    }

    #[test]
    fn remove_peer_drops_the_snapshot() {
        let peer_id = device("peer-1");
        let clock = VectorClock::new(peer_id.clone());
        let s = state()
            .update_peer(PeerSyncState::new(peer_id.clone(), clock, 10))
            .remove_peer(&peer_id);
        assert!(s.peer(&peer_id).is_none());
    }

    #[test]
    fn active_peer_count_skips_offline_peers() {
        let p1 = device("peer-1");
        let p2 = device("peer-2");
        let s = state()
            .update_peer(PeerSyncState::new(p1.clone(), VectorClock::new(p1), 0))
            .update_peer(PeerSyncState {
                status: SyncStatus::Offline,
                ..PeerSyncState::new(p2.clone(), VectorClock::new(p2), 0)
            });
        assert_eq!(s.active_peer_count(), 1);
    }

    #[test]
    fn out_of_sync_peers_flags_pending_and_non_synced() {
        let local = device("local-device");
        let p1 = device("peer-1");
        let p2 = device("peer-2");
        let p3 = device("peer-3");
        let base = VectorClock::new(local.clone());

        let s = SyncState::with_clock(local, base.clone())
            // In sync: Synced, nothing pending, clock equal to ours.
            .update_peer(PeerSyncState::new(p1.clone(), base.clone(), 0))
            // Out: still syncing.
            .update_peer(PeerSyncState {
                status: SyncStatus::Syncing,
                ..PeerSyncState::new(p2.clone(), base.clone(), 0)
            })
            // Out: pending operations reported.
            .update_peer(PeerSyncState {
                pending_operation_count: 2,
                ..PeerSyncState::new(p3.clone(), base, 0)
            });

        let out: Vec<_> = s
            .out_of_sync_peers()
            .into_iter()
            .map(|p| p.device_id.clone())
            .collect();
        assert_eq!(out, vec![p2, p3]);
    }

    #[test]
    fn peer_with_concurrent_clock_is_conservatively_out_of_sync() {
        let local = device("local-device");
        let peer_id = device("peer-1");
        let base = VectorClock::new(local.clone());
        let local_clock = base.increment(&local);
        let peer_clock = base.increment(&peer_id);

        let s = SyncState::with_clock(local, local_clock)
            .update_peer(PeerSyncState::new(peer_id.clone(), peer_clock, 0));

        let out = s.out_of_sync_peers();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].device_id, peer_id);
    }

    #[test]
    fn conflict_lifecycle_round_trip() {
        // Device A starts synced; a concurrent operation from B arrives.
        let s = state();
        assert!(s.is_synced());

        let conflicted = s.increment_conflict_count();
        assert_eq!(conflicted.status(), SyncStatus::ConflictPending);

        // Operator resolves the conflict; nothing pending.
        let resolved = conflicted.decrement_conflict_count().unwrap();
        assert_eq!(resolved.status(), SyncStatus::Synced);
        assert!(resolved.is_synced());
    }

    #[test]
    fn pending_lifecycle_round_trip() {
        let s = state().update_pending_operation_count(3);
        assert_eq!(s.status(), SyncStatus::Syncing);

        let drained = s.update_pending_operation_count(0);
        assert_eq!(drained.status(), SyncStatus::Synced);
        assert!(drained.is_synced());
    }

    #[test]
    fn status_invariant_holds_across_reachable_states() {
        let states = [
            state(),
            state().increment_conflict_count(),
            state().update_pending_operation_count(2),
            state()
                .increment_conflict_count()
                .decrement_conflict_count()
                .unwrap(),
            state()
                .update_pending_operation_count(2)
                .mark_sync_completed_at(5),
            state()
                .increment_conflict_count()
                .update_pending_operation_count(1),
        ];
        for s in &states {
            assert_eq!(
                s.is_synced(),
                s.status() == SyncStatus::Synced
                    && s.conflict_count() == 0
                    && s.pending_operation_count() == 0
            );
        }
    }

    #[test]
    fn serde_round_trip() {
        let peer_id = device("peer-1");
        let s = state()
            .update_peer(PeerSyncState::new(
                peer_id.clone(),
                VectorClock::new(peer_id),
                7,
            ))
            .increment_conflict_count()
            .mark_sync_completed_at(100);

        let json = serde_json::to_string(&s).unwrap();
        let back: SyncState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
