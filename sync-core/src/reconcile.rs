//! Reconciliation of a remote peer's history against the local state.
//!
//! This is the seam between the engine and its transport collaborator:
//! the collaborator fetches a peer's clock and operations, hands them in
//! as a [`PeerExchange`], and receives back the next [`SyncState`] plus
//! any newly detected [`Conflict`]s to persist and surface. No I/O
//! happens here; the function is pure and the inputs arrive already
//! deserialized.
//!
//! Causal order comes solely from vector clocks. Wall-clock time is only
//! stamped onto the peer snapshot and the conflict records.

use sync_types::{Conflict, DeviceId, Operation, VectorClock};

use crate::peer::PeerSyncState;
use crate::state::{now_millis, SyncState, SyncStatus};

/// One fetched batch from a remote peer.
#[derive(Debug, Clone)]
pub struct PeerExchange {
    /// The peer the batch came from.
    pub peer_id: DeviceId,
    /// The peer's current vector clock.
    pub remote_clock: VectorClock,
    /// Operations fetched from the peer, oldest first.
    pub remote_operations: Vec<Operation>,
    /// Local operations not yet acknowledged by this peer, used as
    /// conflict candidates.
    pub local_operations: Vec<Operation>,
}

/// Outcome of applying a [`PeerExchange`].
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// The next aggregate state, clock merged and counters updated.
    pub state: SyncState,
    /// Newly detected conflicts, for the caller to persist.
    pub conflicts: Vec<Conflict>,
}

/// Reconcile an exchange, stamping the current wall clock.
pub fn reconcile(state: &SyncState, exchange: &PeerExchange) -> Reconciliation {
    reconcile_at(state, exchange, now_millis())
}

/// Reconcile an exchange at a caller-supplied instant.
///
/// Pairs every remote operation against every local candidate; operations
/// from different devices whose clocks are concurrent form a [`Conflict`].
/// The local clock absorbs the remote clock and every remote operation's
/// clock by pointwise max, the conflict counter advances once per detected
/// conflict (tripping [`SyncStatus::ConflictPending`] on the first), and
/// the peer's snapshot is replaced wholesale.
pub fn reconcile_at(state: &SyncState, exchange: &PeerExchange, now_ms: u64) -> Reconciliation {
    let mut conflicts = Vec::new();
    for remote in &exchange.remote_operations {
        // Our own operations echoed back are not remote history.
        if remote.device_id == *state.local_device_id() {
            continue;
        }
        for local in &exchange.local_operations {
            if local.device_id == remote.device_id {
                continue;
            }
            if local.is_concurrent_with(remote) {
                conflicts.push(Conflict::between(local, remote, now_ms));
            }
        }
    }

    let mut merged = state.local_clock().merge(&exchange.remote_clock);
    for remote in &exchange.remote_operations {
        merged = merged.merge(&remote.clock);
    }

    let mut next = state.update_local_clock(merged);
    for _ in &conflicts {
        next = next.increment_conflict_count();
    }

    let peer_status = if conflicts.is_empty() {
        SyncStatus::Synced
    } else {
        SyncStatus::ConflictPending
    };
    let next = next.update_peer(PeerSyncState {
        status: peer_status,
        ..PeerSyncState::new(
            exchange.peer_id.clone(),
            exchange.remote_clock.clone(),
            now_ms,
        )
    });

    Reconciliation {
        state: next,
        conflicts,
    }
}
