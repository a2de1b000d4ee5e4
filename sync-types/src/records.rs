//! Persisted records: operations and detected conflicts.
//!
//! These are the entities the engine hands to its repository ports. The
//! core consumes and produces them but does not own their storage.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::clock::VectorClock;
use crate::ids::{now_millis, DeviceId, OperationId};

/// A logged local mutation.
///
/// Carries the vector-clock snapshot taken when the operation was created;
/// that snapshot, not the wall-clock stamp, decides causal order. The
/// payload is opaque to the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Identifier of this operation.
    pub id: OperationId,
    /// Device that created the operation.
    pub device_id: DeviceId,
    /// Vector-clock snapshot at creation time.
    pub clock: VectorClock,
    /// Unix timestamp (millis) when the operation was created. Bookkeeping
    /// only, never used for conflict detection.
    pub created_at_ms: u64,
    /// Serialized mutation payload, opaque to the engine.
    pub payload: Vec<u8>,
    /// Whether a completed sync has propagated this operation.
    pub synced: bool,
}

impl Operation {
    /// Record a new operation, stamping the current wall clock.
    pub fn record(
        id: OperationId,
        device_id: DeviceId,
        clock: VectorClock,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id,
            device_id,
            clock,
            created_at_ms: now_millis(),
            payload,
            synced: false,
        }
    }

    /// Whether this operation is causally concurrent with another.
    pub fn is_concurrent_with(&self, other: &Operation) -> bool {
        self.clock.is_concurrent_with(&other.clock)
    }

    /// A copy marked as propagated by a completed sync.
    pub fn mark_synced(&self) -> Self {
        Self {
            synced: true,
            ..self.clone()
        }
    }
}

/// A unique identifier for a detected conflict.
///
/// UUID v4, assigned at detection time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConflictId(uuid::Uuid);

impl ConflictId {
    /// Create a new random ConflictId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConflictId({})", self.0)
    }
}

/// Resolution state of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Detected and awaiting an explicit resolution decision.
    Unresolved,
    /// An operator or external policy has resolved it.
    Resolved,
}

/// A detected set of causally-concurrent operations.
///
/// The engine detects and reports conflicts; choosing a winner is external
/// policy. Resolution here is only a status flip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Identifier of this conflict.
    pub id: ConflictId,
    /// The concurrent operations, in detection order.
    pub operation_ids: Vec<OperationId>,
    /// Implicated devices, deduplicated.
    pub device_ids: Vec<DeviceId>,
    /// Unix timestamp (millis) when the conflict was detected.
    pub detected_at_ms: u64,
    /// Resolution state.
    pub status: ConflictStatus,
}

impl Conflict {
    /// Build a conflict from a concurrent local/remote operation pair.
    pub fn between(local: &Operation, remote: &Operation, detected_at_ms: u64) -> Self {
        let mut device_ids = vec![local.device_id.clone()];
        if remote.device_id != local.device_id {
            device_ids.push(remote.device_id.clone());
        }
        Self {
            id: ConflictId::new(),
            operation_ids: vec![local.id.clone(), remote.id.clone()],
            device_ids,
            detected_at_ms,
            status: ConflictStatus::Unresolved,
        }
    }

    /// A copy marked resolved.
    pub fn resolve(&self) -> Self {
        Self {
            status: ConflictStatus::Resolved,
            ..self.clone()
        }
    }

    /// Whether this conflict has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.status == ConflictStatus::Resolved
    }

    /// Whether the given device is implicated in this conflict.
    pub fn involves_device(&self, device_id: &DeviceId) -> bool {
        self.device_ids.iter().any(|d| d == device_id)
    }
}
