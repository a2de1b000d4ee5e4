//! Repository ports consumed by the sync engine.
//!
//! The engine only ever sees these traits; concrete backends (SQLite,
//! platform key-value stores, the in-memory reference implementation in
//! [`crate::memory`]) live with the embedding application. Every `save`
//! is an upsert keyed by the entity's identity, and every `delete` is
//! idempotent.

use async_trait::async_trait;
use sync_core::SyncState;
use sync_types::{Conflict, DeviceId, Operation, VectorClock};

use crate::error::StorageError;

/// Port for persisting logged operations.
#[async_trait]
pub trait OperationRepository: Send + Sync {
    /// Store an operation, replacing any previous record with the same id.
    async fn save(&self, operation: &Operation) -> Result<(), StorageError>;

    /// All operations created by the given device.
    async fn find_by_device_id(
        &self,
        device_id: &DeviceId,
    ) -> Result<Vec<Operation>, StorageError>;

    /// Every stored operation.
    async fn find_all(&self) -> Result<Vec<Operation>, StorageError>;

    /// Operations not yet propagated by a completed sync.
    async fn find_pending(&self) -> Result<Vec<Operation>, StorageError>;

    /// Remove all operations created by the given device.
    async fn delete_for_device(&self, device_id: &DeviceId) -> Result<(), StorageError>;
}

/// Port for persisting detected conflicts.
#[async_trait]
pub trait ConflictRepository: Send + Sync {
    /// Store a conflict, replacing any previous record with the same id.
    async fn save(&self, conflict: &Conflict) -> Result<(), StorageError>;

    /// All conflicts implicating the given device.
    async fn find_by_device_id(&self, device_id: &DeviceId)
        -> Result<Vec<Conflict>, StorageError>;

    /// Every stored conflict.
    async fn find_all(&self) -> Result<Vec<Conflict>, StorageError>;

    /// Conflicts still awaiting resolution.
    async fn find_unresolved(&self) -> Result<Vec<Conflict>, StorageError>;

    /// Remove all conflicts implicating the given device.
    async fn delete_for_device(&self, device_id: &DeviceId) -> Result<(), StorageError>;
}

/// Port for persisting per-device aggregate sync state.
#[async_trait]
pub trait SyncStateRepository: Send + Sync {
    /// Store a device's state, replacing any previous snapshot.
    async fn save(&self, state: &SyncState) -> Result<(), StorageError>;

    /// The stored state for one device, if any.
    async fn find_by_device_id(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<SyncState>, StorageError>;

    /// Every stored state.
    async fn find_all(&self) -> Result<Vec<SyncState>, StorageError>;

    /// States carrying unresolved conflicts.
    async fn find_conflicting(&self) -> Result<Vec<SyncState>, StorageError>;

    /// States whose device is marked offline.
    async fn find_offline(&self) -> Result<Vec<SyncState>, StorageError>;

    /// Remove the stored state for one device.
    async fn delete(&self, device_id: &DeviceId) -> Result<(), StorageError>;
}

/// Port for persisting the last known vector clock per device.
#[async_trait]
pub trait VectorClockRepository: Send + Sync {
    /// Store a device's clock, replacing any previous snapshot.
    async fn save(&self, device_id: &DeviceId, clock: &VectorClock) -> Result<(), StorageError>;

    /// The stored clock for one device, if any.
    async fn find_by_device_id(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<VectorClock>, StorageError>;

    /// The latest stored clock of every device, ordered by device id.
    async fn find_latest(&self) -> Result<Vec<(DeviceId, VectorClock)>, StorageError>;

    /// Remove the stored clock for one device.
    async fn delete(&self, device_id: &DeviceId) -> Result<(), StorageError>;
}
