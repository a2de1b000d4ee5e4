//! In-memory reference backends for the repository ports.
//!
//! One type per port, each backed by shared state behind a mutex so a
//! clone can be handed to the engine while a test (or another task) keeps
//! inspecting the same store. Iteration order is deterministic: entries
//! are keyed by canonical id in BTree maps.
//!
//! Each store supports forced-failure injection via `fail_next` so
//! callers can exercise their error paths.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use sync_core::SyncState;
use sync_types::{Conflict, ConflictId, DeviceId, Operation, OperationId, VectorClock};

use crate::error::StorageError;
use crate::repository::{
    ConflictRepository, OperationRepository, SyncStateRepository, VectorClockRepository,
};

/// Pop a pending forced failure, if one was injected.
fn forced_failure(slot: &mut Option<String>) -> Result<(), StorageError> {
    match slot.take() {
        Some(message) => Err(StorageError::Backend(message)),
        None => Ok(()),
    }
}

/// In-memory [`OperationRepository`].
#[derive(Debug, Default)]
pub struct MemoryOperationRepository {
    inner: Arc<Mutex<OperationInner>>,
}

#[derive(Debug, Default)]
struct OperationInner {
    operations: BTreeMap<OperationId, Operation>,
    fail_next: Option<String>,
}

impl MemoryOperationRepository {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cause the next call to fail with the given backend error.
    pub fn fail_next(&self, message: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next = Some(message.to_string());
    }
}

impl Clone for MemoryOperationRepository {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl OperationRepository for MemoryOperationRepository {
    async fn save(&self, operation: &Operation) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        inner
            .operations
            .insert(operation.id.clone(), operation.clone());
        debug!("saved operation {}", operation.id);
        Ok(())
    }

    async fn find_by_device_id(
        &self,
        device_id: &DeviceId,
    ) -> Result<Vec<Operation>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        Ok(inner
            .operations
            .values()
            .filter(|op| op.device_id == *device_id)
            .cloned()
            .collect())
    }

    async fn find_all(&self) -> Result<Vec<Operation>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        Ok(inner.operations.values().cloned().collect())
    }

    async fn find_pending(&self) -> Result<Vec<Operation>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        Ok(inner
            .operations
            .values()
            .filter(|op| !op.synced)
            .cloned()
            .collect())
    }

    async fn delete_for_device(&self, device_id: &DeviceId) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        inner.operations.retain(|_, op| op.device_id != *device_id);
        debug!("deleted operations for device {}", device_id);
        Ok(())
    }
}

/// In-memory [`ConflictRepository`].
#[derive(Debug, Default)]
pub struct MemoryConflictRepository {
    inner: Arc<Mutex<ConflictInner>>,
}

#[derive(Debug, Default)]
struct ConflictInner {
    conflicts: BTreeMap<ConflictId, Conflict>,
    fail_next: Option<String>,
}

impl MemoryConflictRepository {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cause the next call to fail with the given backend error.
    pub fn fail_next(&self, message: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next = Some(message.to_string());
    }
}

impl Clone for MemoryConflictRepository {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl ConflictRepository for MemoryConflictRepository {
    async fn save(&self, conflict: &Conflict) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        inner.conflicts.insert(conflict.id, conflict.clone());
        debug!("saved conflict {}", conflict.id);
        Ok(())
    }

    async fn find_by_device_id(
        &self,
        device_id: &DeviceId,
    ) -> Result<Vec<Conflict>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        Ok(inner
            .conflicts
            .values()
            .filter(|c| c.involves_device(device_id))
            .cloned()
            .collect())
    }

    async fn find_all(&self) -> Result<Vec<Conflict>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        Ok(inner.conflicts.values().cloned().collect())
    }

    async fn find_unresolved(&self) -> Result<Vec<Conflict>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        Ok(inner
            .conflicts
            .values()
            .filter(|c| !c.is_resolved())
            .cloned()
            .collect())
    }

    async fn delete_for_device(&self, device_id: &DeviceId) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        inner.conflicts.retain(|_, c| !c.involves_device(device_id));
        debug!("deleted conflicts for device {}", device_id);
        Ok(())
    }
}

/// In-memory [`SyncStateRepository`].
#[derive(Debug, Default)]
pub struct MemorySyncStateRepository {
    inner: Arc<Mutex<SyncStateInner>>,
}

#[derive(Debug, Default)]
struct SyncStateInner {
    states: BTreeMap<DeviceId, SyncState>,
    fail_next: Option<String>,
}

impl MemorySyncStateRepository {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cause the next call to fail with the given backend error.
    pub fn fail_next(&self, message: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next = Some(message.to_string());
    }
}

impl Clone for MemorySyncStateRepository {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl SyncStateRepository for MemorySyncStateRepository {
    async fn save(&self, state: &SyncState) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        inner
            .states
            .insert(state.local_device_id().clone(), state.clone());
        debug!("saved sync state for device {}", state.local_device_id());
        Ok(())
    }

    async fn find_by_device_id(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<SyncState>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        Ok(inner.states.get(device_id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<SyncState>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        Ok(inner.states.values().cloned().collect())
    }

    async fn find_conflicting(&self) -> Result<Vec<SyncState>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        Ok(inner
            .states
            .values()
            .filter(|s| s.has_conflicts())
            .cloned()
            .collect())
    }

    async fn find_offline(&self) -> Result<Vec<SyncState>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        Ok(inner
            .states
            .values()
            .filter(|s| s.is_offline())
            .cloned()
            .collect())
    }

    async fn delete(&self, device_id: &DeviceId) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        inner.states.remove(device_id);
        debug!("deleted sync state for device {}", device_id);
        Ok(())
    }
}

/// In-memory [`VectorClockRepository`].
#[derive(Debug, Default)]
pub struct MemoryVectorClockRepository {
    inner: Arc<Mutex<ClockInner>>,
}

#[derive(Debug, Default)]
struct ClockInner {
    clocks: BTreeMap<DeviceId, VectorClock>,
    fail_next: Option<String>,
}

impl MemoryVectorClockRepository {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cause the next call to fail with the given backend error.
    pub fn fail_next(&self, message: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next = Some(message.to_string());
    }
}

impl Clone for MemoryVectorClockRepository {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl VectorClockRepository for MemoryVectorClockRepository {
    async fn save(&self, device_id: &DeviceId, clock: &VectorClock) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        inner.clocks.insert(device_id.clone(), clock.clone());
        debug!("saved clock for device {}", device_id);
        Ok(())
    }

    async fn find_by_device_id(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<VectorClock>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        Ok(inner.clocks.get(device_id).cloned())
    }

    async fn find_latest(&self) -> Result<Vec<(DeviceId, VectorClock)>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        Ok(inner
            .clocks
            .iter()
            .map(|(d, c)| (d.clone(), c.clone()))
            .collect())
    }

    async fn delete(&self, device_id: &DeviceId) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        forced_failure(&mut inner.fail_next)?;
        inner.clocks.remove(device_id);
        debug!("deleted clock for device {}", device_id);
        Ok(())
    }
}
