//! # sync-store
//!
//! Repository ports for the causal-sync engine, plus an in-memory
//! reference backend.
//!
//! The engine consumes storage exclusively through the traits in
//! [`repository`]; concrete backends belong to the embedding application.
//! The [`memory`] module provides a deterministic in-memory implementation
//! of every port, suitable for tests and for hosts that persist elsewhere.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
pub mod memory;
pub mod repository;

pub use error::StorageError;
pub use memory::{
    MemoryConflictRepository, MemoryOperationRepository, MemorySyncStateRepository,
    MemoryVectorClockRepository,
};
pub use repository::{
    ConflictRepository, OperationRepository, SyncStateRepository, VectorClockRepository,
};
