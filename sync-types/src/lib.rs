//! # sync-types
//!
//! Identity and causality types for the causal-sync engine.
//!
//! This crate provides the foundational types used across all causal-sync
//! crates:
//! - [`DeviceId`], [`OperationId`] - Validated identifier types
//! - [`VectorClock`], [`CausalOrder`] - The causal-ordering primitive
//! - [`Operation`], [`Conflict`] - Persisted records
//! - [`ValidationError`] - Construction-time validation failures

#![warn(missing_docs)]
#![warn(clippy::all)]

mod clock;
mod error;
mod ids;
mod records;

pub use clock::{CausalOrder, VectorClock};
pub use error::ValidationError;
pub use ids::{DeviceId, OperationId, DEVICE_ID_MAX_LEN, OPERATION_ID_MAX_LEN};
pub use records::{Conflict, ConflictId, ConflictStatus, Operation};
