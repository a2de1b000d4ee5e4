//! Vector clocks: the causal-ordering primitive.
//!
//! A clock maps each device to a non-negative event counter. Comparing two
//! clocks yields a partial order: one side happened before the other, they
//! are equal, or they are concurrent. Concurrency is the conflict signal —
//! wall-clock time is never consulted.
//!
//! Clocks are persistent values: `increment` and `merge` return new clocks
//! and never mutate the receiver, so snapshots held by callers stay valid.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ids::DeviceId;

/// Outcome of comparing two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CausalOrder {
    /// Every counter in `self` is <= the other's, at least one strictly.
    Before,
    /// Every counter in the other is <= `self`'s, at least one strictly.
    After,
    /// All counters match.
    Equal,
    /// Each side is ahead on at least one device: neither happened first.
    Concurrent,
}

/// Per-device logical clock.
///
/// Counters are monotonically non-decreasing under [`increment`] and
/// [`merge`] for any single device entry; negative counters are
/// unrepresentable by construction.
///
/// [`increment`]: VectorClock::increment
/// [`merge`]: VectorClock::merge
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    entries: BTreeMap<DeviceId, u64>,
}

impl VectorClock {
    /// Create a clock seeded with exactly one entry, `device_id -> 0`.
    ///
    /// Used at device bootstrap. Consistent with [`increment`] creating
    /// absent entries at 1.
    ///
    /// [`increment`]: VectorClock::increment
    pub fn new(device_id: DeviceId) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(device_id, 0);
        Self { entries }
    }

    /// The counter for a device; missing entries read as 0.
    pub fn get(&self, device_id: &DeviceId) -> u64 {
        self.entries.get(device_id).copied().unwrap_or(0)
    }

    /// A new clock with the given device's counter advanced by one
    /// (created at 1 when absent). Called when the local device produces
    /// a new operation.
    pub fn increment(&self, device_id: &DeviceId) -> Self {
        let mut entries = self.entries.clone();
        *entries.entry(device_id.clone()).or_insert(0) += 1;
        Self { entries }
    }

    /// Pointwise maximum over the union of device keys.
    ///
    /// Commutative and idempotent: `a.merge(&b) == b.merge(&a)` and
    /// `a.merge(&a) == a`. Called when a remote clock is received.
    pub fn merge(&self, other: &VectorClock) -> Self {
        let mut entries = self.entries.clone();
        for (device, &counter) in &other.entries {
            let entry = entries.entry(device.clone()).or_insert(0);
            *entry = (*entry).max(counter);
        }
        Self { entries }
    }

    /// Compare two clocks under the happens-before partial order.
    pub fn compare(&self, other: &VectorClock) -> CausalOrder {
        let mut self_ahead = false;
        let mut other_ahead = false;

        for device in self.entries.keys().chain(other.entries.keys()) {
            match self.get(device).cmp(&other.get(device)) {
                std::cmp::Ordering::Greater => self_ahead = true,
                std::cmp::Ordering::Less => other_ahead = true,
                std::cmp::Ordering::Equal => {}
            }
            if self_ahead && other_ahead {
                return CausalOrder::Concurrent;
            }
        }

        match (self_ahead, other_ahead) {
            (false, false) => CausalOrder::Equal,
            (true, false) => CausalOrder::After,
            (false, true) => CausalOrder::Before,
            (true, true) => CausalOrder::Concurrent,
        }
    }

    /// Whether neither clock happened before the other.
    ///
    /// This is the predicate that flags true conflicts, as opposed to one
    /// side simply being behind.
    pub fn is_concurrent_with(&self, other: &VectorClock) -> bool {
        self.compare(other) == CausalOrder::Concurrent
    }

    /// Read-only iteration over `(device, counter)` entries, ordered by
    /// canonical device id.
    pub fn iter(&self) -> impl Iterator<Item = (&DeviceId, u64)> {
        self.entries.iter().map(|(d, &c)| (d, c))
    }

    /// The devices with an entry in this clock.
    pub fn devices(&self) -> impl Iterator<Item = &DeviceId> {
        self.entries.keys()
    }

    /// Number of device entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the clock has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (device, counter) in self.iter() {
            map.entry(&device.as_str(), &counter);
        }
        map.finish()
    }
}
