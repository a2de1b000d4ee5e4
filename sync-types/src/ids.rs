//! Identity types for causal-sync.
//!
//! Both identifiers are validated strings: construction either yields a
//! canonical (trimmed) value or a [`ValidationError`], never anything in
//! between. Deserialization goes through the same validation, so a persisted
//! id can never smuggle an invalid value back into the engine.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ValidationError;

/// Maximum length of a [`DeviceId`] in characters.
pub const DEVICE_ID_MAX_LEN: usize = 64;

/// Maximum length of an [`OperationId`] in characters.
pub const OPERATION_ID_MAX_LEN: usize = 128;

/// A unique identifier for a device (replica) in the sync network.
///
/// Canonical form matches `[A-Za-z0-9_-]{1,64}`; equality is case-sensitive.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a DeviceId from a raw string, trimming surrounding whitespace.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let value = validate(
            raw,
            "device id",
            DEVICE_ID_MAX_LEN,
            "alphanumeric characters, hyphens, and underscores",
            |c| c.is_ascii_alphanumeric() || c == '_' || c == '-',
        )?;
        Ok(Self(value))
    }

    /// Generate a random DeviceId of the form
    /// `device-<base36 millis>-<base36 random>`. Never fails.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 8];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        let random = u64::from_le_bytes(bytes);
        Self(format!(
            "device-{}-{}",
            base36(now_millis()),
            base36(random)
        ))
    }

    /// Get the canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id names the local device.
    ///
    /// True iff the value starts with `local-` or contains `localhost`.
    /// Deliberately loose: a substring match, case-sensitive.
    pub fn is_local(&self) -> bool {
        self.0.starts_with("local-") || self.0.contains("localhost")
    }

    /// Shortened display form: the value itself when 8 characters or fewer,
    /// otherwise the first and last four characters joined by `...`.
    pub fn short_id(&self) -> String {
        if self.0.len() <= 8 {
            self.0.clone()
        } else {
            format!("{}...{}", &self.0[..4], &self.0[self.0.len() - 4..])
        }
    }
}

impl TryFrom<String> for DeviceId {
    type Error = ValidationError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(&raw)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.short_id())
    }
}

/// A unique identifier for a locally-originated operation.
///
/// Canonical form matches `[A-Za-z0-9_\-:.]{1,128}`. Two construction
/// families exist: structured ids produced by [`OperationId::generate`] /
/// [`OperationId::generate_with_uuid`], which encode their origin, and
/// arbitrary externally-supplied strings. Decoding accessors return `None`
/// for anything that is not the structured `op_<short>_<seq>_<ts36>` form;
/// an arbitrary id is a legitimate value, not an error.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OperationId(String);

/// A structured id parsed into its components. Internal only: the public
/// surface exposes the fields through the individual accessors.
struct Decoded<'a> {
    short_id: &'a str,
    sequence: u64,
    timestamp_ms: u64,
}

impl OperationId {
    /// Create an OperationId from a raw string, trimming surrounding
    /// whitespace.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let value = validate(
            raw,
            "operation id",
            OPERATION_ID_MAX_LEN,
            "alphanumeric characters, hyphens, underscores, colons, and periods",
            |c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.'),
        )?;
        Ok(Self(value))
    }

    /// Generate a structured id `op_<shortId>_<sequence>_<base36 millis>`.
    ///
    /// Ids generated at different milliseconds differ even for equal
    /// device/sequence pairs.
    pub fn generate(device_id: &DeviceId, sequence: u64) -> Self {
        Self(format!(
            "op_{}_{}_{}",
            device_id.short_id(),
            sequence,
            base36(now_millis())
        ))
    }

    /// Generate a structured id `op_<shortId>_<uuidv4>`. Never fails and is
    /// unique with overwhelming probability.
    pub fn generate_with_uuid(device_id: &DeviceId) -> Self {
        Self(format!("op_{}_{}", device_id.short_id(), uuid::Uuid::new_v4()))
    }

    /// Get the canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The device short-id encoded in a structured id, or `None` when the
    /// id does not match `op_<short>_<seq>_<ts36>`.
    pub fn device_short_id(&self) -> Option<&str> {
        self.decode().map(|d| d.short_id)
    }

    /// The per-device sequence number encoded in a structured id.
    pub fn sequence_number(&self) -> Option<u64> {
        self.decode().map(|d| d.sequence)
    }

    /// The creation timestamp (unix millis) encoded in a structured id.
    pub fn timestamp_ms(&self) -> Option<u64> {
        self.decode().map(|d| d.timestamp_ms)
    }

    /// Whether this id was generated by the given device.
    ///
    /// False whenever the id is not decodable.
    pub fn is_from_device(&self, device_id: &DeviceId) -> bool {
        self.device_short_id() == Some(device_id.short_id().as_str())
    }

    /// Whether this id's encoded timestamp is strictly earlier than
    /// `other`'s. False when either side is undecodable.
    pub fn is_older_than(&self, other: &OperationId) -> bool {
        match (self.timestamp_ms(), other.timestamp_ms()) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }

    /// Whether this id's encoded timestamp is strictly later than
    /// `other`'s. False when either side is undecodable.
    pub fn is_newer_than(&self, other: &OperationId) -> bool {
        match (self.timestamp_ms(), other.timestamp_ms()) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        }
    }

    /// Total order over all operation ids: decoded sequence numbers when
    /// both sides decode, lexicographic raw-string comparison otherwise.
    pub fn compare_by_sequence(&self, other: &OperationId) -> Ordering {
        match (self.sequence_number(), other.sequence_number()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self.0.cmp(&other.0),
        }
    }

    /// Parse the structured `op_<short>_<seq>_<ts36>` form.
    ///
    /// Split from the right: a device short-id may itself contain
    /// underscores, the trailing sequence and timestamp segments cannot.
    fn decode(&self) -> Option<Decoded<'_>> {
        let rest = self.0.strip_prefix("op_")?;
        let mut parts = rest.rsplitn(3, '_');
        let ts = parts.next()?;
        let seq = parts.next()?;
        let short_id = parts.next()?;
        if short_id.is_empty() {
            return None;
        }
        let sequence = seq.parse::<u64>().ok()?;
        let timestamp_ms = u64::from_str_radix(ts, 36).ok()?;
        Some(Decoded {
            short_id,
            sequence,
            timestamp_ms,
        })
    }
}

impl TryFrom<String> for OperationId {
    type Error = ValidationError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(&raw)
    }
}

impl From<OperationId> for String {
    fn from(id: OperationId) -> Self {
        id.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationId({})", self.0)
    }
}

/// Shared validation: empty and whitespace-only get distinct errors, then
/// length, then alphabet, all on the trimmed value.
fn validate(
    raw: &str,
    field: &'static str,
    max: usize,
    allowed: &'static str,
    is_allowed: fn(char) -> bool,
) -> Result<String, ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Whitespace { field });
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    if !trimmed.chars().all(is_allowed) {
        return Err(ValidationError::InvalidCharacters { field, allowed });
    }
    Ok(trimmed.to_string())
}

/// Lowercase base36 rendering of a u64.
fn base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.iter().rev().map(|&b| b as char).collect()
}

/// Current wall-clock time in unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
