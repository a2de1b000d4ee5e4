//! Error types for the repository ports.

use thiserror::Error;

/// Failures crossing a repository port.
///
/// Backend details stay opaque: the engine passes these through to its
/// caller without reinterpretation, and retry policy lives with the
/// caller, never here.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store failed.
    #[error("backend error: {0}")]
    Backend(String),

    /// An entity could not be encoded or decoded by the backend.
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StorageError::Backend("disk full".into());
        assert_eq!(err.to_string(), "backend error: disk full");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StorageError>();
    }
}
