//! Error taxonomy for storage operations.
//!
//! Every driver translates backend-native failures into exactly one of
//! these kinds before returning; no SDK or OS error type crosses a driver
//! method boundary.

use std::fmt;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// Target path absent.
    NotFound { path: String },

    /// Backend denied access to the target path.
    PermissionDenied { path: String },

    /// Checksum verification failed. Carries both the caller-declared and
    /// the actually-computed checksum for diagnosability.
    IntegrityMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Operation not supported by the selected backend.
    Unimplemented { operation: String },

    /// Path failed normalization before backend dispatch.
    InvalidPath { path: String, reason: String },

    /// Unclassified backend failure, original context preserved.
    Unknown { source: anyhow::Error },
}

impl StorageError {
    /// Wrap an unclassified failure, preserving its context chain.
    pub fn unknown(source: impl Into<anyhow::Error>) -> Self {
        StorageError::Unknown {
            source: source.into(),
        }
    }

    /// Mark an operation as unsupported by the current backend.
    pub fn unimplemented(operation: impl Into<String>) -> Self {
        StorageError::Unimplemented {
            operation: operation.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// Translate a filesystem error for the given key.
    ///
    /// POSIX error codes map deterministically: `NotFound` and
    /// `PermissionDenied` keep their kind, everything else is `Unknown`
    /// with the path recorded in the context.
    pub(crate) fn from_io(path: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound {
                path: path.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                path: path.to_string(),
            },
            _ => StorageError::Unknown {
                source: anyhow::Error::from(err).context(format!("filesystem error: {}", path)),
            },
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound { path } => write!(f, "Object not found: {}", path),
            StorageError::PermissionDenied { path } => write!(f, "Permission denied: {}", path),
            StorageError::IntegrityMismatch {
                path,
                expected,
                actual,
            } => write!(
                f,
                "Mismatched integrity check for {}: expecting {} while acquired {}",
                path, expected, actual
            ),
            StorageError::Unimplemented { operation } => {
                write!(f, "Operation not implemented: {}", operation)
            }
            StorageError::InvalidPath { path, reason } => {
                write!(f, "Invalid object path '{}': {}", path, reason)
            }
            StorageError::Unknown { source } => write!(f, "Storage error: {:#}", source),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Unknown { source } => Some(source.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_translates() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let translated = StorageError::from_io("a/b.txt", err);
        assert!(matches!(
            translated,
            StorageError::NotFound { ref path } if path == "a/b.txt"
        ));
    }

    #[test]
    fn io_permission_denied_translates() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let translated = StorageError::from_io("secret.bin", err);
        assert!(matches!(
            translated,
            StorageError::PermissionDenied { ref path } if path == "secret.bin"
        ));
    }

    #[test]
    fn io_other_becomes_unknown_with_context() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let translated = StorageError::from_io("x.bin", err);
        match translated {
            StorageError::Unknown { source } => {
                let message = format!("{:#}", source);
                assert!(message.contains("x.bin"));
                assert!(message.contains("disk on fire"));
            }
            other => panic!("expected Unknown, got {:?}", other),
        }
    }

    #[test]
    fn integrity_mismatch_reports_both_hashes() {
        let err = StorageError::IntegrityMismatch {
            path: "p".to_string(),
            expected: "aaaa".to_string(),
            actual: "bbbb".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("aaaa"));
        assert!(message.contains("bbbb"));
    }
}
