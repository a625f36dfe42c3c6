//! Content-integrity verification.
//!
//! Writes that declare an expected checksum are verified against the bytes
//! actually persisted. The hash streams through a fixed-size buffer so the
//! object is never held in memory a second time.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::{StorageError, StorageResult};

/// Read-back buffer size for file hashing.
const HASH_BUF_SIZE: usize = 64 * 1024;

/// Hex-encoded SHA-256 of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hex-encoded SHA-256 of a file, computed by streaming the file back in
/// fixed-size chunks.
pub async fn file_sha256_hex(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare an expected checksum against the computed one.
///
/// Exact string equality; a mismatch carries both values.
pub fn verify(path: &str, expected: &str, actual: &str) -> StorageResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(StorageError::IntegrityMismatch {
            path: path.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_of_known_input() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn file_hash_matches_buffer_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let content = vec![7u8; 3 * HASH_BUF_SIZE + 11];
        tokio::fs::write(&path, &content).await.unwrap();

        let from_file = file_sha256_hex(&path).await.unwrap();
        assert_eq!(from_file, sha256_hex(&content));
    }

    #[test]
    fn verify_accepts_exact_match() {
        assert!(verify("k", "abc", "abc").is_ok());
    }

    #[test]
    fn verify_rejects_mismatch_with_both_values() {
        let err = verify("k", "abc", "def").unwrap_err();
        match err {
            StorageError::IntegrityMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, "abc");
                assert_eq!(actual, "def");
            }
            other => panic!("expected IntegrityMismatch, got {:?}", other),
        }
    }
}
