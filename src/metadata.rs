//! Blob metadata structures: write-time options and stat results.

use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

/// Options for put operations.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Caching attributes services may use when serving the blob.
    pub cache_control: Option<String>,

    /// Whether the blob content is expected to be displayed inline or as an
    /// attachment.
    pub content_disposition: Option<String>,

    /// Encoding used for the blob's content, if any.
    pub content_encoding: Option<String>,

    /// Language used in the blob's content, if any.
    pub content_language: Option<String>,

    /// MIME type of the blob being written.
    pub content_type: Option<String>,

    /// Expected SHA-256 of the content, hex-encoded. When set, the write
    /// fails with `IntegrityMismatch` unless the persisted bytes hash to
    /// this value.
    pub checksum_sha256: Option<String>,

    /// Key/value pairs associated with the blob. Keys are folded to
    /// lowercase before reaching the backend; duplicate case-insensitive
    /// keys collapse to a single entry.
    pub metadata: HashMap<String, String>,
}

impl PutOptions {
    /// Metadata map with keys folded to lowercase, or `None` when empty.
    pub(crate) fn normalized_metadata(&self) -> Option<HashMap<String, String>> {
        if self.metadata.is_empty() {
            return None;
        }
        Some(fold_metadata_keys(&self.metadata))
    }
}

/// Fold metadata keys to lowercase. When two keys collide
/// case-insensitively, the one folded later wins.
pub(crate) fn fold_metadata_keys(metadata: &HashMap<String, String>) -> HashMap<String, String> {
    metadata
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect()
}

/// Metadata reported by `stat`.
///
/// Fields a backend cannot supply default to `None`, and timestamps default
/// to the Unix epoch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatResult {
    /// Size of the blob's content in bytes.
    pub size: u64,

    /// Time the blob was created.
    pub created: SystemTime,

    /// Time the blob was last modified.
    pub last_modified: SystemTime,

    /// SHA-256 of the blob contents, if the backend reports one, in the
    /// backend's own encoding. S3 reports the base64 of the raw digest
    /// rather than the lowercase hex used by [`PutOptions`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum_sha256: Option<String>,

    /// ETag for the blob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,

    /// Key/value pairs associated with the blob, keys lowercased.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl Default for StatResult {
    fn default() -> Self {
        Self {
            size: 0,
            created: UNIX_EPOCH,
            last_modified: UNIX_EPOCH,
            checksum_sha256: None,
            etag: None,
            content_type: None,
            content_encoding: None,
            content_language: None,
            content_disposition: None,
            cache_control: None,
            metadata: None,
        }
    }
}

impl StatResult {
    /// Stat with just a size, everything else defaulted.
    pub fn with_size(size: u64) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_keys_fold_to_lowercase() {
        let mut metadata = HashMap::new();
        metadata.insert("Content-Owner".to_string(), "alice".to_string());
        metadata.insert("tier".to_string(), "hot".to_string());

        let folded = fold_metadata_keys(&metadata);
        assert_eq!(folded.get("content-owner"), Some(&"alice".to_string()));
        assert_eq!(folded.get("tier"), Some(&"hot".to_string()));
        assert_eq!(folded.len(), 2);
    }

    #[test]
    fn duplicate_case_insensitive_keys_collapse() {
        let mut metadata = HashMap::new();
        metadata.insert("Foo".to_string(), "a".to_string());
        metadata.insert("FOO".to_string(), "b".to_string());

        let folded = fold_metadata_keys(&metadata);
        assert_eq!(folded.len(), 1);
        let value = folded.get("foo").unwrap();
        assert!(value == "a" || value == "b");
    }

    #[test]
    fn empty_metadata_normalizes_to_none() {
        let options = PutOptions::default();
        assert!(options.normalized_metadata().is_none());
    }

    #[test]
    fn stat_defaults_to_epoch() {
        let stat = StatResult::with_size(42);
        assert_eq!(stat.size, 42);
        assert_eq!(stat.created, UNIX_EPOCH);
        assert_eq!(stat.last_modified, UNIX_EPOCH);
        assert!(stat.etag.is_none());
    }
}
