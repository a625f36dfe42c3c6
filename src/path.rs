//! Object path normalization.
//!
//! Keys are slash-separated and relative to the configured bucket or root
//! directory. Normalization collapses `.` and `..` segments before any
//! backend sees the key, so a key can never escape its namespace.

use std::fmt;

use crate::error::{StorageError, StorageResult};

/// A normalized, slash-separated key identifying a blob within a bucket or
/// root directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Parse and normalize a raw key.
    ///
    /// Empty segments and `.` are dropped, `..` consumes the previous
    /// segment. A `..` that would climb above the root, or a key that
    /// normalizes to nothing, is rejected with `InvalidPath`.
    pub fn parse(raw: &str) -> StorageResult<Self> {
        let mut segments: Vec<&str> = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(StorageError::InvalidPath {
                            path: raw.to_string(),
                            reason: "path escapes the storage root".to_string(),
                        });
                    }
                }
                other => segments.push(other),
            }
        }

        if segments.is_empty() {
            return Err(StorageError::InvalidPath {
                path: raw.to_string(),
                reason: "path has no segments after normalization".to_string(),
            });
        }

        Ok(ObjectPath(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve this key against a filesystem root.
    pub(crate) fn to_fs_path(&self, root: &std::path::Path) -> std::path::PathBuf {
        let mut full = root.to_path_buf();
        for segment in self.0.split('/') {
            full.push(segment);
        }
        full
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_key_is_unchanged() {
        assert_eq!(ObjectPath::parse("a/b/c.txt").unwrap().as_str(), "a/b/c.txt");
    }

    #[test]
    fn empty_and_dot_segments_collapse() {
        assert_eq!(ObjectPath::parse("a//b/./c").unwrap().as_str(), "a/b/c");
        assert_eq!(ObjectPath::parse("./a").unwrap().as_str(), "a");
        assert_eq!(ObjectPath::parse("a/b/").unwrap().as_str(), "a/b");
    }

    #[test]
    fn parent_segments_resolve_within_root() {
        assert_eq!(ObjectPath::parse("a/b/../c").unwrap().as_str(), "a/c");
        assert_eq!(ObjectPath::parse("a/../b").unwrap().as_str(), "b");
    }

    #[test]
    fn escaping_root_is_rejected() {
        assert!(matches!(
            ObjectPath::parse("../etc/passwd"),
            Err(StorageError::InvalidPath { .. })
        ));
        assert!(matches!(
            ObjectPath::parse("a/../../b"),
            Err(StorageError::InvalidPath { .. })
        ));
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(
            ObjectPath::parse(""),
            Err(StorageError::InvalidPath { .. })
        ));
        assert!(matches!(
            ObjectPath::parse("a/.."),
            Err(StorageError::InvalidPath { .. })
        ));
    }

    #[test]
    fn resolves_against_fs_root() {
        let path = ObjectPath::parse("a/b.txt").unwrap();
        let full = path.to_fs_path(std::path::Path::new("/root/storage"));
        assert_eq!(full, std::path::PathBuf::from("/root/storage/a/b.txt"));
    }
}
