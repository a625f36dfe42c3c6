//! Provider-agnostic storage facade.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use tracing::info;

use crate::{
    config::{ConnectionConfig, Provider},
    driver::{filesystem::FilesystemDriver, s3::S3Driver, ObjectWriter, StorageDriver},
    error::{StorageError, StorageResult},
    metadata::{PutOptions, StatResult},
    path::ObjectPath,
};

/// Handle to one connected storage backend.
///
/// Construction picks the driver once from the connection config; every
/// operation afterwards is a straight delegation with identical semantics
/// across backends. Raw keys are normalized at this boundary, so drivers
/// only ever see validated paths.
///
/// Cloning is cheap and clones share the underlying connection.
#[derive(Clone)]
pub struct Storage {
    driver: Arc<dyn StorageDriver>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

impl Storage {
    /// Connect to the backend described by `config`.
    ///
    /// Providers that are recognized but have no driver yet fail with
    /// `Unimplemented`.
    pub async fn connect(config: &ConnectionConfig) -> StorageResult<Self> {
        let driver: Arc<dyn StorageDriver> = match config.provider {
            Provider::Filesystem => Arc::new(FilesystemDriver::new(&config.bucket_or_root)?),
            Provider::S3Compatible => Arc::new(S3Driver::connect(config).await?),
            Provider::Gcs | Provider::AzureBlob => {
                return Err(StorageError::unimplemented(format!(
                    "provider '{}'",
                    config.provider.as_str()
                )));
            }
        };
        info!(
            provider = config.provider.as_str(),
            target = %config.bucket_or_root,
            "Connected storage backend"
        );
        Ok(Self { driver })
    }

    /// Wrap an already-constructed driver.
    pub fn from_driver(driver: Arc<dyn StorageDriver>) -> Self {
        Self { driver }
    }

    /// Write a blob in one shot.
    pub async fn put(
        &self,
        key: &str,
        content: impl Into<Bytes>,
        options: &PutOptions,
    ) -> StorageResult<()> {
        let path = ObjectPath::parse(key)?;
        self.driver.put(&path, content.into(), options).await
    }

    /// Open a streaming write handle.
    pub async fn put_stream(
        &self,
        key: &str,
        options: &PutOptions,
    ) -> StorageResult<Box<dyn ObjectWriter>> {
        let path = ObjectPath::parse(key)?;
        self.driver.put_stream(&path, options).await
    }

    /// Read a blob's full content.
    pub async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = ObjectPath::parse(key)?;
        self.driver.get(&path).await
    }

    /// Open a streaming read of a blob.
    pub async fn get_stream(
        &self,
        key: &str,
    ) -> StorageResult<BoxStream<'static, StorageResult<Bytes>>> {
        let path = ObjectPath::parse(key)?;
        self.driver.get_stream(&path).await
    }

    /// Metadata for a blob.
    pub async fn stat(&self, key: &str) -> StorageResult<StatResult> {
        let path = ObjectPath::parse(key)?;
        self.driver.stat(&path).await
    }

    /// All keys under `prefix`, or every key when `prefix` is `None`.
    pub async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<String>> {
        let prefix = match prefix {
            Some(raw) => Some(ObjectPath::parse(raw)?),
            None => None,
        };
        self.driver.list(prefix.as_ref()).await
    }

    /// Whether a blob exists.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = ObjectPath::parse(key)?;
        self.driver.exists(&path).await
    }

    /// Delete a blob; deleting an absent key succeeds.
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = ObjectPath::parse(key)?;
        self.driver.delete(&path).await
    }

    /// Copy a blob within the backend.
    pub async fn copy(&self, source: &str, destination: &str) -> StorageResult<()> {
        let source = ObjectPath::parse(source)?;
        let destination = ObjectPath::parse(destination)?;
        self.driver.copy(&source, &destination).await
    }

    /// Move a blob: copy then delete the source.
    pub async fn move_object(&self, source: &str, destination: &str) -> StorageResult<()> {
        let source = ObjectPath::parse(source)?;
        let destination = ObjectPath::parse(destination)?;
        self.driver.move_object(&source, &destination).await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn filesystem_storage() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let config = ConnectionConfig::filesystem(dir.path().display().to_string());
        let storage = Storage::connect(&config).await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn facade_delegates_roundtrip() {
        let (_dir, storage) = filesystem_storage().await;

        storage
            .put("docs/readme.md", &b"content"[..], &PutOptions::default())
            .await
            .unwrap();
        assert!(storage.exists("docs/readme.md").await.unwrap());
        assert_eq!(storage.get("docs/readme.md").await.unwrap().as_ref(), b"content");
        assert_eq!(storage.stat("docs/readme.md").await.unwrap().size, 7);

        storage.move_object("docs/readme.md", "docs/moved.md").await.unwrap();
        assert!(!storage.exists("docs/readme.md").await.unwrap());
        assert_eq!(storage.list(Some("docs")).await.unwrap(), vec!["docs/moved.md"]);

        storage.delete("docs/moved.md").await.unwrap();
        assert!(storage.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn keys_are_normalized_at_the_boundary() {
        let (_dir, storage) = filesystem_storage().await;

        storage
            .put("a//b/./c.txt", &b"x"[..], &PutOptions::default())
            .await
            .unwrap();
        assert!(storage.exists("a/b/c.txt").await.unwrap());
    }

    #[tokio::test]
    async fn escaping_keys_are_rejected_before_dispatch() {
        let (_dir, storage) = filesystem_storage().await;

        let err = storage
            .put("../outside.txt", &b"x"[..], &PutOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath { .. }));
        assert!(matches!(
            storage.get("").await.unwrap_err(),
            StorageError::InvalidPath { .. }
        ));
    }

    #[tokio::test]
    async fn unwired_providers_fail_unimplemented() {
        for provider in [Provider::Gcs, Provider::AzureBlob] {
            let config = ConnectionConfig {
                provider,
                bucket_or_root: "bucket".to_string(),
                credentials: None,
                parameters: Default::default(),
            };
            let err = Storage::connect(&config).await.unwrap_err();
            match err {
                StorageError::Unimplemented { operation } => {
                    assert!(operation.contains(provider.as_str()));
                }
                other => panic!("expected Unimplemented, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn streaming_write_through_facade() {
        let (_dir, storage) = filesystem_storage().await;

        let mut writer = storage
            .put_stream("stream/out.bin", &PutOptions::default())
            .await
            .unwrap();
        writer.write(Bytes::from_static(b"hello ")).await.unwrap();
        writer.write(Bytes::from_static(b"world")).await.unwrap();
        writer.finish().await.unwrap();

        assert_eq!(
            storage.get("stream/out.bin").await.unwrap().as_ref(),
            b"hello world"
        );
    }
}
