//! Local filesystem driver.

use std::{
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::{
    driver::{ObjectWriter, StorageDriver},
    error::{StorageError, StorageResult},
    integrity,
    metadata::{PutOptions, StatResult},
    path::ObjectPath,
};

/// Driver backed by a directory on the local filesystem.
///
/// Keys map to files under the configured root; intermediate directories
/// are created as needed on write. Content headers and custom metadata in
/// [`PutOptions`] have no filesystem representation and are not persisted.
pub struct FilesystemDriver {
    root: PathBuf,
}

impl FilesystemDriver {
    /// Create a driver rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| StorageError::from_io(&root.display().to_string(), e))?;
        debug!(root = %root.display(), "Created filesystem driver");
        Ok(Self { root })
    }

    fn resolve(&self, path: &ObjectPath) -> PathBuf {
        path.to_fs_path(&self.root)
    }

    async fn create_parents(&self, full: &Path, key: &str) -> StorageResult<()> {
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::from_io(key, e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageDriver for FilesystemDriver {
    async fn put(
        &self,
        path: &ObjectPath,
        content: Bytes,
        options: &PutOptions,
    ) -> StorageResult<()> {
        let full = self.resolve(path);
        self.create_parents(&full, path.as_str()).await?;
        tokio::fs::write(&full, &content)
            .await
            .map_err(|e| StorageError::from_io(path.as_str(), e))?;

        // Verify by streaming the written bytes back, so a corrupt object
        // never stays visible under its final name.
        if let Some(expected) = &options.checksum_sha256 {
            let actual = integrity::file_sha256_hex(&full)
                .await
                .map_err(|e| StorageError::from_io(path.as_str(), e))?;
            if let Err(err) = integrity::verify(path.as_str(), expected, &actual) {
                let _ = tokio::fs::remove_file(&full).await;
                return Err(err);
            }
        }
        Ok(())
    }

    async fn put_stream(
        &self,
        path: &ObjectPath,
        options: &PutOptions,
    ) -> StorageResult<Box<dyn ObjectWriter>> {
        let full = self.resolve(path);
        self.create_parents(&full, path.as_str()).await?;
        let file = tokio::fs::File::create(&full)
            .await
            .map_err(|e| StorageError::from_io(path.as_str(), e))?;
        Ok(Box::new(FileWriter {
            key: path.as_str().to_string(),
            destination: full,
            file: Some(file),
            expected_sha256: options.checksum_sha256.clone(),
            hasher: options.checksum_sha256.as_ref().map(|_| Sha256::new()),
        }))
    }

    async fn get(&self, path: &ObjectPath) -> StorageResult<Bytes> {
        let full = self.resolve(path);
        let data = tokio::fs::read(&full)
            .await
            .map_err(|e| StorageError::from_io(path.as_str(), e))?;
        Ok(Bytes::from(data))
    }

    async fn get_stream(
        &self,
        path: &ObjectPath,
    ) -> StorageResult<BoxStream<'static, StorageResult<Bytes>>> {
        let full = self.resolve(path);
        let key = path.as_str().to_string();
        let file = tokio::fs::File::open(&full)
            .await
            .map_err(|e| StorageError::from_io(path.as_str(), e))?;
        let stream =
            ReaderStream::new(file).map(move |r| r.map_err(|e| StorageError::from_io(&key, e)));
        Ok(Box::pin(stream))
    }

    async fn stat(&self, path: &ObjectPath) -> StorageResult<StatResult> {
        let full = self.resolve(path);
        let metadata = tokio::fs::metadata(&full)
            .await
            .map_err(|e| StorageError::from_io(path.as_str(), e))?;

        // Creation time is not available on every platform; fall back to
        // the epoch default.
        Ok(StatResult {
            size: metadata.len(),
            created: metadata.created().unwrap_or(UNIX_EPOCH),
            last_modified: metadata.modified().unwrap_or(UNIX_EPOCH),
            ..Default::default()
        })
    }

    async fn list(&self, prefix: Option<&ObjectPath>) -> StorageResult<Vec<String>> {
        let start = match prefix {
            Some(p) => self.resolve(p),
            None => self.root.clone(),
        };
        match tokio::fs::metadata(&start).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Ok(Vec::new()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::from_io(&start.display().to_string(), e)),
        }

        let mut keys = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| StorageError::from_io(&dir.display().to_string(), e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::from_io(&dir.display().to_string(), e))?
            {
                let entry_path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::from_io(&entry_path.display().to_string(), e))?;
                if file_type.is_dir() {
                    pending.push(entry_path);
                    continue;
                }
                if let Ok(relative) = entry_path.strip_prefix(&self.root) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    async fn exists(&self, path: &ObjectPath) -> StorageResult<bool> {
        let full = self.resolve(path);
        match tokio::fs::metadata(&full).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::from_io(path.as_str(), e)),
        }
    }

    async fn delete(&self, path: &ObjectPath) -> StorageResult<()> {
        let full = self.resolve(path);
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io(path.as_str(), e)),
        }
    }

    async fn copy(&self, source: &ObjectPath, destination: &ObjectPath) -> StorageResult<()> {
        let from = self.resolve(source);
        let to = self.resolve(destination);
        self.create_parents(&to, destination.as_str()).await?;
        // Destination parents exist at this point, so a NotFound from the
        // copy means the source is absent; everything else failed on the
        // destination side.
        if let Err(e) = tokio::fs::copy(&from, &to).await {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(StorageError::from_io(source.as_str(), e));
            }
            return Err(StorageError::from_io(destination.as_str(), e));
        }
        Ok(())
    }
}

/// Writer that streams chunks directly into an open file handle.
struct FileWriter {
    key: String,
    destination: PathBuf,
    file: Option<tokio::fs::File>,
    expected_sha256: Option<String>,
    hasher: Option<Sha256>,
}

#[async_trait]
impl ObjectWriter for FileWriter {
    async fn write(&mut self, chunk: Bytes) -> StorageResult<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            StorageError::unknown(anyhow::anyhow!("write stream already closed"))
        })?;
        if let Some(hasher) = &mut self.hasher {
            hasher.update(&chunk);
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| StorageError::from_io(&self.key, e))
    }

    async fn finish(&mut self) -> StorageResult<()> {
        let mut file = self.file.take().ok_or_else(|| {
            StorageError::unknown(anyhow::anyhow!("write stream already closed"))
        })?;
        file.flush()
            .await
            .map_err(|e| StorageError::from_io(&self.key, e))?;
        drop(file);

        // The declared checksum is checked against the hash of the bytes
        // that went through this writer; a mismatched object is removed
        // before it can be observed under its final name.
        if let Some(expected) = self.expected_sha256.take() {
            let actual = match self.hasher.take() {
                Some(hasher) => format!("{:x}", hasher.finalize()),
                None => integrity::sha256_hex(b""),
            };
            if let Err(err) = integrity::verify(&self.key, &expected, &actual) {
                let _ = tokio::fs::remove_file(&self.destination).await;
                return Err(err);
            }
        }
        Ok(())
    }

    async fn abort(&mut self) -> StorageResult<()> {
        if self.file.take().is_some() {
            let _ = tokio::fs::remove_file(&self.destination).await;
        }
        Ok(())
    }
}
