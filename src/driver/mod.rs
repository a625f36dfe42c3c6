//! Storage driver contract shared across backends.

pub mod filesystem;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::{
    error::StorageResult,
    metadata::{PutOptions, StatResult},
    path::ObjectPath,
};

/// Sequential-write handle returned by [`StorageDriver::put_stream`].
///
/// Chunks are accepted in caller order; the object becomes durable only
/// after `finish` succeeds. A handle that is dropped without `finish` or
/// `abort` leaves whatever partial state the backend's lifecycle policy
/// allows — callers that care should abort explicitly.
#[async_trait]
pub trait ObjectWriter: Send {
    /// Append a chunk of any size to the logical byte stream.
    async fn write(&mut self, chunk: Bytes) -> StorageResult<()>;

    /// Finalize the stream, making the object durable.
    async fn finish(&mut self) -> StorageResult<()>;

    /// Cancel the stream, discarding partial data where the backend
    /// supports it.
    async fn abort(&mut self) -> StorageResult<()>;
}

/// Core storage operations.
///
/// Every driver implements the identical operation set with identical
/// externally observed semantics, differing only in backend mechanics.
/// All failures are reported through the shared error taxonomy.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Full-content single-shot write.
    ///
    /// When `options.checksum_sha256` is set, the persisted content is
    /// verified against it and a mismatch fails with `IntegrityMismatch`
    /// without leaving the object visible.
    async fn put(&self, path: &ObjectPath, content: Bytes, options: &PutOptions)
        -> StorageResult<()>;

    /// Open a sequential-write handle for streaming uploads.
    async fn put_stream(
        &self,
        path: &ObjectPath,
        options: &PutOptions,
    ) -> StorageResult<Box<dyn ObjectWriter>>;

    /// Read full content into memory.
    ///
    /// Fails `NotFound` if the path is absent.
    async fn get(&self, path: &ObjectPath) -> StorageResult<Bytes>;

    /// Open a sequential-read stream.
    ///
    /// May fail `Unimplemented` on backends without streaming reads;
    /// callers must be prepared for that kind on every driver.
    async fn get_stream(
        &self,
        path: &ObjectPath,
    ) -> StorageResult<BoxStream<'static, StorageResult<Bytes>>>;

    /// Metadata for a blob. Fails `NotFound` if absent.
    async fn stat(&self, path: &ObjectPath) -> StorageResult<StatResult>;

    /// All keys under the given prefix (full recursive descent), in no
    /// particular order. An empty prefix yields an empty vec, not an
    /// error.
    async fn list(&self, prefix: Option<&ObjectPath>) -> StorageResult<Vec<String>>;

    /// Whether a blob exists. Absence is `Ok(false)`; only infrastructure
    /// failures propagate as errors.
    async fn exists(&self, path: &ObjectPath) -> StorageResult<bool>;

    /// Delete a blob. Idempotent: deleting an absent path succeeds.
    async fn delete(&self, path: &ObjectPath) -> StorageResult<()>;

    /// Copy a blob. Fails `NotFound` if the source is absent.
    async fn copy(&self, source: &ObjectPath, destination: &ObjectPath) -> StorageResult<()>;

    /// Move a blob: copy followed by delete of the source. Not atomic
    /// across the two steps — a failure in between leaves both copies
    /// present.
    async fn move_object(&self, source: &ObjectPath, destination: &ObjectPath)
        -> StorageResult<()> {
        self.copy(source, destination).await?;
        self.delete(source).await
    }
}
