//! Multipart upload coordination.
//!
//! Turns an open-ended sequence of written chunks into ordered, sized parts
//! against a backend's multipart protocol, without buffering the whole
//! object in memory. The coordinator owns the upload session for the
//! lifetime of one write stream: it opens the session on the first flushed
//! part, assigns strictly increasing part numbers starting at 1, and
//! finalizes with a single completion call.
//!
//! On a part failure the coordinator fails fast: no further parts are
//! submitted and completion is never attempted. It does not auto-abort the
//! session; cleanup is left to the caller or the backend's lifecycle
//! policy.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Part size for multipart uploads (8 MiB).
///
/// S3 requires a minimum of 5 MiB per part (except the last); 8 MiB keeps
/// per-part memory bounded while staying comfortably above that floor.
pub const PART_SIZE: usize = 8 * 1024 * 1024;

/// A part acknowledged by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRecord {
    /// 1-based sequence number, strictly increasing, no gaps.
    pub part_number: u32,

    /// Backend-assigned tag (ETag for S3).
    pub tag: String,

    /// Part size in bytes.
    pub size: u64,
}

/// Backend half of the multipart protocol.
///
/// Implementations carry the target path and write options; the coordinator
/// only threads the session id through.
#[async_trait]
pub trait MultipartBackend: Send + Sync {
    /// Open an upload session, returning its backend-issued id.
    async fn create_session(&self) -> StorageResult<String>;

    /// Submit one part. Returns the backend-assigned part tag.
    async fn upload_part(
        &self,
        session_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<String>;

    /// Atomically assemble all submitted parts into one durable object.
    async fn complete(&self, session_id: &str, parts: &[PartRecord]) -> StorageResult<()>;

    /// Cancel the session and discard submitted parts.
    async fn abort(&self, session_id: &str) -> StorageResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Committed,
    Aborted,
    Failed,
}

/// Coordinator for one multipart write stream.
pub struct MultipartUpload<B: MultipartBackend> {
    backend: B,
    part_size: usize,
    buffer: BytesMut,
    session_id: Option<String>,
    parts: Vec<PartRecord>,
    next_part_number: u32,
    state: SessionState,
}

impl<B: MultipartBackend> MultipartUpload<B> {
    pub fn new(backend: B) -> Self {
        Self::with_part_size(backend, PART_SIZE)
    }

    pub fn with_part_size(backend: B, part_size: usize) -> Self {
        assert!(part_size > 0, "part size must be non-zero");
        Self {
            backend,
            part_size,
            buffer: BytesMut::new(),
            session_id: None,
            parts: Vec::new(),
            next_part_number: 1,
            state: SessionState::Open,
        }
    }

    /// Append a chunk to the logical byte stream.
    ///
    /// Chunks of any size are accepted in caller order; full parts are
    /// submitted as they accumulate.
    pub async fn write(&mut self, chunk: &[u8]) -> StorageResult<()> {
        self.check_open("write")?;
        self.buffer.extend_from_slice(chunk);
        while self.buffer.len() >= self.part_size {
            let part = self.buffer.split_to(self.part_size).freeze();
            self.submit_part(part).await?;
        }
        Ok(())
    }

    /// Finalize the stream: flush the remainder and complete the session.
    ///
    /// A zero-byte stream still produces a valid empty object — one empty
    /// part is submitted so the backend has something to assemble.
    pub async fn finish(&mut self) -> StorageResult<()> {
        self.check_open("finish")?;

        if !self.buffer.is_empty() || self.parts.is_empty() {
            let part = self.buffer.split().freeze();
            self.submit_part(part).await?;
        }

        // Part submission above guarantees an open session.
        let session_id = match self.session_id.as_deref() {
            Some(id) => id.to_string(),
            None => {
                self.state = SessionState::Failed;
                return Err(StorageError::unknown(anyhow::anyhow!(
                    "multipart session missing at completion"
                )));
            }
        };
        let result = self.backend.complete(&session_id, &self.parts).await;
        if let Err(err) = result {
            self.state = SessionState::Failed;
            return Err(err);
        }

        self.state = SessionState::Committed;
        debug!(
            session_id = %session_id,
            parts = self.parts.len(),
            "Completed multipart upload"
        );
        Ok(())
    }

    /// Cancel the stream, discarding any submitted parts.
    pub async fn abort(&mut self) -> StorageResult<()> {
        if self.state == SessionState::Committed {
            return Err(StorageError::unknown(anyhow::anyhow!(
                "multipart upload already committed"
            )));
        }
        if let Some(session_id) = self.session_id.take() {
            self.backend.abort(&session_id).await?;
            debug!(session_id = %session_id, "Aborted multipart upload");
        }
        self.state = SessionState::Aborted;
        Ok(())
    }

    /// Parts acknowledged so far.
    pub fn parts(&self) -> &[PartRecord] {
        &self.parts
    }

    fn check_open(&self, operation: &str) -> StorageResult<()> {
        match self.state {
            SessionState::Open => Ok(()),
            state => Err(StorageError::unknown(anyhow::anyhow!(
                "multipart upload is {:?}, cannot {}",
                state,
                operation
            ))),
        }
    }

    async fn submit_part(&mut self, data: Bytes) -> StorageResult<()> {
        if self.session_id.is_none() {
            let result = self.backend.create_session().await;
            match result {
                Ok(id) => {
                    debug!(session_id = %id, "Opened multipart upload session");
                    self.session_id = Some(id);
                }
                Err(err) => {
                    self.state = SessionState::Failed;
                    return Err(err);
                }
            }
        }

        let part_number = self.next_part_number;
        let size = data.len() as u64;
        let session_id = self.session_id.as_deref().unwrap_or_default().to_string();
        let result = self.backend.upload_part(&session_id, part_number, data).await;
        let tag = match result {
            Ok(tag) => tag,
            Err(err) => {
                self.state = SessionState::Failed;
                return Err(err);
            }
        };

        self.parts.push(PartRecord {
            part_number,
            tag,
            size,
        });
        self.next_part_number += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    };

    use super::*;

    #[derive(Default)]
    struct MockBackend {
        parts: Mutex<Vec<(u32, Vec<u8>)>>,
        completed: Mutex<Option<Vec<PartRecord>>>,
        aborted: Mutex<bool>,
        fail_part: Option<u32>,
        sessions: AtomicU32,
    }

    impl MockBackend {
        fn failing_at(part_number: u32) -> Self {
            Self {
                fail_part: Some(part_number),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl MultipartBackend for &MockBackend {
        async fn create_session(&self) -> StorageResult<String> {
            let n = self.sessions.fetch_add(1, Ordering::SeqCst);
            Ok(format!("session-{}", n))
        }

        async fn upload_part(
            &self,
            _session_id: &str,
            part_number: u32,
            data: Bytes,
        ) -> StorageResult<String> {
            if self.fail_part == Some(part_number) {
                return Err(StorageError::unknown(anyhow::anyhow!(
                    "injected part failure"
                )));
            }
            self.parts.lock().unwrap().push((part_number, data.to_vec()));
            Ok(format!("tag-{}", part_number))
        }

        async fn complete(&self, _session_id: &str, parts: &[PartRecord]) -> StorageResult<()> {
            *self.completed.lock().unwrap() = Some(parts.to_vec());
            Ok(())
        }

        async fn abort(&self, _session_id: &str) -> StorageResult<()> {
            *self.aborted.lock().unwrap() = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn chunks_are_split_into_sized_parts() {
        let backend = MockBackend::default();
        let mut upload = MultipartUpload::with_part_size(&backend, 4);

        upload.write(b"abcdef").await.unwrap();
        upload.write(b"ghij").await.unwrap();
        upload.finish().await.unwrap();

        let parts = backend.parts.lock().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], (1, b"abcd".to_vec()));
        assert_eq!(parts[1], (2, b"efgh".to_vec()));
        assert_eq!(parts[2], (3, b"ij".to_vec()));
    }

    #[tokio::test]
    async fn part_numbers_are_gap_free_from_one() {
        let backend = MockBackend::default();
        let mut upload = MultipartUpload::with_part_size(&backend, 2);

        upload.write(&[0u8; 9]).await.unwrap();
        upload.finish().await.unwrap();

        let completed = backend.completed.lock().unwrap();
        let numbers: Vec<u32> = completed
            .as_ref()
            .unwrap()
            .iter()
            .map(|p| p.part_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn session_opens_lazily_on_first_part() {
        let backend = MockBackend::default();
        let mut upload = MultipartUpload::with_part_size(&backend, 4);

        upload.write(b"ab").await.unwrap();
        assert_eq!(backend.sessions.load(Ordering::SeqCst), 0);

        upload.write(b"cdef").await.unwrap();
        assert_eq!(backend.sessions.load(Ordering::SeqCst), 1);
        upload.finish().await.unwrap();
        assert_eq!(backend.sessions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_byte_stream_produces_one_empty_part() {
        let backend = MockBackend::default();
        let mut upload = MultipartUpload::with_part_size(&backend, 4);

        upload.finish().await.unwrap();

        let parts = backend.parts.lock().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0], (1, Vec::new()));
        assert!(backend.completed.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn part_failure_fails_fast() {
        let backend = MockBackend::failing_at(2);
        let mut upload = MultipartUpload::with_part_size(&backend, 2);

        let err = upload.write(&[0u8; 8]).await.unwrap_err();
        assert!(matches!(err, StorageError::Unknown { .. }));

        // Only part 1 made it; no completion was attempted and later writes
        // are refused.
        assert_eq!(backend.parts.lock().unwrap().len(), 1);
        assert!(backend.completed.lock().unwrap().is_none());
        assert!(upload.write(b"x").await.is_err());
        assert!(upload.finish().await.is_err());
        assert!(!*backend.aborted.lock().unwrap());
    }

    #[tokio::test]
    async fn abort_discards_open_session() {
        let backend = MockBackend::default();
        let mut upload = MultipartUpload::with_part_size(&backend, 2);

        upload.write(&[1u8; 4]).await.unwrap();
        upload.abort().await.unwrap();

        assert!(*backend.aborted.lock().unwrap());
        assert!(upload.write(b"x").await.is_err());
    }

    #[tokio::test]
    async fn abort_before_any_write_is_a_noop() {
        let backend = MockBackend::default();
        let mut upload = MultipartUpload::with_part_size(&backend, 2);

        upload.abort().await.unwrap();
        assert!(!*backend.aborted.lock().unwrap());
    }

    #[tokio::test]
    async fn part_records_track_sizes_and_tags() {
        let backend = MockBackend::default();
        let mut upload = MultipartUpload::with_part_size(&backend, 3);

        upload.write(b"abcde").await.unwrap();
        upload.finish().await.unwrap();

        assert_eq!(
            upload.parts(),
            &[
                PartRecord {
                    part_number: 1,
                    tag: "tag-1".to_string(),
                    size: 3,
                },
                PartRecord {
                    part_number: 2,
                    tag: "tag-2".to_string(),
                    size: 2,
                },
            ]
        );
    }
}
