//! S3-compatible driver.
//!
//! Targets Amazon S3 and S3-compatible services (MinIO, Ceph RGW) through
//! the AWS SDK. Streaming writes go through the multipart upload protocol;
//! everything else maps one-to-one onto SDK calls.

use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::Region,
    error::{ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client as S3Client,
};
use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt};
use sha2::{Digest, Sha256};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::{
    config::ConnectionConfig,
    driver::{ObjectWriter, StorageDriver},
    error::{StorageError, StorageResult},
    integrity,
    metadata::{PutOptions, StatResult},
    multipart::{MultipartBackend, MultipartUpload, PartRecord},
    path::ObjectPath,
};

/// Driver for S3-compatible object stores.
pub struct S3Driver {
    client: S3Client,
    bucket: String,
}

impl S3Driver {
    /// Build a client from the connection config.
    ///
    /// Recognized parameters: `region`, `endpoint` (for non-AWS services),
    /// `forcePathStyle` (required by most self-hosted services),
    /// `useAccelerateEndpoint`, and `disableMultiregionAccessPoints`.
    /// Anything else is accepted and ignored.
    pub async fn connect(config: &ConnectionConfig) -> StorageResult<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = config.parameter("region") {
            loader = loader.region(Region::new(region.to_string()));
        }
        if let Some(endpoint) = config.parameter("endpoint") {
            loader = loader.endpoint_url(endpoint.to_string());
        }
        if let Some(credentials) = &config.credentials {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                credentials.principal.clone(),
                credentials.secret.clone(),
                None,
                None,
                "stowage",
            ));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if config.parameter_flag("forcePathStyle") {
            builder = builder.force_path_style(true);
        }
        if config.parameter_flag("useAccelerateEndpoint") {
            builder = builder.accelerate(true);
        }
        if config.parameter_flag("disableMultiregionAccessPoints") {
            builder = builder.disable_multi_region_access_points(true);
        }
        let client = S3Client::from_conf(builder.build());

        for key in config.parameters.keys() {
            if !matches!(
                key.as_str(),
                "region" |
                    "endpoint" |
                    "forcePathStyle" |
                    "useAccelerateEndpoint" |
                    "disableMultiregionAccessPoints"
            ) {
                debug!(parameter = %key, "Ignoring connection parameter");
            }
        }
        debug!(bucket = %config.bucket_or_root, "Created S3 driver");
        Ok(Self {
            client,
            bucket: config.bucket_or_root.clone(),
        })
    }
}

#[async_trait]
impl StorageDriver for S3Driver {
    async fn put(
        &self,
        path: &ObjectPath,
        content: Bytes,
        options: &PutOptions,
    ) -> StorageResult<()> {
        // The hash is checked before any bytes leave the process; a
        // mismatched object is never uploaded at all.
        if let Some(expected) = &options.checksum_sha256 {
            let actual = integrity::sha256_hex(&content);
            integrity::verify(path.as_str(), expected, &actual)?;
        }

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path.as_str())
            .set_cache_control(options.cache_control.clone())
            .set_content_disposition(options.content_disposition.clone())
            .set_content_encoding(options.content_encoding.clone())
            .set_content_language(options.content_language.clone())
            .set_content_type(options.content_type.clone())
            .set_metadata(options.normalized_metadata())
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| translate_sdk_error(path.as_str(), e))?;
        Ok(())
    }

    async fn put_stream(
        &self,
        path: &ObjectPath,
        options: &PutOptions,
    ) -> StorageResult<Box<dyn ObjectWriter>> {
        let backend = S3MultipartBackend {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: path.as_str().to_string(),
            options: options.clone(),
        };
        Ok(Box::new(S3Writer {
            key: path.as_str().to_string(),
            expected_sha256: options.checksum_sha256.clone(),
            hasher: options.checksum_sha256.as_ref().map(|_| Sha256::new()),
            upload: MultipartUpload::new(backend),
        }))
    }

    async fn get(&self, path: &ObjectPath) -> StorageResult<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path.as_str())
            .send()
            .await
            .map_err(|e| translate_sdk_error(path.as_str(), e))?;
        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::unknown(anyhow::anyhow!("S3 body read failed: {}", e)))?;
        Ok(body.into_bytes())
    }

    async fn get_stream(
        &self,
        path: &ObjectPath,
    ) -> StorageResult<BoxStream<'static, StorageResult<Bytes>>> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path.as_str())
            .send()
            .await
            .map_err(|e| translate_sdk_error(path.as_str(), e))?;
        let reader = resp.body.into_async_read();
        let stream = ReaderStream::new(reader)
            .map(|r| r.map_err(|e| StorageError::unknown(anyhow::anyhow!("S3 read error: {}", e))));
        Ok(Box::pin(stream))
    }

    async fn stat(&self, path: &ObjectPath) -> StorageResult<StatResult> {
        let resp = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(path.as_str())
            .send()
            .await
            .map_err(|e| translate_sdk_error(path.as_str(), e))?;

        // S3 does not report creation time separately from modification;
        // `created` stays at its epoch default.
        Ok(StatResult {
            size: u64::try_from(resp.content_length().unwrap_or(0)).unwrap_or(0),
            last_modified: resp
                .last_modified()
                .map(|t| {
                    let secs = t.secs();
                    if secs >= 0 {
                        UNIX_EPOCH + Duration::new(secs as u64, t.subsec_nanos())
                    } else {
                        UNIX_EPOCH
                    }
                })
                .unwrap_or(UNIX_EPOCH),
            // Passed through as reported: S3 encodes this as base64 of the
            // raw digest, not hex.
            checksum_sha256: resp.checksum_sha256().map(str::to_string),
            etag: resp.e_tag().map(str::to_string),
            content_type: resp.content_type().map(str::to_string),
            content_encoding: resp.content_encoding().map(str::to_string),
            content_language: resp.content_language().map(str::to_string),
            content_disposition: resp.content_disposition().map(str::to_string),
            cache_control: resp.cache_control().map(str::to_string),
            metadata: resp.metadata().cloned().filter(|m| !m.is_empty()),
            ..Default::default()
        })
    }

    async fn list(&self, prefix: Option<&ObjectPath>) -> StorageResult<Vec<String>> {
        let mut req = self.client.list_objects_v2().bucket(&self.bucket);
        if let Some(prefix) = prefix {
            req = req.prefix(format!("{}/", prefix.as_str()));
        }

        let mut keys = Vec::new();
        let mut pages = req.into_paginator().send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                translate_sdk_error(prefix.map(ObjectPath::as_str).unwrap_or(""), e)
            })?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }
        }
        Ok(keys)
    }

    async fn exists(&self, path: &ObjectPath) -> StorageResult<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(path.as_str())
            .send()
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = translate_sdk_error(path.as_str(), e);
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn delete(&self, path: &ObjectPath) -> StorageResult<()> {
        // DeleteObject succeeds for absent keys, matching the idempotency
        // contract without an extra existence check.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path.as_str())
            .send()
            .await
            .map_err(|e| translate_sdk_error(path.as_str(), e))?;
        Ok(())
    }

    async fn copy(&self, source: &ObjectPath, destination: &ObjectPath) -> StorageResult<()> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, source.as_str()))
            .key(destination.as_str())
            .send()
            .await
            .map_err(|e| translate_sdk_error(source.as_str(), e))?;
        Ok(())
    }
}

/// Multipart protocol adapter for one S3 key.
struct S3MultipartBackend {
    client: S3Client,
    bucket: String,
    key: String,
    options: PutOptions,
}

#[async_trait]
impl MultipartBackend for S3MultipartBackend {
    async fn create_session(&self) -> StorageResult<String> {
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .set_cache_control(self.options.cache_control.clone())
            .set_content_disposition(self.options.content_disposition.clone())
            .set_content_encoding(self.options.content_encoding.clone())
            .set_content_language(self.options.content_language.clone())
            .set_content_type(self.options.content_type.clone())
            .set_metadata(self.options.normalized_metadata())
            .send()
            .await
            .map_err(|e| translate_sdk_error(&self.key, e))?;
        resp.upload_id()
            .map(str::to_string)
            .ok_or_else(|| {
                StorageError::unknown(anyhow::anyhow!(
                    "no upload id in create_multipart_upload response"
                ))
            })
    }

    async fn upload_part(
        &self,
        session_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<String> {
        let resp = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(session_id)
            .part_number(part_number as i32)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| translate_sdk_error(&self.key, e))?;
        Ok(resp.e_tag().unwrap_or_default().to_string())
    }

    async fn complete(&self, session_id: &str, parts: &[PartRecord]) -> StorageResult<()> {
        let completed_parts: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .e_tag(&p.tag)
                    .part_number(p.part_number as i32)
                    .build()
            })
            .collect();
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(session_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| translate_sdk_error(&self.key, e))?;
        debug!(bucket = %self.bucket, key = %self.key, "Completed multipart upload");
        Ok(())
    }

    async fn abort(&self, session_id: &str) -> StorageResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(session_id)
            .send()
            .await
            .map_err(|e| translate_sdk_error(&self.key, e))?;
        debug!(bucket = %self.bucket, key = %self.key, "Aborted multipart upload");
        Ok(())
    }
}

/// Streaming writer backed by a multipart upload session.
struct S3Writer {
    key: String,
    expected_sha256: Option<String>,
    hasher: Option<Sha256>,
    upload: MultipartUpload<S3MultipartBackend>,
}

#[async_trait]
impl ObjectWriter for S3Writer {
    async fn write(&mut self, chunk: Bytes) -> StorageResult<()> {
        if let Some(hasher) = &mut self.hasher {
            hasher.update(&chunk);
        }
        self.upload.write(&chunk).await
    }

    async fn finish(&mut self) -> StorageResult<()> {
        // Verify before completion so a mismatched object never becomes
        // visible; the open session is torn down on mismatch.
        if let Some(expected) = self.expected_sha256.take() {
            let actual = match self.hasher.take() {
                Some(hasher) => format!("{:x}", hasher.finalize()),
                None => integrity::sha256_hex(b""),
            };
            if let Err(err) = integrity::verify(&self.key, &expected, &actual) {
                let _ = self.upload.abort().await;
                return Err(err);
            }
        }
        self.upload.finish().await
    }

    async fn abort(&mut self) -> StorageResult<()> {
        self.upload.abort().await
    }
}

/// Map SDK errors onto the shared taxonomy.
///
/// HTTP status is checked first, then the service error code; anything
/// unrecognized stays `Unknown` with the original error chained.
fn translate_sdk_error<E>(path: &str, err: SdkError<E>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = match &err {
        SdkError::ServiceError(ctx) => Some(ctx.raw().status().as_u16()),
        _ => None,
    };
    if let Some(classified) = classify_remote_error(path, status, err.code()) {
        return classified;
    }
    StorageError::Unknown {
        source: anyhow::Error::new(err).context(format!("S3 operation on '{}' failed", path)),
    }
}

/// Classify a remote failure by HTTP status and service error code.
fn classify_remote_error(
    path: &str,
    status: Option<u16>,
    code: Option<&str>,
) -> Option<StorageError> {
    match status {
        Some(404) => {
            return Some(StorageError::NotFound {
                path: path.to_string(),
            })
        }
        Some(401) | Some(403) => {
            return Some(StorageError::PermissionDenied {
                path: path.to_string(),
            })
        }
        _ => {}
    }
    match code {
        Some("NoSuchKey") | Some("NotFound") | Some("NoSuchBucket") => {
            Some(StorageError::NotFound {
                path: path.to_string(),
            })
        }
        Some("AccessDenied") | Some("InvalidAccessKeyId") | Some("SignatureDoesNotMatch") => {
            Some(StorageError::PermissionDenied {
                path: path.to_string(),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;

    #[tokio::test]
    async fn connect_accepts_full_parameter_set() {
        let config = ConnectionConfig::s3_compatible("snapshots")
            .with_credentials("AKID", "SECRET")
            .with_parameter("region", "eu-west-1")
            .with_parameter("endpoint", "http://localhost:9000")
            .with_parameter("forcePathStyle", "true")
            .with_parameter("useAccelerateEndpoint", "true")
            .with_parameter("disableMultiregionAccessPoints", "true")
            .with_parameter("someFutureKnob", "whatever");

        let driver = S3Driver::connect(&config).await.unwrap();
        assert_eq!(driver.bucket, "snapshots");
    }

    #[test]
    fn status_404_maps_to_not_found() {
        let err = classify_remote_error("a/b", Some(404), None).unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn auth_statuses_map_to_permission_denied() {
        for status in [401, 403] {
            let err = classify_remote_error("a/b", Some(status), None).unwrap();
            assert!(matches!(err, StorageError::PermissionDenied { .. }));
        }
    }

    #[test]
    fn service_codes_map_without_status() {
        assert!(classify_remote_error("k", None, Some("NoSuchKey"))
            .unwrap()
            .is_not_found());
        assert!(matches!(
            classify_remote_error("k", None, Some("AccessDenied")).unwrap(),
            StorageError::PermissionDenied { .. }
        ));
        assert!(matches!(
            classify_remote_error("k", None, Some("SignatureDoesNotMatch")).unwrap(),
            StorageError::PermissionDenied { .. }
        ));
    }

    #[test]
    fn unrecognized_failures_stay_unclassified() {
        assert!(classify_remote_error("k", Some(500), None).is_none());
        assert!(classify_remote_error("k", None, Some("SlowDown")).is_none());
        assert!(classify_remote_error("k", None, None).is_none());
    }
}
