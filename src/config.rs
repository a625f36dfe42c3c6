//! Storage connection configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Backend provider selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    /// Local filesystem rooted at a directory.
    Filesystem,

    /// Amazon S3 or any S3-compatible service (MinIO, Ceph RGW, ...).
    S3Compatible,

    /// Google Cloud Storage. Recognized but not yet wired to a driver.
    Gcs,

    /// Azure Blob Storage. Recognized but not yet wired to a driver.
    AzureBlob,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Filesystem => "filesystem",
            Provider::S3Compatible => "s3-compatible",
            Provider::Gcs => "gcs",
            Provider::AzureBlob => "azure-blob",
        }
    }
}

/// Principal/secret credential pair.
///
/// For S3-compatible services these are the access key id and secret
/// access key. Omit to fall back to the ambient credential chain
/// (environment, instance profile).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub principal: String,
    pub secret: String,
}

/// Everything needed to connect to one storage backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Which backend to connect to.
    pub provider: Provider,

    /// Bucket name for object stores, root directory for the filesystem.
    pub bucket_or_root: String,

    /// Static credentials, when not using the ambient chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,

    /// Provider-specific tuning parameters. Recognized keys for
    /// S3-compatible backends: `region`, `endpoint`, `forcePathStyle`,
    /// `useAccelerateEndpoint`, `disableMultiregionAccessPoints`.
    /// Unrecognized keys are accepted and ignored.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Config for a filesystem backend rooted at `root`.
    pub fn filesystem(root: impl Into<String>) -> Self {
        Self {
            provider: Provider::Filesystem,
            bucket_or_root: root.into(),
            credentials: None,
            parameters: HashMap::new(),
        }
    }

    /// Config for an S3-compatible backend targeting `bucket`.
    pub fn s3_compatible(bucket: impl Into<String>) -> Self {
        Self {
            provider: Provider::S3Compatible,
            bucket_or_root: bucket.into(),
            credentials: None,
            parameters: HashMap::new(),
        }
    }

    pub fn with_credentials(mut self, principal: impl Into<String>, secret: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            principal: principal.into(),
            secret: secret.into(),
        });
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Look up a tuning parameter.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Whether a boolean-valued parameter is set to true.
    pub fn parameter_flag(&self, key: &str) -> bool {
        matches!(self.parameter(key), Some("true") | Some("1"))
    }
}
