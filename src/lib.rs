//! Provider-agnostic blob storage.
//!
//! One operation set — put, get, streaming variants, list, stat, copy,
//! move, delete, exists — with identical observable semantics across
//! backends. Drivers exist for the local filesystem and S3-compatible
//! object stores; backend-native failures are translated into a single
//! error taxonomy before they reach callers.
//!
//! ```no_run
//! use stowage::{ConnectionConfig, PutOptions, Storage};
//!
//! # async fn example() -> stowage::StorageResult<()> {
//! let storage = Storage::connect(&ConnectionConfig::filesystem("/var/blobs")).await?;
//! storage
//!     .put("reports/2026/q3.json", &b"{}"[..], &PutOptions::default())
//!     .await?;
//! let content = storage.get("reports/2026/q3.json").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod integrity;
pub mod metadata;
pub mod multipart;
pub mod path;
pub mod storage;

pub use config::{ConnectionConfig, Credentials, Provider};
pub use driver::{ObjectWriter, StorageDriver};
pub use error::{StorageError, StorageResult};
pub use metadata::{PutOptions, StatResult};
pub use multipart::{MultipartBackend, MultipartUpload, PartRecord};
pub use path::ObjectPath;
pub use storage::Storage;
