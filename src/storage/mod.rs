//! Pluggable blob backends.
//!
//! A backend only moves bytes for identifiers it is handed; hashing,
//! deduplication, retries and timeouts live in
//! [`BlobStore`](crate::services::blob_store::BlobStore).

use crate::{config::AppConfig, hashing::ContentId};
use async_trait::async_trait;
use bytes::Bytes;
use clap::ValueEnum;
use std::{io, sync::Arc};
use thiserror::Error;

pub mod ipfs;
pub mod local;
pub mod memory;
pub mod object_store;

pub use ipfs::IpfsBackend;
pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use object_store::ObjectStoreBackend;

/// Which backend stores blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Sharded directory on local disk.
    Local,
    /// Process memory; contents vanish on exit.
    Memory,
    /// S3-compatible HTTP object store.
    ObjectStore,
    /// IPFS node reached through its HTTP RPC API.
    DistributedContentNetwork,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend rejected request: {0}")]
    Rejected(String),
    #[error("integrity check failed: expected `{expected}`, backend reported `{actual}`")]
    Integrity { expected: String, actual: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl BackendError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Unavailable(_) => true,
            BackendError::Rejected(_) | BackendError::Integrity { .. } => false,
            BackendError::Io(err) => !matches!(
                err.kind(),
                io::ErrorKind::PermissionDenied | io::ErrorKind::InvalidInput
            ),
            BackendError::Http(err) => !err.is_decode() && !err.is_builder(),
        }
    }
}

/// Classify a non-success HTTP status from a remote backend.
pub(crate) fn status_error(status: reqwest::StatusCode, body: &str) -> BackendError {
    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        BackendError::Unavailable(message)
    } else {
        BackendError::Rejected(message)
    }
}

/// Durable byte storage keyed by content identifier.
///
/// `write` must not make `id` visible to `read`/`contains` until every byte
/// is stored.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    fn kind(&self) -> StorageBackend;

    async fn write(&self, id: &ContentId, data: Bytes) -> Result<(), BackendError>;

    /// `Ok(None)` when the blob is absent.
    async fn read(&self, id: &ContentId) -> Result<Option<Bytes>, BackendError>;

    async fn contains(&self, id: &ContentId) -> Result<bool, BackendError>;

    /// Cheap round trip used by readiness checks.
    async fn check_ready(&self) -> Result<(), BackendError>;
}

/// Build the backend selected in configuration.
pub async fn open_backend(cfg: &AppConfig) -> Result<Arc<dyn BlobBackend>, BackendError> {
    let backend: Arc<dyn BlobBackend> = match cfg.storage_backend {
        StorageBackend::Local => Arc::new(LocalBackend::open(&cfg.storage_dir).await?),
        StorageBackend::Memory => Arc::new(MemoryBackend::new()),
        StorageBackend::ObjectStore => {
            let backend =
                ObjectStoreBackend::new(&cfg.object_store_endpoint, &cfg.object_store_bucket)?;
            if let Err(err) = backend.ensure_bucket().await {
                tracing::warn!(
                    bucket = %cfg.object_store_bucket,
                    error = %err,
                    "could not ensure object-store bucket exists"
                );
            }
            Arc::new(backend)
        }
        StorageBackend::DistributedContentNetwork => {
            Arc::new(IpfsBackend::new(&cfg.ipfs_api_url)?)
        }
    };
    tracing::info!(backend = ?backend.kind(), "blob backend ready");
    Ok(backend)
}
