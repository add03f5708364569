//! src/services/blob_store.rs
//!
//! BlobStore: the content-addressed front over a [`BlobBackend`].
//!
//! Writers are serialized per identifier, so concurrent puts of the same
//! bytes cause one physical write. Every backend call runs under a
//! size-scaled timeout and transient failures are retried with backoff.

use crate::{
    hashing::{Codec, ContentId},
    retry::RetryPolicy,
    storage::{BackendError, BlobBackend, StorageBackend},
};
use bytes::Bytes;
use dashmap::DashMap;
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("blob `{0}` not found")]
    NotFound(ContentId),
    #[error("blob `{0}` does not match its identifier")]
    Corrupt(ContentId),
    #[error("storage unavailable during {op} of `{id}` after {attempts} attempt(s): {reason}")]
    Unavailable {
        op: &'static str,
        id: ContentId,
        attempts: u8,
        reason: String,
    },
    #[error("storage backend failed during {op} of `{id}`: {source}")]
    Backend {
        op: &'static str,
        id: ContentId,
        #[source]
        source: BackendError,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Per-operation timeout: a fixed allowance plus a per-MiB allowance, so a
/// large upload is not held to the budget of a small metadata write.
///
/// Reads do not know their size up front and are budgeted for the largest
/// blob the gateway accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTimeouts {
    pub base: Duration,
    pub per_mib: Duration,
    pub max_blob_bytes: usize,
}

impl OperationTimeouts {
    pub fn for_len(&self, len: usize) -> Duration {
        let mib = (len as u64).div_ceil(MIB);
        self.base
            .saturating_add(self.per_mib.saturating_mul(mib.min(u32::MAX as u64) as u32))
    }

    pub fn for_read(&self) -> Duration {
        self.for_len(self.max_blob_bytes)
    }
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(10),
            per_mib: Duration::from_secs(2),
            max_blob_bytes: 64 * MIB as usize,
        }
    }
}

/// Result of storing a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    pub id: ContentId,
    pub size_bytes: u64,
    /// The blob was already present and nothing was written.
    pub already_existed: bool,
}

#[derive(Clone)]
pub struct BlobStore {
    backend: Arc<dyn BlobBackend>,
    /// Writer locks keyed by identifier; entries are dropped once idle.
    locks: Arc<DashMap<ContentId, Arc<Mutex<()>>>>,
    retry: RetryPolicy,
    timeouts: OperationTimeouts,
}

impl BlobStore {
    pub fn new(
        backend: Arc<dyn BlobBackend>,
        retry: RetryPolicy,
        timeouts: OperationTimeouts,
    ) -> Self {
        Self {
            backend,
            locks: Arc::new(DashMap::new()),
            retry,
            timeouts,
        }
    }

    pub fn backend_kind(&self) -> StorageBackend {
        self.backend.kind()
    }

    /// Store raw bytes. Writing bytes that are already present is a no-op.
    pub async fn put(&self, data: Bytes) -> StoreResult<PutOutcome> {
        self.put_encoded(Codec::Raw, data).await
    }

    /// Store bytes under an identifier with the given codec.
    pub async fn put_encoded(&self, codec: Codec, data: Bytes) -> StoreResult<PutOutcome> {
        let id = ContentId::of_codec(codec, &data);
        let size_bytes = data.len() as u64;

        let already_existed = {
            let slot = LockSlot::acquire(&self.locks, &id);
            let _guard = slot.lock.lock().await;
            self.write_once(&id, data).await?
        };
        Ok(PutOutcome {
            id,
            size_bytes,
            already_existed,
        })
    }

    /// Returns whether the blob already existed. Caller holds the id lock.
    async fn write_once(&self, id: &ContentId, data: Bytes) -> StoreResult<bool> {
        let len = data.len();
        if self
            .with_retry("exists", id, self.timeouts.base, || {
                self.backend.contains(id)
            })
            .await?
        {
            debug!(cid = %id, "blob already exists");
            return Ok(true);
        }

        self.with_retry("put", id, self.timeouts.for_len(len), || {
            self.backend.write(id, data.clone())
        })
        .await?;
        info!(cid = %id, size = len, backend = ?self.backend.kind(), "stored blob");
        Ok(false)
    }

    /// Fetch and verify a blob.
    pub async fn get(&self, id: &ContentId) -> StoreResult<Bytes> {
        let data = self
            .with_retry("get", id, self.timeouts.for_read(), || self.backend.read(id))
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if !id.verifies(&data) {
            warn!(cid = %id, size = data.len(), "blob failed integrity check");
            return Err(StoreError::Corrupt(id.clone()));
        }
        Ok(data)
    }

    pub async fn exists(&self, id: &ContentId) -> StoreResult<bool> {
        self.with_retry("exists", id, self.timeouts.base, || {
            self.backend.contains(id)
        })
        .await
    }

    /// Single backend round trip without retries, for readiness checks.
    pub async fn check_ready(&self) -> Result<(), BackendError> {
        match tokio::time::timeout(self.timeouts.base, self.backend.check_ready()).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Unavailable("readiness check timed out".into())),
        }
    }

    /// Run a backend call under the timeout, retrying transient failures.
    async fn with_retry<T, F, Fut>(
        &self,
        op: &'static str,
        id: &ContentId,
        timeout: Duration,
        mut call: F,
    ) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let err = match tokio::time::timeout(timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_) => BackendError::Unavailable(format!("{op} timed out after {timeout:?}")),
            };

            if !err.is_transient() {
                return Err(StoreError::Backend {
                    op,
                    id: id.clone(),
                    source: err,
                });
            }
            if attempt >= self.retry.max_attempts {
                warn!(cid = %id, op, attempts = attempt, error = %err, "retry budget exhausted");
                return Err(StoreError::Unavailable {
                    op,
                    id: id.clone(),
                    attempts: attempt,
                    reason: err.to_string(),
                });
            }

            let delay = self.retry.delay_after(attempt);
            warn!(
                cid = %id,
                op,
                attempt,
                max_attempts = self.retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient storage failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Membership in the per-identifier lock map. Dropping the slot, even when
/// the owning future is cancelled, removes the entry once nobody else holds
/// or waits on it.
struct LockSlot<'a> {
    locks: &'a DashMap<ContentId, Arc<Mutex<()>>>,
    id: &'a ContentId,
    lock: Arc<Mutex<()>>,
}

impl<'a> LockSlot<'a> {
    fn acquire(locks: &'a DashMap<ContentId, Arc<Mutex<()>>>, id: &'a ContentId) -> Self {
        let lock = locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Self { locks, id, lock }
    }
}

impl Drop for LockSlot<'_> {
    fn drop(&mut self) {
        // One reference is the map's, one is ours.
        self.locks
            .remove_if(self.id, |_, entry| Arc::strong_count(entry) <= 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, 1, 5)
    }

    fn store(backend: Arc<dyn BlobBackend>) -> BlobStore {
        BlobStore::new(backend, fast_retry(), OperationTimeouts::default())
    }

    /// Fails the first `failures` writes with a transient error.
    struct FlakyBackend {
        inner: MemoryBackend,
        failures: AtomicUsize,
        write_attempts: AtomicUsize,
    }

    impl FlakyBackend {
        fn new(failures: usize) -> Self {
            Self {
                inner: MemoryBackend::new(),
                failures: AtomicUsize::new(failures),
                write_attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BlobBackend for FlakyBackend {
        fn kind(&self) -> StorageBackend {
            StorageBackend::Memory
        }

        async fn write(&self, id: &ContentId, data: Bytes) -> Result<(), BackendError> {
            self.write_attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(BackendError::Unavailable("connection reset".into()));
            }
            self.inner.write(id, data).await
        }

        async fn read(&self, id: &ContentId) -> Result<Option<Bytes>, BackendError> {
            self.inner.read(id).await
        }

        async fn contains(&self, id: &ContentId) -> Result<bool, BackendError> {
            self.inner.contains(id).await
        }

        async fn check_ready(&self) -> Result<(), BackendError> {
            Ok(())
        }
    }

    /// Rejects every write permanently.
    struct RejectingBackend;

    #[async_trait]
    impl BlobBackend for RejectingBackend {
        fn kind(&self) -> StorageBackend {
            StorageBackend::ObjectStore
        }

        async fn write(&self, _: &ContentId, _: Bytes) -> Result<(), BackendError> {
            Err(BackendError::Rejected("403 Forbidden".into()))
        }

        async fn read(&self, _: &ContentId) -> Result<Option<Bytes>, BackendError> {
            Ok(None)
        }

        async fn contains(&self, _: &ContentId) -> Result<bool, BackendError> {
            Ok(false)
        }

        async fn check_ready(&self) -> Result<(), BackendError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn identical_puts_write_once() {
        let backend = MemoryBackend::new();
        let store = store(Arc::new(backend.clone()));

        let first = store.put(Bytes::from_static(b"same bytes")).await.unwrap();
        let second = store.put(Bytes::from_static(b"same bytes")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(!first.already_existed);
        assert!(second.already_existed);
        assert_eq!(backend.write_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_identical_puts_write_once() {
        let backend = MemoryBackend::new();
        let store = store(Arc::new(backend.clone()));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.put(Bytes::from_static(b"race")).await })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap().id);
        }

        assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(backend.write_count(), 1);
        assert!(store.locks.is_empty());
    }

    #[tokio::test]
    async fn get_missing_blob_is_not_found() {
        let store = store(Arc::new(MemoryBackend::new()));
        let id = ContentId::of(b"missing");
        assert!(matches!(store.get(&id).await, Err(StoreError::NotFound(_))));
        assert!(!store.exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn get_detects_corruption() {
        let backend = MemoryBackend::new();
        let store = store(Arc::new(backend.clone()));
        let outcome = store.put(Bytes::from_static(b"pristine")).await.unwrap();

        backend
            .overwrite(&outcome.id, Bytes::from_static(b"bit rot"))
            .await;

        assert!(matches!(
            store.get(&outcome.id).await,
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let backend = Arc::new(FlakyBackend::new(2));
        let store = store(backend.clone());

        let outcome = store.put(Bytes::from_static(b"eventually")).await.unwrap();

        assert_eq!(backend.write_attempts.load(Ordering::SeqCst), 3);
        assert_eq!(
            store.get(&outcome.id).await.unwrap(),
            Bytes::from_static(b"eventually")
        );
    }

    #[tokio::test]
    async fn exhausted_retries_surface_unavailable() {
        let backend = Arc::new(FlakyBackend::new(10));
        let store = store(backend.clone());

        let err = store.put(Bytes::from_static(b"never")).await.unwrap_err();

        assert!(matches!(err, StoreError::Unavailable { attempts: 3, .. }));
        assert_eq!(backend.write_attempts.load(Ordering::SeqCst), 3);
        assert!(!store.exists(&ContentId::of(b"never")).await.unwrap());
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let store = store(Arc::new(RejectingBackend));
        let err = store.put(Bytes::from_static(b"denied")).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend { op: "put", .. }));
    }

    #[test]
    fn timeouts_scale_with_payload() {
        let timeouts = OperationTimeouts {
            base: Duration::from_secs(5),
            per_mib: Duration::from_secs(1),
            max_blob_bytes: 4 * MIB as usize,
        };
        assert_eq!(timeouts.for_len(0), Duration::from_secs(5));
        assert_eq!(timeouts.for_len(1), Duration::from_secs(6));
        assert_eq!(timeouts.for_len(3 * MIB as usize), Duration::from_secs(8));
        assert_eq!(timeouts.for_read(), Duration::from_secs(9));
    }

    /// Never finishes a write.
    struct StalledBackend;

    #[async_trait]
    impl BlobBackend for StalledBackend {
        fn kind(&self) -> StorageBackend {
            StorageBackend::Memory
        }

        async fn write(&self, _: &ContentId, _: Bytes) -> Result<(), BackendError> {
            std::future::pending().await
        }

        async fn read(&self, _: &ContentId) -> Result<Option<Bytes>, BackendError> {
            Ok(None)
        }

        async fn contains(&self, _: &ContentId) -> Result<bool, BackendError> {
            Ok(false)
        }

        async fn check_ready(&self) -> Result<(), BackendError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn cancelled_put_releases_its_lock_entry() {
        let store = store(Arc::new(StalledBackend));

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            store.put(Bytes::from_static(b"abandoned")),
        )
        .await;

        assert!(cancelled.is_err());
        assert!(store.locks.is_empty());
    }

    /// Serves reads from memory after a fixed delay.
    struct SlowReadBackend {
        inner: MemoryBackend,
        delay: Duration,
    }

    #[async_trait]
    impl BlobBackend for SlowReadBackend {
        fn kind(&self) -> StorageBackend {
            StorageBackend::Memory
        }

        async fn write(&self, id: &ContentId, data: Bytes) -> Result<(), BackendError> {
            self.inner.write(id, data).await
        }

        async fn read(&self, id: &ContentId) -> Result<Option<Bytes>, BackendError> {
            tokio::time::sleep(self.delay).await;
            self.inner.read(id).await
        }

        async fn contains(&self, id: &ContentId) -> Result<bool, BackendError> {
            self.inner.contains(id).await
        }

        async fn check_ready(&self) -> Result<(), BackendError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn reads_are_budgeted_for_the_largest_blob() {
        let backend = Arc::new(SlowReadBackend {
            inner: MemoryBackend::new(),
            delay: Duration::from_millis(60),
        });
        // 20 ms base alone would time out every attempt; 20 + 4 * 40 ms does not.
        let store = BlobStore::new(
            backend,
            RetryPolicy::new(1, 1, 1),
            OperationTimeouts {
                base: Duration::from_millis(20),
                per_mib: Duration::from_millis(40),
                max_blob_bytes: 4 * MIB as usize,
            },
        );

        let outcome = store.put(Bytes::from_static(b"large-ish")).await.unwrap();
        let bytes = store.get(&outcome.id).await.unwrap();
        assert_eq!(&bytes[..], b"large-ish");
    }
}
