//! src/services/entity_service.rs
//!
//! EntityService: entity upload and metadata lookup.
//!
//! An upload walks `Validating -> UploadingContent/UploadingPreview ->
//! AssemblingMetadata -> UploadingMetadata -> Grouping -> Done`. Content and
//! preview are written concurrently and joined before assembly. Storage
//! retries happen inside [`BlobStore`]; a failed upload leaves only
//! content-addressed blobs behind and never a registry row, so no partial
//! entity is ever resolvable.

use crate::{
    errors::{ErrorKind, GatewayError},
    hashing::{Codec, ContentId},
    models::{
        entity::EntityRecord,
        metadata::NftMetadata,
        upload::{MetadataReference, MetadataView, Slot, UploadRequest, UploadResult},
    },
    services::{
        assembler,
        blob_store::BlobStore,
        gateway::GatewayResolver,
        grouper,
        registry::{EntityRegistry, NewEntity},
    },
};
use bytes::Bytes;
use futures::TryFutureExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Progress of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Validating,
    UploadingContent,
    UploadingPreview,
    AssemblingMetadata,
    UploadingMetadata,
    Grouping,
    Done,
    Failed(ErrorKind),
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Done | UploadState::Failed(_))
    }
}

/// Request-scoped state machine bookkeeping.
struct UploadRun {
    request_id: Uuid,
    state: UploadState,
}

impl UploadRun {
    fn start() -> Self {
        let run = Self {
            request_id: Uuid::new_v4(),
            state: UploadState::Validating,
        };
        debug!(request_id = %run.request_id, state = ?run.state, "upload started");
        run
    }

    fn enter(&mut self, next: UploadState) {
        debug_assert!(!self.state.is_terminal(), "upload already finished");
        debug!(
            request_id = %self.request_id,
            from = ?self.state,
            to = ?next,
            "upload state transition"
        );
        self.state = next;
    }
}

#[derive(Clone)]
pub struct EntityService {
    blobs: BlobStore,
    registry: EntityRegistry,
    gateway: GatewayResolver,
}

impl EntityService {
    pub fn new(blobs: BlobStore, registry: EntityRegistry, gateway: GatewayResolver) -> Self {
        Self {
            blobs,
            registry,
            gateway,
        }
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Store content, optional preview and generated `metadata.json`, and
    /// group them under one hashId.
    pub async fn upload_entity(
        &self,
        request: UploadRequest,
    ) -> Result<UploadResult, GatewayError> {
        let mut run = UploadRun::start();
        match self.run_upload(&mut run, request).await {
            Ok(result) => {
                run.enter(UploadState::Done);
                info!(
                    request_id = %run.request_id,
                    hash_id = %result.hash_id,
                    "entity uploaded"
                );
                Ok(result)
            }
            Err(err) => {
                let failed_in = run.state;
                run.enter(UploadState::Failed(err.kind()));
                warn!(
                    request_id = %run.request_id,
                    state = ?failed_in,
                    kind = %err.kind(),
                    error = %err,
                    "entity upload failed"
                );
                Err(err)
            }
        }
    }

    async fn run_upload(
        &self,
        run: &mut UploadRun,
        request: UploadRequest,
    ) -> Result<UploadResult, GatewayError> {
        let upload = assembler::validate(request)?;

        run.enter(UploadState::UploadingContent);
        if upload.preview.is_some() {
            run.enter(UploadState::UploadingPreview);
        }
        let (content, preview) = tokio::try_join!(
            self.put_required(upload.content.clone())
                .map_err(|err| (UploadState::UploadingContent, err)),
            self.put_optional(upload.preview.clone())
                .map_err(|err| (UploadState::UploadingPreview, err)),
        )
        .map_err(|(failed_in, err)| {
            // Both writes were in flight; blame the one that failed.
            run.state = failed_in;
            err
        })?;
        debug!(
            request_id = %run.request_id,
            content = %content,
            preview = ?preview.as_ref().map(ToString::to_string),
            "content blobs stored"
        );

        run.enter(UploadState::AssemblingMetadata);
        let metadata = assembler::assemble(&upload.fields, &content, preview.as_ref());
        let document = serde_json::to_vec(&metadata).map_err(|err| {
            GatewayError::InvalidArgument(format!("metadata is not serializable: {err}"))
        })?;

        run.enter(UploadState::UploadingMetadata);
        let metadata_id = self.blobs.put(Bytes::from(document)).await?.id;

        run.enter(UploadState::Grouping);
        let mut children = vec![
            (Slot::Content, content.clone()),
            (Slot::Metadata, metadata_id.clone()),
        ];
        if let Some(preview) = &preview {
            children.push((Slot::Preview, preview.clone()));
        }
        let (manifest, hash_id) = grouper::group(children);
        let manifest_bytes = manifest.to_bytes();
        let stored = self
            .blobs
            .put_encoded(Codec::DagJson, Bytes::from(manifest_bytes.clone()))
            .await?;
        if stored.id != hash_id {
            return Err(GatewayError::StorageUnavailable(format!(
                "manifest stored as `{}`, expected `{}`",
                stored.id, hash_id
            )));
        }

        self.registry
            .commit(&NewEntity {
                hash_id: hash_id.to_string(),
                metadata_cid: metadata_id.to_string(),
                content_cid: content.to_string(),
                preview_cid: preview.as_ref().map(ToString::to_string),
                manifest: String::from_utf8_lossy(&manifest_bytes).into_owned(),
            })
            .await?;

        let embed = self.gateway.embed(&metadata);
        Ok(UploadResult {
            hash_id,
            url: self.gateway.resolve(&metadata_id),
            metadata: Some(metadata),
            embed: Some(embed),
        })
    }

    async fn put_required(&self, data: Bytes) -> Result<ContentId, GatewayError> {
        Ok(self.blobs.put(data).await?.id)
    }

    async fn put_optional(&self, data: Option<Bytes>) -> Result<Option<ContentId>, GatewayError> {
        match data {
            Some(bytes) => self.put_required(bytes).await.map(Some),
            None => Ok(None),
        }
    }

    /// Fetch stored metadata by entity hashId or metadata identifier.
    pub async fn get_metadata(
        &self,
        reference: &MetadataReference,
        embed: bool,
    ) -> Result<MetadataView, GatewayError> {
        let record = self.lookup(&reference.reference).await?;

        let metadata_id = ContentId::parse(&record.metadata_cid).map_err(|err| {
            error!(
                hash_id = %record.hash_id,
                metadata_cid = %record.metadata_cid,
                error = %err,
                "registry row holds an invalid metadata identifier"
            );
            GatewayError::CorruptMetadata {
                reference: reference.reference.clone(),
                reason: err.to_string(),
            }
        })?;
        let hash_id = ContentId::parse(&record.hash_id).map_err(|err| {
            GatewayError::CorruptMetadata {
                reference: reference.reference.clone(),
                reason: err.to_string(),
            }
        })?;

        let bytes = match self.blobs.get(&metadata_id).await {
            Ok(bytes) => bytes,
            Err(err) => {
                let err = GatewayError::from(err);
                if err.kind() == ErrorKind::CorruptMetadata {
                    error!(cid = %metadata_id, "metadata blob failed integrity check");
                } else if err.kind() == ErrorKind::NotFound {
                    warn!(
                        hash_id = %hash_id,
                        cid = %metadata_id,
                        "registered metadata blob is missing from storage"
                    );
                }
                return Err(err);
            }
        };

        let metadata: NftMetadata = serde_json::from_slice(&bytes).map_err(|err| {
            error!(
                cid = %metadata_id,
                error = %err,
                "stored metadata does not deserialize"
            );
            GatewayError::CorruptMetadata {
                reference: reference.reference.clone(),
                reason: err.to_string(),
            }
        })?;

        let embed = embed.then(|| self.gateway.embed(&metadata));
        Ok(MetadataView {
            hash_id,
            url: self.gateway.resolve(&metadata_id),
            metadata,
            embed,
        })
    }

    /// Resolve a reference to its registry row.
    async fn lookup(&self, reference: &str) -> Result<EntityRecord, GatewayError> {
        let not_found = || GatewayError::NotFound(format!("no metadata for `{reference}`"));
        let id = ContentId::parse(reference).map_err(|_| not_found())?;

        let record = match id.codec() {
            Codec::DagJson => self.registry.find_by_hash_id(&id.to_string()).await?,
            Codec::Raw => self.registry.find_by_metadata_cid(&id.to_string()).await?,
        };
        record.ok_or_else(not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db,
        retry::RetryPolicy,
        services::blob_store::OperationTimeouts,
        storage::{BackendError, BlobBackend, MemoryBackend, StorageBackend},
    };
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Memory backend that refuses to store one particular blob.
    struct RefusingBackend {
        inner: MemoryBackend,
        refused: ContentId,
    }

    #[async_trait]
    impl BlobBackend for RefusingBackend {
        fn kind(&self) -> StorageBackend {
            StorageBackend::Memory
        }

        async fn write(&self, id: &ContentId, data: Bytes) -> Result<(), BackendError> {
            if *id == self.refused {
                return Err(BackendError::Rejected("quota exceeded".into()));
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

    async fn service_refusing(refused: &[u8]) -> EntityService {
        let backend = RefusingBackend {
            inner: MemoryBackend::new(),
            refused: ContentId::of(refused),
        };
        let blobs = BlobStore::new(
            Arc::new(backend),
            RetryPolicy::none(),
            OperationTimeouts::default(),
        );
        let pool = db::connect_in_memory().await.unwrap();
        EntityService::new(
            blobs,
            EntityRegistry::new(Arc::new(pool)),
            GatewayResolver::new("https://gw.example/ipfs/").unwrap(),
        )
    }

    fn request() -> UploadRequest {
        UploadRequest {
            name: "Artwork1".into(),
            content: Some(Bytes::from_static(b"bytes A")),
            preview: Some(Bytes::from_static(b"bytes B")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn failed_content_write_is_blamed_on_content() {
        let service = service_refusing(b"bytes A").await;
        let mut run = UploadRun::start();

        let err = service.run_upload(&mut run, request()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
        assert_eq!(run.state, UploadState::UploadingContent);
    }

    #[tokio::test]
    async fn failed_preview_write_is_blamed_on_preview() {
        let service = service_refusing(b"bytes B").await;
        let mut run = UploadRun::start();

        service.run_upload(&mut run, request()).await.unwrap_err();

        assert_eq!(run.state, UploadState::UploadingPreview);
    }

    #[test]
    fn only_done_and_failed_are_terminal() {
        assert!(UploadState::Done.is_terminal());
        assert!(UploadState::Failed(ErrorKind::NotFound).is_terminal());
        assert!(!UploadState::Grouping.is_terminal());
    }
}
