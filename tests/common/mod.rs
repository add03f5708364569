#![allow(dead_code)]

use bytes::Bytes;
use nft_gateway::{
    db,
    models::upload::UploadRequest,
    retry::RetryPolicy,
    services::{
        blob_store::{BlobStore, OperationTimeouts},
        entity_service::EntityService,
        gateway::GatewayResolver,
        registry::EntityRegistry,
    },
    storage::MemoryBackend,
};
use std::sync::Arc;

pub const GATEWAY_BASE: &str = "https://gw.example/ipfs/";

/// Service over a fresh memory backend and in-memory registry.
pub struct Harness {
    pub service: EntityService,
    pub backend: MemoryBackend,
}

impl Harness {
    pub async fn new() -> Self {
        let backend = MemoryBackend::new();
        let pool = db::connect_in_memory().await.unwrap();
        let blobs = BlobStore::new(
            Arc::new(backend.clone()),
            RetryPolicy::new(2, 1, 5),
            OperationTimeouts::default(),
        );
        let service = EntityService::new(
            blobs,
            EntityRegistry::new(Arc::new(pool)),
            GatewayResolver::new(GATEWAY_BASE).unwrap(),
        );
        Self { service, backend }
    }
}

pub fn artwork_request() -> UploadRequest {
    UploadRequest {
        name: "Artwork1".into(),
        content: Some(Bytes::from_static(b"bytes A")),
        preview: Some(Bytes::from_static(b"bytes B")),
        ..Default::default()
    }
}
