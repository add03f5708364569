//! NFT entity upload and metadata-resolution gateway.
//!
//! Uploaded content, an optional preview and a generated `metadata.json`
//! are stored as content-addressed blobs, grouped under one entity
//! identifier (the hashId) and committed to a SQLite registry. Metadata can
//! later be read back by hashId or by its own identifier, optionally with
//! every `ipfs://` reference rewritten to a gateway URL.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod hashing;
pub mod models;
pub mod retry;
pub mod routes;
pub mod services;
pub mod storage;

use axum::Router;
use services::entity_service::EntityService;

/// Build the application router with its state attached.
pub fn app(service: EntityService, max_upload_bytes: usize) -> Router {
    routes::routes::routes(max_upload_bytes).with_state(service)
}
