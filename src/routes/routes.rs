//! Defines routes for entity upload, metadata lookup and the blob gateway.
//!
//! ## Structure
//! - **Entity endpoints**
//!   - `POST /entities`: multipart upload (content, optional preview, fields)
//!   - `GET  /entities/{reference}/metadata`: metadata by hashId or metadata id
//!
//! - **Gateway endpoints**
//!   - `GET  /ipfs/{cid}`: stored bytes, cacheable forever
//!   - `HEAD /ipfs/{cid}`: existence check
//!
//! - **Health**: `/healthz`, `/readyz`

use crate::{
    handlers::{
        blob_handlers::{get_blob, head_blob},
        entity_handlers::{get_entity_metadata, upload_entity},
        health_handlers::{healthz, readyz},
    },
    services::entity_service::EntityService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router. Request bodies above `max_upload_bytes` are rejected
/// before any storage work starts.
pub fn routes(max_upload_bytes: usize) -> Router<EntityService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Entity routes
        .route("/entities", post(upload_entity))
        .route("/entities/{reference}/metadata", get(get_entity_metadata))
        // Gateway routes
        .route("/ipfs/{cid}", get(get_blob).head(head_blob))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
