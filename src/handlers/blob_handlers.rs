//! Built-in gateway: serves stored blobs at `/ipfs/{cid}`.
//!
//! Blobs are immutable, so the CID doubles as a strong ETag and responses
//! may be cached forever.

use crate::{
    errors::AppError,
    hashing::{Codec, ContentId},
    services::{blob_store::StoreError, entity_service::EntityService},
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};

const IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// `GET /ipfs/{cid}`
pub async fn get_blob(
    State(service): State<EntityService>,
    Path(cid): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let id = parse_cid(&cid)?;
    let etag = format!("\"{}\"", id);
    if if_none_match(&headers, &etag) {
        return Ok(not_modified(&etag));
    }

    let data = service.blobs().get(&id).await?;
    let len = data.len();
    let mut response = Response::new(Body::from(data));
    *response.status_mut() = StatusCode::OK;
    set_blob_headers(response.headers_mut(), &id, &etag, len);
    Ok(response)
}

/// `HEAD /ipfs/{cid}`: existence check without a body.
pub async fn head_blob(
    State(service): State<EntityService>,
    Path(cid): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_cid(&cid)?;
    if !service.blobs().exists(&id).await? {
        return Err(StoreError::NotFound(id).into());
    }
    let etag = format!("\"{}\"", id);
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type(&id));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(IMMUTABLE));
    if let Ok(value) = HeaderValue::from_str(&etag) {
        headers.insert(header::ETAG, value);
    }
    Ok(response)
}

fn parse_cid(raw: &str) -> Result<ContentId, AppError> {
    ContentId::parse(raw).map_err(|err| AppError::invalid_argument(err.to_string()))
}

fn if_none_match(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|candidate| candidate.trim() == etag))
        .unwrap_or(false)
}

fn not_modified(etag: &str) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NOT_MODIFIED;
    if let Ok(value) = HeaderValue::from_str(etag) {
        response.headers_mut().insert(header::ETAG, value);
    }
    response
}

fn content_type(id: &ContentId) -> HeaderValue {
    match id.codec() {
        Codec::DagJson => HeaderValue::from_static("application/json"),
        Codec::Raw => HeaderValue::from_static("application/octet-stream"),
    }
}

fn set_blob_headers(headers: &mut HeaderMap, id: &ContentId, etag: &str, len: usize) {
    headers.insert(header::CONTENT_TYPE, content_type(id));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(IMMUTABLE));
    if let Ok(value) = HeaderValue::from_str(etag) {
        headers.insert(header::ETAG, value);
    }
}
