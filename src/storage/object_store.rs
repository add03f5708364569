//! S3-compatible object-store backend.
//!
//! Blobs are objects named by their CID inside one bucket:
//! `PUT/GET/HEAD {endpoint}/{bucket}/{cid}`. The remote store is expected to
//! make an object visible only once its upload completes.

use super::{BackendError, BlobBackend, StorageBackend, status_error};
use crate::hashing::ContentId;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct ObjectStoreBackend {
    client: Client,
    endpoint: Url,
    bucket: String,
}

impl ObjectStoreBackend {
    pub fn new(endpoint: &str, bucket: &str) -> Result<Self, BackendError> {
        let endpoint = Url::parse(endpoint).map_err(|err| {
            BackendError::Rejected(format!("invalid object-store endpoint `{endpoint}`: {err}"))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(BackendError::Rejected(format!(
                "object-store endpoint `{endpoint}` cannot carry a path"
            )));
        }
        if bucket.is_empty() || bucket.contains('/') {
            return Err(BackendError::Rejected(format!(
                "invalid object-store bucket `{bucket}`"
            )));
        }
        Ok(Self {
            client: Client::new(),
            endpoint,
            bucket: bucket.to_string(),
        })
    }

    fn bucket_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&self.bucket);
        }
        url
    }

    fn object_url(&self, id: &ContentId) -> Url {
        let mut url = self.bucket_url();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(&id.to_string());
        }
        url
    }

    /// Create the bucket; an already existing bucket is not an error.
    pub async fn ensure_bucket(&self) -> Result<(), BackendError> {
        let resp = self.client.put(self.bucket_url()).send().await?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::CONFLICT {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }
}

#[async_trait]
impl BlobBackend for ObjectStoreBackend {
    fn kind(&self) -> StorageBackend {
        StorageBackend::ObjectStore
    }

    async fn write(&self, id: &ContentId, data: Bytes) -> Result<(), BackendError> {
        let size = data.len();
        let resp = self
            .client
            .put(self.object_url(id))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        debug!(cid = %id, size, bucket = %self.bucket, "stored object");
        Ok(())
    }

    async fn read(&self, id: &ContentId) -> Result<Option<Bytes>, BackendError> {
        let resp = self.client.get(self.object_url(id)).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(resp.bytes().await?)),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(status_error(status, &body))
            }
        }
    }

    async fn contains(&self, id: &ContentId) -> Result<bool, BackendError> {
        let resp = self.client.head(self.object_url(id)).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(status_error(status, "")),
        }
    }

    /// List at most one key from the bucket.
    async fn check_ready(&self) -> Result<(), BackendError> {
        let resp = self
            .client
            .get(self.bucket_url())
            .query(&[("list-type", "2"), ("max-keys", "1")])
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(status_error(status, &body))
        }
    }
}
