//! Distributed content network backend (IPFS via the Kubo HTTP RPC API).
//!
//! Blocks are written with the same codec and hash function the gateway
//! uses locally, so the node must report back exactly the identifier we
//! computed. Reads run with `offline=true` so a missing block fails fast
//! instead of triggering a network-wide search.

use super::{BackendError, BlobBackend, StorageBackend, status_error};
use crate::hashing::ContentId;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    Client, StatusCode,
    multipart::{Form, Part},
};
use serde::Deserialize;
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlockPutResponse {
    key: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RpcError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone)]
pub struct IpfsBackend {
    client: Client,
    api: Url,
}

impl IpfsBackend {
    /// `api_url` is the RPC root, e.g. `http://127.0.0.1:5001`.
    pub fn new(api_url: &str) -> Result<Self, BackendError> {
        let api = Url::parse(api_url).map_err(|err| {
            BackendError::Rejected(format!("invalid IPFS API url `{api_url}`: {err}"))
        })?;
        if api.cannot_be_a_base() {
            return Err(BackendError::Rejected(format!(
                "IPFS API url `{api_url}` cannot carry a path"
            )));
        }
        Ok(Self {
            client: Client::new(),
            api,
        })
    }

    fn command_url(&self, command: &str) -> Url {
        let mut url = self.api.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["api", "v0"]);
            segments.extend(command.split('/'));
        }
        url
    }

    /// Turn an error response into `None` when it says the block is absent.
    async fn missing_or_error(resp: reqwest::Response) -> Result<(), BackendError> {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<RpcError>(&body)
            .map(|err| err.message)
            .unwrap_or_else(|_| body.clone());
        if is_not_found(status, &message) {
            return Ok(());
        }
        Err(status_error(status, &message))
    }
}

fn is_not_found(status: StatusCode, message: &str) -> bool {
    status == StatusCode::NOT_FOUND || message.to_ascii_lowercase().contains("not found")
}

#[async_trait]
impl BlobBackend for IpfsBackend {
    fn kind(&self) -> StorageBackend {
        StorageBackend::DistributedContentNetwork
    }

    async fn write(&self, id: &ContentId, data: Bytes) -> Result<(), BackendError> {
        let form = Form::new().part("file", Part::bytes(data.to_vec()).file_name("blob"));
        let resp = self
            .client
            .post(self.command_url("block/put"))
            .query(&[
                ("cid-codec", id.codec().name()),
                ("mhtype", "sha2-256"),
                ("pin", "true"),
            ])
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let put: BlockPutResponse = resp.json().await?;
        let reported = ContentId::parse(&put.key).map_err(|_| BackendError::Integrity {
            expected: id.to_string(),
            actual: put.key.clone(),
        })?;
        if reported != *id {
            return Err(BackendError::Integrity {
                expected: id.to_string(),
                actual: put.key,
            });
        }
        debug!(cid = %id, size = put.size, "pinned block");
        Ok(())
    }

    async fn read(&self, id: &ContentId) -> Result<Option<Bytes>, BackendError> {
        let resp = self
            .client
            .post(self.command_url("block/get"))
            .query(&[("arg", id.to_string().as_str()), ("offline", "true")])
            .send()
            .await?;
        if resp.status().is_success() {
            return Ok(Some(resp.bytes().await?));
        }
        Self::missing_or_error(resp).await.map(|()| None)
    }

    async fn contains(&self, id: &ContentId) -> Result<bool, BackendError> {
        let resp = self
            .client
            .post(self.command_url("block/stat"))
            .query(&[("arg", id.to_string().as_str()), ("offline", "true")])
            .send()
            .await?;
        if resp.status().is_success() {
            return Ok(true);
        }
        Self::missing_or_error(resp).await.map(|()| false)
    }

    async fn check_ready(&self) -> Result<(), BackendError> {
        let resp = self.client.post(self.command_url("version")).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(status_error(status, &body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_urls_keep_api_prefix() {
        let backend = IpfsBackend::new("http://127.0.0.1:5001").unwrap();
        assert_eq!(
            backend.command_url("block/put").as_str(),
            "http://127.0.0.1:5001/api/v0/block/put"
        );

        let nested = IpfsBackend::new("http://node.internal/rpc/").unwrap();
        assert_eq!(
            nested.command_url("version").as_str(),
            "http://node.internal/rpc/api/v0/version"
        );
    }

    #[test]
    fn not_found_detection() {
        assert!(is_not_found(
            StatusCode::INTERNAL_SERVER_ERROR,
            "block was not found locally (offline)"
        ));
        assert!(!is_not_found(StatusCode::INTERNAL_SERVER_ERROR, "datastore closed"));
    }
}
