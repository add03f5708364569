//! Gateway URL resolution and the embed view.

use crate::{
    hashing::{ContentId, split_reference},
    models::metadata::NftMetadata,
};
use serde_json::Value;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum GatewayUrlError {
    #[error("invalid gateway base URL `{url}`: {reason}")]
    Invalid { url: String, reason: String },
}

/// Turns identifiers into URLs under a configured gateway base, e.g.
/// `https://gateway.example/ipfs/` + `<cid>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResolver {
    base: Url,
}

impl GatewayResolver {
    pub fn new(base: &str) -> Result<Self, GatewayUrlError> {
        let invalid = |reason: String| GatewayUrlError::Invalid {
            url: base.to_string(),
            reason,
        };
        let mut url = Url::parse(base).map_err(|err| invalid(err.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(invalid("URL cannot carry a path".into()));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("URL must not have a query or fragment".into()));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self { base: url })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn resolve(&self, id: &ContentId) -> Url {
        self.resolve_path(id, "")
    }

    /// Resolve `id` plus a path below it (`/a/b.png`).
    pub fn resolve_path(&self, id: &ContentId, path: &str) -> Url {
        let mut url = self.base.clone();
        // `new` rejects cannot-be-a-base URLs, so segments are always available.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&id.to_string());
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        url
    }

    /// Gateway URL for an `ipfs://` reference; `None` if `value` is not one.
    pub fn resolve_reference(&self, value: &str) -> Option<Url> {
        split_reference(value).map(|(id, path)| self.resolve_path(&id, path))
    }

    /// Copy of `doc` with every internal reference replaced by its URL.
    pub fn embed(&self, doc: &NftMetadata) -> NftMetadata {
        let mut view = doc.clone();
        self.rewrite(&mut view.image);
        for field in [
            &mut view.preview,
            &mut view.external_url,
            &mut view.animation_url,
        ] {
            if let Some(value) = field.as_mut() {
                self.rewrite(value);
            }
        }
        for attribute in &mut view.attributes {
            self.rewrite_value(&mut attribute.value);
        }
        for value in view.properties.values_mut() {
            self.rewrite_value(value);
        }
        view
    }

    fn rewrite(&self, value: &mut String) {
        if let Some(url) = self.resolve_reference(value) {
            *value = url.into();
        }
    }

    fn rewrite_value(&self, value: &mut Value) {
        match value {
            Value::String(s) => self.rewrite(s),
            Value::Array(items) => items.iter_mut().for_each(|v| self.rewrite_value(v)),
            Value::Object(map) => map.values_mut().for_each(|v| self.rewrite_value(v)),
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }
}
