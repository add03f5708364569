//! Boundary types for entity upload and metadata lookup.

use crate::{hashing::ContentId, models::metadata::{Attribute, NftMetadata}};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Named members of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Content,
    Preview,
    Metadata,
}

/// File slots a caller may upload; `metadata.json` is always generated.
pub const UPLOADING_FIELDS: [Slot; 2] = [Slot::Content, Slot::Preview];

impl Slot {
    pub const fn name(self) -> &'static str {
        match self {
            Slot::Content => "content",
            Slot::Preview => "preview",
            Slot::Metadata => "metadata.json",
        }
    }

    /// Map a form field name onto an uploadable slot.
    pub fn uploading_field(name: &str) -> Option<Self> {
        UPLOADING_FIELDS.into_iter().find(|slot| slot.name() == name)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arguments for an entity upload.
///
/// `properties` is the caller's raw JSON text; it is parsed during
/// validation, before any blob is written.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub name: String,
    pub description: Option<String>,
    pub external_url: Option<String>,
    pub animation_url: Option<String>,
    pub background_color: Option<String>,
    pub attributes: Vec<Attribute>,
    pub properties: Option<String>,
    pub content: Option<Bytes>,
    pub preview: Option<Bytes>,
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    /// Identifier enclosing content, preview and `metadata.json`.
    pub hash_id: ContentId,
    /// Gateway URL of the stored `metadata.json`.
    pub url: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<NftMetadata>,
    /// `metadata` with every internal reference rewritten to a gateway URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<NftMetadata>,
}

/// Lookup key for stored metadata: an entity hashId or a metadata identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataReference {
    pub reference: String,
}

impl MetadataReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }
}

/// Stored metadata as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataView {
    pub hash_id: ContentId,
    pub url: Url,
    pub metadata: NftMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<NftMetadata>,
}
