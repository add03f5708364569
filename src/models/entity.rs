//! Represents a committed entity in the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of the `entities` table.
///
/// A row is inserted only after every child blob and the manifest are
/// durably stored, so its presence is what makes a hashId valid.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct EntityRecord {
    /// Entity hashId (dag-json CID of the manifest).
    pub hash_id: String,

    /// Identifier of the generated `metadata.json` blob.
    pub metadata_cid: String,

    /// Identifier of the content blob.
    pub content_cid: String,

    /// Identifier of the preview blob, if one was uploaded.
    pub preview_cid: Option<String>,

    /// Canonical manifest JSON the hashId was computed from.
    pub manifest: String,

    /// When the entity was first committed.
    pub created_at: DateTime<Utc>,
}
