//! The NFT metadata document (`metadata.json`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// NFT metadata following the OpenSea metadata convention.
///
/// The stored document holds `ipfs://<cid>` references in `image` and
/// `preview`; gateway URLs only ever appear in the embed view. Field order
/// is fixed and `properties` keys are sorted, so identical inputs always
/// serialize to identical bytes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NftMetadata {
    /// Display name of the item.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Reference to the content blob.
    pub image: String,

    /// Reference to the preview blob, when one was uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation_url: Option<String>,

    /// Six hex digits without a leading `#`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,

    /// Free-form caller properties, always a JSON object.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

/// A single trait entry in `attributes`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Attribute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trait_type: Option<String>,

    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_type: Option<String>,
}
