//! Groups an entity's blobs under one hashId.
//!
//! The manifest is a dag-json map from slot name to `{"/": cid}` link.
//! Keys are kept in a `BTreeMap`, so the serialized bytes (and the hashId)
//! depend only on which identifier sits in which slot, never on the order
//! the slots were added.

use crate::{
    hashing::{Codec, ContentId},
    models::upload::Slot,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityManifest {
    children: BTreeMap<&'static str, ContentId>,
}

impl EntityManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `id` in `slot`, returning whatever was there before.
    pub fn insert(&mut self, slot: Slot, id: ContentId) -> Option<ContentId> {
        self.children.insert(slot.name(), id)
    }

    pub fn get(&self, slot: Slot) -> Option<&ContentId> {
        self.children.get(slot.name())
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Canonical dag-json encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let links: BTreeMap<&str, Value> = self
            .children
            .iter()
            .map(|(slot, id)| (*slot, json!({ "/": id.to_string() })))
            .collect();
        // A map of string keys to JSON values always serializes.
        serde_json::to_vec(&links).unwrap_or_default()
    }

    pub fn hash_id(&self) -> ContentId {
        ContentId::of_codec(Codec::DagJson, &self.to_bytes())
    }
}

impl FromIterator<(Slot, ContentId)> for EntityManifest {
    fn from_iter<I: IntoIterator<Item = (Slot, ContentId)>>(iter: I) -> Self {
        let mut manifest = Self::new();
        for (slot, id) in iter {
            manifest.insert(slot, id);
        }
        manifest
    }
}

/// Compute the manifest and hashId enclosing `children`.
pub fn group<I>(children: I) -> (EntityManifest, ContentId)
where
    I: IntoIterator<Item = (Slot, ContentId)>,
{
    let manifest: EntityManifest = children.into_iter().collect();
    let hash_id = manifest.hash_id();
    (manifest, hash_id)
}
