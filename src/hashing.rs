//! Content hashing and content identifiers.
//!
//! Every blob the gateway stores is addressed by a CIDv1 whose multihash is
//! sha2-256 of the exact bytes. Blobs use the `raw` codec; entity manifests
//! use `dag-json`, so an entity hashId can be told apart from a plain blob
//! identifier without any lookup.

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Multihash code for sha2-256.
const SHA2_256: u64 = 0x12;

/// Scheme used for identifier references stored inside documents.
pub const IPFS_SCHEME: &str = "ipfs://";

/// Multicodec of the bytes an identifier points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Opaque bytes: uploaded files and `metadata.json`.
    Raw,
    /// Canonical JSON entity manifest.
    DagJson,
}

impl Codec {
    pub const fn code(self) -> u64 {
        match self {
            Codec::Raw => 0x55,
            Codec::DagJson => 0x0129,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Codec::Raw => "raw",
            Codec::DagJson => "dag-json",
        }
    }

    fn from_code(code: u64) -> Option<Self> {
        match code {
            0x55 => Some(Codec::Raw),
            0x0129 => Some(Codec::DagJson),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentIdError {
    #[error("`{0}` is not a content identifier")]
    Malformed(String),
    #[error("`{0}` is not a CIDv1")]
    UnsupportedVersion(String),
    #[error("`{0}` does not use a sha2-256 multihash")]
    UnsupportedHash(String),
    #[error("`{0}` uses an unsupported codec")]
    UnsupportedCodec(String),
}

/// Deterministic address of a byte sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentId(Cid);

impl ContentId {
    /// Identifier of `data` stored as a raw blob.
    pub fn of(data: &[u8]) -> Self {
        Self::of_codec(Codec::Raw, data)
    }

    pub fn of_codec(codec: Codec, data: &[u8]) -> Self {
        let digest = Code::Sha2_256.digest(data);
        Self(Cid::new_v1(codec.code(), digest))
    }

    /// Parse either a bare CID or an `ipfs://<cid>[/path]` reference.
    ///
    /// Only CIDv1 with a sha2-256 multihash and a known codec is accepted;
    /// the gateway never produces anything else.
    pub fn parse(reference: &str) -> Result<Self, ContentIdError> {
        let trimmed = reference.trim();
        let bare = trimmed.strip_prefix(IPFS_SCHEME).unwrap_or(trimmed);
        let bare = bare.split('/').next().unwrap_or_default();
        if bare.is_empty() {
            return Err(ContentIdError::Malformed(reference.to_string()));
        }

        let cid =
            Cid::from_str(bare).map_err(|_| ContentIdError::Malformed(reference.to_string()))?;
        if cid.version() != cid::Version::V1 {
            return Err(ContentIdError::UnsupportedVersion(reference.to_string()));
        }
        if cid.hash().code() != SHA2_256 {
            return Err(ContentIdError::UnsupportedHash(reference.to_string()));
        }
        if Codec::from_code(cid.codec()).is_none() {
            return Err(ContentIdError::UnsupportedCodec(reference.to_string()));
        }
        Ok(Self(cid))
    }

    pub fn codec(&self) -> Codec {
        // `parse` and `of_codec` are the only constructors and both reject
        // unknown codecs.
        Codec::from_code(self.0.codec()).unwrap_or(Codec::Raw)
    }

    /// Raw sha2-256 digest bytes.
    pub fn digest(&self) -> &[u8] {
        self.0.hash().digest()
    }

    /// Check that `data` hashes to this identifier.
    pub fn verifies(&self, data: &[u8]) -> bool {
        Self::of_codec(self.codec(), data) == *self
    }

    /// Reference form embedded in metadata documents.
    pub fn to_uri(&self) -> String {
        format!("{}{}", IPFS_SCHEME, self.0)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentId {
    type Err = ContentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Split an `ipfs://<cid>[/path]` reference into identifier and path suffix.
///
/// Returns `None` for anything that is not an internal reference, including
/// `ipfs://` strings whose first segment is not a valid identifier.
pub fn split_reference(value: &str) -> Option<(ContentId, &str)> {
    let rest = value.strip_prefix(IPFS_SCHEME)?;
    let (head, tail) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };
    let id = ContentId::parse(head).ok()?;
    Some((id, tail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_hash_identically() {
        let a = ContentId::of(b"artwork bytes");
        let b = ContentId::of(b"artwork bytes");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn different_bytes_hash_differently() {
        assert_ne!(ContentId::of(b"artwork A"), ContentId::of(b"artwork B"));
    }

    #[test]
    fn codec_is_part_of_the_identifier() {
        let raw = ContentId::of_codec(Codec::Raw, b"{}");
        let manifest = ContentId::of_codec(Codec::DagJson, b"{}");
        assert_ne!(raw, manifest);
        assert_eq!(raw.digest(), manifest.digest());
        assert_eq!(raw.codec(), Codec::Raw);
        assert_eq!(manifest.codec(), Codec::DagJson);
    }

    #[test]
    fn raw_identifiers_print_as_base32_cidv1() {
        let id = ContentId::of(b"hello");
        assert!(id.to_string().starts_with("bafkrei"), "got {id}");
    }

    #[test]
    fn parse_accepts_bare_and_uri_forms() {
        let id = ContentId::of(b"hello");
        assert_eq!(ContentId::parse(&id.to_string()).unwrap(), id);
        assert_eq!(ContentId::parse(&id.to_uri()).unwrap(), id);
        assert_eq!(
            ContentId::parse(&format!("{}/metadata.json", id.to_uri())).unwrap(),
            id
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            ContentId::parse("unknown-id"),
            Err(ContentIdError::Malformed(_))
        ));
        assert!(ContentId::parse("").is_err());
        assert!(ContentId::parse("ipfs://").is_err());
    }

    #[test]
    fn parse_rejects_cidv0() {
        let v0 = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
        assert!(matches!(
            ContentId::parse(v0),
            Err(ContentIdError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn verifies_detects_tampering() {
        let id = ContentId::of(b"original");
        assert!(id.verifies(b"original"));
        assert!(!id.verifies(b"tampered"));
    }

    #[test]
    fn serde_round_trips_as_string() {
        let id = ContentId::of(b"serde");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: ContentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn split_reference_keeps_path() {
        let id = ContentId::of(b"dir");
        let uri = format!("{}/a/b.png", id.to_uri());
        let (parsed, path) = split_reference(&uri).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(path, "/a/b.png");
        assert!(split_reference("https://example.com/x.png").is_none());
        assert!(split_reference("ipfs://not-a-cid").is_none());
    }
}
