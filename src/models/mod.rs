//! Core data models for the NFT entity gateway.
//!
//! Metadata documents serialize as the `metadata.json` wire format, upload
//! and lookup types form the gateway's boundary, and entity records map
//! onto the SQLite registry via `sqlx::FromRow`.

pub mod entity;
pub mod metadata;
pub mod upload;
