//! SQLite-backed entity registry.
//!
//! The registry is the commit log of finished uploads: a hashId resolves
//! only once its row exists, and metadata identifiers are looked up here
//! too so arbitrary blobs cannot be read back as metadata.

use crate::models::entity::EntityRecord;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Values for a new registry row.
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub hash_id: String,
    pub metadata_cid: String,
    pub content_cid: String,
    pub preview_cid: Option<String>,
    pub manifest: String,
}

#[derive(Clone)]
pub struct EntityRegistry {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl EntityRegistry {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Commit an entity. Committing the same hashId twice keeps the first
    /// row and returns it.
    pub async fn commit(&self, entity: &NewEntity) -> Result<EntityRecord, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO entities (
                hash_id, metadata_cid, content_cid, preview_cid, manifest, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(hash_id) DO NOTHING
            "#,
        )
        .bind(&entity.hash_id)
        .bind(&entity.metadata_cid)
        .bind(&entity.content_cid)
        .bind(&entity.preview_cid)
        .bind(&entity.manifest)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        self.find_by_hash_id(&entity.hash_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_by_hash_id(
        &self,
        hash_id: &str,
    ) -> Result<Option<EntityRecord>, sqlx::Error> {
        sqlx::query_as::<_, EntityRecord>(
            "SELECT hash_id, metadata_cid, content_cid, preview_cid, manifest, created_at
             FROM entities WHERE hash_id = ?",
        )
        .bind(hash_id)
        .fetch_optional(&*self.db)
        .await
    }

    /// Earliest entity whose `metadata.json` has this identifier.
    pub async fn find_by_metadata_cid(
        &self,
        metadata_cid: &str,
    ) -> Result<Option<EntityRecord>, sqlx::Error> {
        sqlx::query_as::<_, EntityRecord>(
            "SELECT hash_id, metadata_cid, content_cid, preview_cid, manifest, created_at
             FROM entities WHERE metadata_cid = ?
             ORDER BY created_at ASC LIMIT 1",
        )
        .bind(metadata_cid)
        .fetch_optional(&*self.db)
        .await
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM entities")
            .fetch_one(&*self.db)
            .await
    }

    /// `SELECT 1` round trip for readiness checks.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        let value = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if value == 1 {
            Ok(())
        } else {
            Err(sqlx::Error::Protocol(format!("unexpected result: {value}")))
        }
    }
}
