//! Blob metadata rows
//!
//! The object bytes live in the object store; this table maps a blob id to
//! its object key, digest and size. Rows are written once the object write
//! has succeeded and never updated.

use sqlx::{Row, SqlitePool};

use vaultsync_core::domain::{BlobId, BlobRecord, BlobStatus, UserId};

use crate::{parse_datetime, StoreError};

/// Store for blob metadata
pub struct BlobMetaStore {
    pool: SqlitePool,
}

impl BlobMetaStore {
    /// Creates a new blob metadata store on the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Records a blob after its object write succeeded
    ///
    /// # Errors
    /// Returns `StoreError::QueryFailed` on database failure.
    pub async fn insert(&self, user_id: &UserId, blob: &BlobRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sync_blobs \
             (user_id, blob_id, object_key, sha256, size_bytes, content_type, created_at, status) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id.as_str())
        .bind(blob.blob_id.to_string())
        .bind(&blob.object_key)
        .bind(&blob.sha256)
        .bind(blob.size_bytes)
        .bind(&blob.content_type)
        .bind(blob.created_at.to_rfc3339())
        .bind(blob.status.as_str())
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            user_id = %user_id,
            blob_id = %blob.blob_id,
            size_bytes = blob.size_bytes,
            "blob metadata recorded"
        );

        Ok(())
    }

    /// Loads blob metadata, if the blob exists for this user
    ///
    /// # Errors
    /// Returns `StoreError` on database failure or an undecodable row.
    pub async fn get(
        &self,
        user_id: &UserId,
        blob_id: &BlobId,
    ) -> Result<Option<BlobRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT object_key, sha256, size_bytes, content_type, created_at, status \
             FROM sync_blobs WHERE user_id = ? AND blob_id = ?",
        )
        .bind(user_id.as_str())
        .bind(blob_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let created_at: String = row.get("created_at");
        let status: String = row.get("status");

        Ok(Some(BlobRecord {
            blob_id: blob_id.clone(),
            object_key: row.get("object_key"),
            sha256: row.get("sha256"),
            size_bytes: row.get("size_bytes"),
            content_type: row.get("content_type"),
            created_at: parse_datetime(&created_at)?,
            status: BlobStatus::parse(&status)
                .map_err(|e| StoreError::RowDecode(e.to_string()))?,
        }))
    }
}
