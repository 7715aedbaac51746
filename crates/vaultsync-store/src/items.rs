//! Latest-state item projection with last-writer-wins upserts
//!
//! One row per (user, item). The row always reflects the whole winning
//! operation - never a merge. Deletes write a tombstone through the same
//! conflict check, so deletes and upserts race identically.
//!
//! The read-then-decide-then-write sequence is not serialized across
//! concurrent pushes touching the same item; the rare race degrades to
//! last-applied-wins, and the deterministic tie-break re-asserts itself on
//! the next sync round.

use sqlx::{Row, SqlitePool};

use vaultsync_core::domain::{
    candidate_wins, ConflictInfo, DeviceId, ItemId, OpType, QuotaDelta, SyncItemInput,
    SyncItemRecord, UserId,
};

use crate::{parse_datetime, parse_optional_datetime, StoreError};

/// Result of a conflict-checked upsert
#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    /// The candidate won and the row was written; `delta` is its signed
    /// contribution to quota usage
    Applied {
        /// Quota delta attributable to this write
        delta: QuotaDelta,
    },
    /// The candidate lost; the row is untouched and the server state is
    /// reported back
    Conflict(ConflictInfo),
}

/// Summary of the stored row consulted by the conflict check and by
/// quota-delta computation
#[derive(Debug, Clone)]
pub struct ItemHead {
    /// Timestamp of the winning operation
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Device that wrote the winning state
    pub device_id: Option<DeviceId>,
    /// Stored payload size
    pub payload_size: Option<i64>,
    /// Tombstone timestamp, when deleted
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ItemHead {
    /// True when the row is not a tombstone
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Size currently counted against the storage quota
    #[must_use]
    pub fn accounted_size(&self) -> i64 {
        if self.is_live() {
            self.payload_size.unwrap_or(0).max(0)
        } else {
            0
        }
    }
}

/// Store for the latest-state item projection
pub struct ItemStore {
    pool: SqlitePool,
}

impl ItemStore {
    /// Creates a new item store on the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Applies one operation through the last-writer-wins check.
    ///
    /// On success the returned delta is the authoritative input to the
    /// quota ledger for this operation:
    /// - new live item: `(+size, +1)`
    /// - size change on a live item: `(Δsize, 0)`
    /// - delete of a live item: `(-prior_size, -1)`
    /// - delete of an absent or already-deleted item: `(0, 0)`
    ///
    /// # Errors
    /// Returns `StoreError` on database failure.
    pub async fn apply(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        item: &SyncItemInput,
    ) -> Result<UpsertOutcome, StoreError> {
        let head = self.get_head(user_id, &item.item_id).await?;

        if let Some(ref head) = head {
            if !candidate_wins(
                item.updated_at,
                device_id,
                head.updated_at,
                head.device_id.as_ref(),
            ) {
                tracing::debug!(
                    user_id = %user_id,
                    item_id = %item.item_id,
                    device_id = %device_id,
                    "push lost conflict check"
                );
                return Ok(UpsertOutcome::Conflict(ConflictInfo {
                    item_id: item.item_id.clone(),
                    server_updated_at: head.updated_at,
                    server_device_id: head.device_id.clone(),
                }));
            }
        }

        let delta = Self::delta_for(head.as_ref(), item);

        // Delete ops tombstone the row at the operation timestamp unless
        // the client supplied an explicit deletion time.
        let deleted_at = match item.op_type {
            OpType::Delete => Some(item.deleted_at.unwrap_or(item.updated_at)),
            OpType::Upsert => item.deleted_at,
        };

        let meta_plain = item
            .meta_plain
            .as_ref()
            .map(|meta| meta.to_string());

        sqlx::query(
            "INSERT INTO sync_items ( \
               user_id, item_id, item_type, schema_version, payload_enc, payload_ref, \
               meta_plain, payload_size, updated_at, deleted_at, updated_by_device_id \
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (user_id, item_id) DO UPDATE SET \
               item_type = excluded.item_type, \
               schema_version = excluded.schema_version, \
               payload_enc = excluded.payload_enc, \
               payload_ref = excluded.payload_ref, \
               meta_plain = excluded.meta_plain, \
               payload_size = excluded.payload_size, \
               updated_at = excluded.updated_at, \
               deleted_at = excluded.deleted_at, \
               updated_by_device_id = excluded.updated_by_device_id",
        )
        .bind(user_id.as_str())
        .bind(item.item_id.as_str())
        .bind(&item.item_type)
        .bind(item.schema_version)
        .bind(&item.payload_enc)
        .bind(&item.payload_ref)
        .bind(&meta_plain)
        .bind(item.payload_size)
        .bind(item.updated_at.to_rfc3339())
        .bind(deleted_at.map(|dt| dt.to_rfc3339()))
        .bind(device_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(UpsertOutcome::Applied { delta })
    }

    /// Hydrates the current rows for a set of item ids.
    ///
    /// Returns the *current* state, not a snapshot at any cursor: a later
    /// pull over the same oplog range may return different bodies if the
    /// items changed again.
    ///
    /// # Errors
    /// Returns `StoreError` on database failure or an undecodable row.
    pub async fn fetch_many(
        &self,
        user_id: &UserId,
        item_ids: &[ItemId],
    ) -> Result<Vec<SyncItemRecord>, StoreError> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; item_ids.len()].join(", ");
        let sql = format!(
            "SELECT item_id, item_type, schema_version, payload_enc, payload_ref, \
                    meta_plain, payload_size, updated_at, deleted_at, updated_by_device_id \
             FROM sync_items \
             WHERE user_id = ? AND item_id IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql).bind(user_id.as_str());
        for item_id in item_ids {
            query = query.bind(item_id.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(Self::record_from_row(row)?);
        }
        Ok(records)
    }

    /// Reads the conflict-check summary of the stored row, if any
    ///
    /// # Errors
    /// Returns `StoreError` on database failure or an undecodable row.
    pub async fn get_head(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
    ) -> Result<Option<ItemHead>, StoreError> {
        let row = sqlx::query(
            "SELECT updated_at, updated_by_device_id, payload_size, deleted_at \
             FROM sync_items \
             WHERE user_id = ? AND item_id = ?",
        )
        .bind(user_id.as_str())
        .bind(item_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let updated_at: String = row.get("updated_at");
        let device_id: Option<String> = row.get("updated_by_device_id");
        let deleted_at: Option<String> = row.get("deleted_at");

        Ok(Some(ItemHead {
            updated_at: parse_datetime(&updated_at)?,
            device_id: match device_id {
                Some(id) if !id.is_empty() => Some(
                    DeviceId::new(id).map_err(|e| StoreError::RowDecode(e.to_string()))?,
                ),
                _ => None,
            },
            payload_size: row.get("payload_size"),
            deleted_at: parse_optional_datetime(deleted_at)?,
        }))
    }

    /// Signed quota contribution of applying `item` over `head`
    #[must_use]
    pub fn delta_for(head: Option<&ItemHead>, item: &SyncItemInput) -> QuotaDelta {
        match item.op_type {
            OpType::Delete => match head {
                Some(head) if head.is_live() => QuotaDelta::new(-head.accounted_size(), -1),
                _ => QuotaDelta::ZERO,
            },
            OpType::Upsert => {
                let size = item.accounted_size();
                match head {
                    Some(head) if head.is_live() => {
                        QuotaDelta::new(size - head.accounted_size(), 0)
                    }
                    // Absent or tombstoned: the item (re)enters the ledger
                    _ => QuotaDelta::new(size, 1),
                }
            }
        }
    }

    fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SyncItemRecord, StoreError> {
        let meta_plain: Option<String> = row.get("meta_plain");
        let meta_plain = match meta_plain {
            Some(ref raw) if !raw.is_empty() => Some(
                serde_json::from_str(raw)
                    .map_err(|e| StoreError::RowDecode(format!("bad meta_plain: {e}")))?,
            ),
            _ => None,
        };

        let updated_at: String = row.get("updated_at");
        let deleted_at: Option<String> = row.get("deleted_at");
        let device_id: Option<String> = row.get("updated_by_device_id");

        Ok(SyncItemRecord {
            item_id: ItemId::new(row.get::<String, _>("item_id")),
            item_type: row.get("item_type"),
            schema_version: row.get("schema_version"),
            payload_enc: row.get("payload_enc"),
            payload_ref: row.get("payload_ref"),
            meta_plain,
            payload_size: row.get("payload_size"),
            updated_at: parse_datetime(&updated_at)?,
            deleted_at: parse_optional_datetime(deleted_at)?,
            device_id: match device_id {
                Some(id) if !id.is_empty() => Some(
                    DeviceId::new(id).map_err(|e| StoreError::RowDecode(e.to_string()))?,
                ),
                _ => None,
            },
        })
    }
}
