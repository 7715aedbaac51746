//! Append-only per-user oplog
//!
//! Append relies on the unique (user_id, device_id, op_seq) index for
//! idempotency and on the AUTOINCREMENT cursor column for race-free,
//! never-reused cursor assignment. The log is never mutated or deleted
//! once written; the item store is the only mutable projection.

use sqlx::{Row, SqlitePool};

use vaultsync_core::domain::{Cursor, DeviceId, ItemId, OpType, OplogEntry, SyncItemInput, UserId};

use crate::{parse_datetime, StoreError};

/// Oplog entries returned per range scan are capped regardless of the
/// caller-requested size.
pub const MAX_RANGE_LIMIT: u32 = 200;

/// Outcome of an idempotent append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new entry was written and assigned this cursor
    Applied(Cursor),
    /// The (device, op_seq) key was already present with the same op_hash;
    /// the retransmit is a no-op
    Duplicate,
    /// The key was already present but with a *different* op_hash: the
    /// client reused an op_seq for different content
    HashMismatch,
}

/// Store for the append-only operation log
pub struct OplogStore {
    pool: SqlitePool,
}

impl OplogStore {
    /// Creates a new oplog store on the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Appends one operation, insert-if-absent on (user, device, op_seq).
    ///
    /// A duplicate key consumes no cursor. The stored op_hash is compared
    /// against the retransmitted one so a client replaying *different*
    /// content under a used key is surfaced instead of silently acked.
    ///
    /// # Errors
    /// Returns `StoreError::QueryFailed` on database failure.
    pub async fn append(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        item: &SyncItemInput,
    ) -> Result<AppendOutcome, StoreError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO sync_oplog \
             (user_id, device_id, op_seq, op_hash, item_id, op_type, updated_at, payload_size) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id.as_str())
        .bind(device_id.as_str())
        .bind(item.op_seq)
        .bind(&item.op_hash)
        .bind(item.item_id.as_str())
        .bind(item.op_type.as_str())
        .bind(item.updated_at.to_rfc3339())
        .bind(item.payload_size)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            let cursor = Cursor::new(result.last_insert_rowid());
            tracing::debug!(
                user_id = %user_id,
                device_id = %device_id,
                op_seq = item.op_seq,
                cursor = %cursor,
                "oplog entry appended"
            );
            return Ok(AppendOutcome::Applied(cursor));
        }

        match self.stored_hash(user_id, device_id, item.op_seq).await? {
            Some(hash) if hash == item.op_hash => Ok(AppendOutcome::Duplicate),
            Some(_) => {
                tracing::warn!(
                    user_id = %user_id,
                    device_id = %device_id,
                    op_seq = item.op_seq,
                    "op_seq reused with different op_hash"
                );
                Ok(AppendOutcome::HashMismatch)
            }
            // Insert-or-ignore reported no change but the row is gone:
            // treat as a benign duplicate rather than failing the push.
            None => Ok(AppendOutcome::Duplicate),
        }
    }

    /// The op_hash recorded for a (device, op_seq) key, if the key has been
    /// used. Lets callers detect retransmits and reused keys before writing
    /// anything.
    ///
    /// # Errors
    /// Returns `StoreError::QueryFailed` on database failure.
    pub async fn stored_hash(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        op_seq: i64,
    ) -> Result<Option<String>, StoreError> {
        let hash = sqlx::query_scalar(
            "SELECT op_hash FROM sync_oplog \
             WHERE user_id = ? AND device_id = ? AND op_seq = ?",
        )
        .bind(user_id.as_str())
        .bind(device_id.as_str())
        .bind(op_seq)
        .fetch_optional(&self.pool)
        .await?;
        Ok(hash)
    }

    /// Returns entries after `after_cursor`, ascending, capped at `limit`
    /// clamped to [1, 200].
    ///
    /// The caller drives pagination by feeding the last returned cursor
    /// back in as the next `after_cursor`.
    ///
    /// # Errors
    /// Returns `StoreError` on database failure or an undecodable row.
    pub async fn range(
        &self,
        user_id: &UserId,
        after_cursor: Cursor,
        limit: u32,
    ) -> Result<Vec<OplogEntry>, StoreError> {
        let limit = limit.clamp(1, MAX_RANGE_LIMIT);

        let rows = sqlx::query(
            "SELECT cursor, device_id, op_seq, op_hash, item_id, op_type, updated_at \
             FROM sync_oplog \
             WHERE user_id = ? AND cursor > ? \
             ORDER BY cursor ASC \
             LIMIT ?",
        )
        .bind(user_id.as_str())
        .bind(after_cursor.value())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let device_id: String = row.get("device_id");
            let op_type: String = row.get("op_type");
            let updated_at: String = row.get("updated_at");
            entries.push(OplogEntry {
                cursor: Cursor::new(row.get::<i64, _>("cursor")),
                item_id: ItemId::new(row.get::<String, _>("item_id")),
                op_seq: row.get("op_seq"),
                op_hash: row.get("op_hash"),
                op_type: OpType::parse(&op_type)
                    .map_err(|e| StoreError::RowDecode(e.to_string()))?,
                updated_at: parse_datetime(&updated_at)?,
                device_id: DeviceId::new(device_id)
                    .map_err(|e| StoreError::RowDecode(e.to_string()))?,
            });
        }

        Ok(entries)
    }

    /// Highest cursor assigned to the user, or the origin when the log is
    /// empty.
    ///
    /// # Errors
    /// Returns `StoreError::QueryFailed` on database failure.
    pub async fn head_cursor(&self, user_id: &UserId) -> Result<Cursor, StoreError> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(cursor) FROM sync_oplog WHERE user_id = ?")
            .bind(user_id.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(Cursor::new(max.unwrap_or(0)))
    }
}
