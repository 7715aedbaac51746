//! Quota ledger persistence
//!
//! One row per user, created lazily with default limits on first touch.
//! Storage and object usage move by signed deltas; the device count is
//! overwritten from the device registry on every read so it never drifts.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use vaultsync_core::domain::{QuotaDelta, QuotaInfo, QuotaLimits, QuotaUsage, UserId};

use crate::StoreError;

/// Store for per-user quota rows
pub struct QuotaStore {
    pool: SqlitePool,
}

impl QuotaStore {
    /// Creates a new quota store on the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Loads the user's quota row, creating it with `defaults` when absent.
    ///
    /// `observed_devices` comes from the device registry and replaces the
    /// stored device count on every call - device usage is reconciled, not
    /// delta-maintained.
    ///
    /// # Errors
    /// Returns `StoreError` on database failure.
    pub async fn get_or_init(
        &self,
        user_id: &UserId,
        observed_devices: i64,
        defaults: &QuotaLimits,
    ) -> Result<QuotaInfo, StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO sync_quotas \
             (user_id, storage_limit_bytes, object_limit, item_limit, device_limit, \
              used_storage_bytes, used_objects, used_devices, updated_at) \
             VALUES (?, ?, ?, ?, ?, 0, 0, 0, ?)",
        )
        .bind(user_id.as_str())
        .bind(defaults.storage_limit_bytes)
        .bind(defaults.object_limit)
        .bind(defaults.item_limit)
        .bind(defaults.device_limit)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE sync_quotas SET used_devices = ? WHERE user_id = ?")
            .bind(observed_devices)
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await?;

        let row = sqlx::query(
            "SELECT storage_limit_bytes, object_limit, item_limit, device_limit, \
                    used_storage_bytes, used_objects, used_devices \
             FROM sync_quotas WHERE user_id = ?",
        )
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(QuotaInfo {
            limits: QuotaLimits {
                storage_limit_bytes: row.get("storage_limit_bytes"),
                object_limit: row.get("object_limit"),
                item_limit: row.get("item_limit"),
                device_limit: row.get("device_limit"),
            },
            usage: QuotaUsage {
                used_storage_bytes: row.get("used_storage_bytes"),
                used_objects: row.get("used_objects"),
                used_devices: row.get("used_devices"),
            },
        })
    }

    /// Applies a signed usage delta, clamping both counters at zero.
    ///
    /// The clamp keeps a repeated negative delta (a replayed delete) from
    /// driving usage below reality; it can only ever over-count, never
    /// under-count.
    ///
    /// # Errors
    /// Returns `StoreError::QueryFailed` on database failure.
    pub async fn apply_delta(
        &self,
        user_id: &UserId,
        delta: QuotaDelta,
    ) -> Result<(), StoreError> {
        if delta.is_zero() {
            return Ok(());
        }

        sqlx::query(
            "UPDATE sync_quotas SET \
               used_storage_bytes = MAX(0, used_storage_bytes + ?), \
               used_objects = MAX(0, used_objects + ?), \
               updated_at = ? \
             WHERE user_id = ?",
        )
        .bind(delta.storage_bytes)
        .bind(delta.objects)
        .bind(Utc::now().to_rfc3339())
        .bind(user_id.as_str())
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            user_id = %user_id,
            storage_delta = delta.storage_bytes,
            objects_delta = delta.objects,
            "quota usage updated"
        );

        Ok(())
    }

    /// Overwrites the user's limits, creating the row when absent
    ///
    /// # Errors
    /// Returns `StoreError::QueryFailed` on database failure.
    pub async fn set_limits(
        &self,
        user_id: &UserId,
        limits: &QuotaLimits,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sync_quotas \
             (user_id, storage_limit_bytes, object_limit, item_limit, device_limit, \
              used_storage_bytes, used_objects, used_devices, updated_at) \
             VALUES (?, ?, ?, ?, ?, 0, 0, 0, ?) \
             ON CONFLICT (user_id) DO UPDATE SET \
               storage_limit_bytes = excluded.storage_limit_bytes, \
               object_limit = excluded.object_limit, \
               item_limit = excluded.item_limit, \
               device_limit = excluded.device_limit, \
               updated_at = excluded.updated_at",
        )
        .bind(user_id.as_str())
        .bind(limits.storage_limit_bytes)
        .bind(limits.object_limit)
        .bind(limits.item_limit)
        .bind(limits.device_limit)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
