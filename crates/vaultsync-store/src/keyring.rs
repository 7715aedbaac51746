//! Device keyring rows
//!
//! Wrapped key material per (user, device, key_type). Registration upserts;
//! rotation replaces the ciphertext in place while keeping the recovery
//! code hash unless a new one is supplied.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use vaultsync_core::domain::{DeviceId, KeyringEntry, UserId};

use crate::{parse_datetime, parse_optional_datetime, StoreError};

/// Store for wrapped device keys
pub struct KeyringStore {
    pool: SqlitePool,
}

impl KeyringStore {
    /// Creates a new keyring store on the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Registers (or re-registers) a wrapped key for a device.
    ///
    /// Omitting `recovery_code_hash` on re-registration keeps the stored
    /// hash, so a reinstall does not silently discard the user's recovery
    /// path.
    ///
    /// # Errors
    /// Returns `StoreError::QueryFailed` on database failure.
    pub async fn register(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        key_type: &str,
        encrypted_key: &str,
        recovery_code_hash: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sync_keyrings \
             (user_id, device_id, key_type, encrypted_key, recovery_code_hash, rotated_at, created_at) \
             VALUES (?, ?, ?, ?, ?, NULL, ?) \
             ON CONFLICT (user_id, device_id, key_type) DO UPDATE SET \
               encrypted_key = excluded.encrypted_key, \
               recovery_code_hash = COALESCE(excluded.recovery_code_hash, sync_keyrings.recovery_code_hash)",
        )
        .bind(user_id.as_str())
        .bind(device_id.as_str())
        .bind(key_type)
        .bind(encrypted_key)
        .bind(recovery_code_hash)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Rotates the wrapped key in place, stamping `rotated_at`.
    ///
    /// Returns false when no key of this type exists for the device.
    ///
    /// # Errors
    /// Returns `StoreError::QueryFailed` on database failure.
    pub async fn rotate(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        key_type: &str,
        encrypted_key: &str,
        recovery_code_hash: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE sync_keyrings SET \
               encrypted_key = ?, \
               recovery_code_hash = COALESCE(?, recovery_code_hash), \
               rotated_at = ? \
             WHERE user_id = ? AND device_id = ? AND key_type = ?",
        )
        .bind(encrypted_key)
        .bind(recovery_code_hash)
        .bind(Utc::now().to_rfc3339())
        .bind(user_id.as_str())
        .bind(device_id.as_str())
        .bind(key_type)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Loads the wrapped key for a device, if registered
    ///
    /// # Errors
    /// Returns `StoreError` on database failure or an undecodable row.
    pub async fn get(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        key_type: &str,
    ) -> Result<Option<KeyringEntry>, StoreError> {
        let row = sqlx::query(
            "SELECT encrypted_key, recovery_code_hash, rotated_at, created_at \
             FROM sync_keyrings WHERE user_id = ? AND device_id = ? AND key_type = ?",
        )
        .bind(user_id.as_str())
        .bind(device_id.as_str())
        .bind(key_type)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let created_at: String = row.get("created_at");
        let rotated_at: Option<String> = row.get("rotated_at");

        Ok(Some(KeyringEntry {
            user_id: user_id.clone(),
            device_id: device_id.clone(),
            key_type: key_type.to_string(),
            encrypted_key: row.get("encrypted_key"),
            recovery_code_hash: row.get("recovery_code_hash"),
            rotated_at: parse_optional_datetime(rotated_at)?,
            created_at: parse_datetime(&created_at)?,
        }))
    }
}
