//! Per-device sync session rows
//!
//! One row per (user, device); a fresh handshake overwrites the previous
//! token and expiry in place.

use sqlx::{Row, SqlitePool};

use vaultsync_core::domain::{Cursor, DeviceId, SyncSession, UserId};

use crate::{parse_datetime, StoreError};

/// Store for handshake-issued sync sessions
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    /// Creates a new session store on the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Writes the session, replacing any previous one for the device
    ///
    /// # Errors
    /// Returns `StoreError::QueryFailed` on database failure.
    pub async fn upsert(&self, session: &SyncSession) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sync_sessions (user_id, device_id, sync_token, expires_at, last_cursor) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (user_id, device_id) DO UPDATE SET \
               sync_token = excluded.sync_token, \
               expires_at = excluded.expires_at, \
               last_cursor = excluded.last_cursor",
        )
        .bind(session.user_id.as_str())
        .bind(session.device_id.as_str())
        .bind(&session.sync_token)
        .bind(session.expires_at.to_rfc3339())
        .bind(session.last_cursor.value())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Loads the session for a device, if one exists
    ///
    /// # Errors
    /// Returns `StoreError` on database failure or an undecodable row.
    pub async fn get(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
    ) -> Result<Option<SyncSession>, StoreError> {
        let row = sqlx::query(
            "SELECT sync_token, expires_at, last_cursor \
             FROM sync_sessions WHERE user_id = ? AND device_id = ?",
        )
        .bind(user_id.as_str())
        .bind(device_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: String = row.get("expires_at");
        Ok(Some(SyncSession {
            user_id: user_id.clone(),
            device_id: device_id.clone(),
            sync_token: row.get("sync_token"),
            expires_at: parse_datetime(&expires_at)?,
            last_cursor: Cursor::new(row.get::<i64, _>("last_cursor")),
        }))
    }

    /// Records the highest cursor the device has pulled through.
    ///
    /// The stored value never moves backwards; a stale pull leaves it
    /// untouched.
    ///
    /// # Errors
    /// Returns `StoreError::QueryFailed` on database failure.
    pub async fn advance_cursor(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        cursor: Cursor,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE sync_sessions SET last_cursor = MAX(last_cursor, ?) \
             WHERE user_id = ? AND device_id = ?",
        )
        .bind(cursor.value())
        .bind(user_id.as_str())
        .bind(device_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
