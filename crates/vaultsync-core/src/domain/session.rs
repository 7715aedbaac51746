//! Per-device sync sessions
//!
//! One session row per (user, device). The token is single-valued: a new
//! handshake replaces whatever token was outstanding for that device.
//! Push is authenticated independently and never consults the session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{Cursor, DeviceId, UserId};

/// A short-lived sync session issued at handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSession {
    /// Owning user
    pub user_id: UserId,
    /// Device the session belongs to
    pub device_id: DeviceId,
    /// Opaque random token; gates blob downloads
    pub sync_token: String,
    /// Expiry timestamp
    pub expires_at: DateTime<Utc>,
    /// Last cursor the device acknowledged
    pub last_cursor: Cursor,
}

impl SyncSession {
    /// True when the session has expired at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Constant-length-agnostic exact token comparison
    ///
    /// Tokens are random UUIDs, not secrets derived from user input, so a
    /// plain equality check is sufficient here.
    #[must_use]
    pub fn token_matches(&self, presented: &str) -> bool {
        self.sync_token == presented
    }
}
