//! Latest-state item projection
//!
//! One record per (user, item) holding the winning operation seen so far.
//! Deleted items stay as tombstoned rows so deletes replicate to devices
//! that have not pulled yet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{DeviceId, ItemId};

/// Current server-side state of a logical item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncItemRecord {
    /// Logical item identifier
    pub item_id: ItemId,
    /// Application-defined item kind
    #[serde(rename = "type")]
    pub item_type: String,
    /// Payload schema version
    pub schema_version: i64,
    /// Inline opaque ciphertext, if the payload is small enough
    pub payload_enc: Option<String>,
    /// Blob key reference for out-of-band payloads
    pub payload_ref: Option<String>,
    /// Unencrypted structured metadata; opaque to the engine
    pub meta_plain: Option<serde_json::Value>,
    /// Payload size in bytes
    pub payload_size: Option<i64>,
    /// Timestamp of the winning operation
    pub updated_at: DateTime<Utc>,
    /// Tombstone timestamp; `Some` means logically deleted
    pub deleted_at: Option<DateTime<Utc>>,
    /// Device that wrote the winning state
    pub device_id: Option<DeviceId>,
}

impl SyncItemRecord {
    /// True when the item is live (not tombstoned)
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Size counted against the storage quota: tombstones hold no payload
    #[must_use]
    pub fn accounted_size(&self) -> i64 {
        if self.is_live() {
            self.payload_size.unwrap_or(0).max(0)
        } else {
            0
        }
    }
}
