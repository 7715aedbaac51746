//! Operation types: push inputs and oplog entries
//!
//! The oplog is the source of truth for replication ordering and
//! idempotency. Entries are append-only; the item store is the only
//! mutable projection of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{Cursor, DeviceId, ItemId};
use crate::error::SyncError;

/// The kind of operation a client pushes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    /// Whole-item write (create or replace)
    Upsert,
    /// Tombstone write - the row is retained for replication
    Delete,
}

impl OpType {
    /// Storage representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }

    /// Parse the storage representation
    ///
    /// # Errors
    /// Returns `SyncError::InvalidPayload` for unknown values
    pub fn parse(s: &str) -> Result<Self, SyncError> {
        match s {
            "upsert" => Ok(Self::Upsert),
            "delete" => Ok(Self::Delete),
            other => Err(SyncError::InvalidPayload(format!(
                "unknown op type: {other}"
            ))),
        }
    }
}

/// One item in a push batch, as submitted by a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncItemInput {
    /// Logical item identifier
    pub item_id: ItemId,
    /// Application-defined item kind
    #[serde(rename = "type")]
    pub item_type: String,
    /// Payload schema version for forward-compatible evolution
    pub schema_version: i64,
    /// Inline opaque ciphertext, for small payloads
    #[serde(default)]
    pub payload_enc: Option<String>,
    /// Blob key reference, for payloads above the inline threshold
    #[serde(default)]
    pub payload_ref: Option<String>,
    /// Unencrypted structured metadata; opaque to the engine
    #[serde(default)]
    pub meta_plain: Option<serde_json::Value>,
    /// Payload size in bytes, for quota accounting
    #[serde(default)]
    pub payload_size: Option<i64>,
    /// Caller-supplied modification timestamp
    pub updated_at: DateTime<Utc>,
    /// Tombstone timestamp; set server-side for delete ops when absent
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Device-local strictly increasing sequence number
    pub op_seq: i64,
    /// Client-computed content fingerprint of the operation
    pub op_hash: String,
    /// Operation kind
    pub op_type: OpType,
}

impl SyncItemInput {
    /// Payload size used for accounting (absent or negative counts as zero)
    #[must_use]
    pub fn accounted_size(&self) -> i64 {
        self.payload_size.unwrap_or(0).max(0)
    }

    /// Check the fields the protocol requires before any mutation
    ///
    /// # Errors
    /// Returns `SyncError::InvalidPayload` naming the offending field.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.item_id.is_empty() {
            return Err(SyncError::InvalidPayload("item_id is required".into()));
        }
        if self.item_type.is_empty() {
            return Err(SyncError::InvalidPayload("type is required".into()));
        }
        if self.op_hash.is_empty() {
            return Err(SyncError::InvalidPayload("op_hash is required".into()));
        }
        if self.op_seq < 1 {
            return Err(SyncError::InvalidPayload(format!(
                "op_seq must be positive, got {}",
                self.op_seq
            )));
        }
        Ok(())
    }
}

/// One accepted operation in the per-user log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OplogEntry {
    /// Server-assigned position, strictly increasing per user
    pub cursor: Cursor,
    /// Item the operation touched
    pub item_id: ItemId,
    /// Device-local sequence number
    pub op_seq: i64,
    /// Client-computed content fingerprint
    pub op_hash: String,
    /// Operation kind
    pub op_type: OpType,
    /// Caller-supplied modification timestamp
    pub updated_at: DateTime<Utc>,
    /// Originating device
    pub device_id: DeviceId,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(item_id: &str, op_seq: i64, op_hash: &str) -> SyncItemInput {
        SyncItemInput {
            item_id: item_id.into(),
            item_type: "note".into(),
            schema_version: 1,
            payload_enc: Some("enc".into()),
            payload_ref: None,
            meta_plain: None,
            payload_size: Some(12),
            updated_at: Utc::now(),
            deleted_at: None,
            op_seq,
            op_hash: op_hash.into(),
            op_type: OpType::Upsert,
        }
    }

    #[test]
    fn op_type_roundtrip() {
        assert_eq!(OpType::parse("upsert").unwrap(), OpType::Upsert);
        assert_eq!(OpType::parse("delete").unwrap(), OpType::Delete);
        assert!(OpType::parse("merge").is_err());
    }

    #[test]
    fn validate_accepts_complete_input() {
        assert!(input("note-1", 1, "h1").validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_fields() {
        assert!(input("", 1, "h1").validate().is_err());
        assert!(input("note-1", 0, "h1").validate().is_err());
        assert!(input("note-1", 1, "").validate().is_err());

        let mut no_type = input("note-1", 1, "h1");
        no_type.item_type = String::new();
        assert!(no_type.validate().is_err());
    }

    #[test]
    fn accounted_size_clamps() {
        let mut item = input("note-1", 1, "h1");
        assert_eq!(item.accounted_size(), 12);
        item.payload_size = None;
        assert_eq!(item.accounted_size(), 0);
        item.payload_size = Some(-5);
        assert_eq!(item.accounted_size(), 0);
    }
}
