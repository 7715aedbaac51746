//! Blob metadata
//!
//! Large opaque payloads live in the object store; the engine records one
//! metadata row per (user, blob). Blobs are immutable once ready - items
//! reference them through `payload_ref`, never edit them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::BlobId;
use crate::error::SyncError;

/// Lifecycle state of a blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobStatus {
    /// The backing object write succeeded; the blob is immutable
    Ready,
}

impl BlobStatus {
    /// Storage representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
        }
    }

    /// Parse the storage representation
    ///
    /// # Errors
    /// Returns `SyncError::Storage` for unknown values (a corrupt row, not
    /// a caller mistake)
    pub fn parse(s: &str) -> Result<Self, SyncError> {
        match s {
            "ready" => Ok(Self::Ready),
            other => Err(SyncError::Storage(format!("unknown blob status: {other}"))),
        }
    }
}

/// Metadata for one content-addressed blob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobRecord {
    /// Blob identifier
    pub blob_id: BlobId,
    /// Key in the object store: `{user_id}/{blob_id}`
    pub object_key: String,
    /// Hex-encoded SHA-256 of the full payload
    pub sha256: String,
    /// Payload size in bytes
    pub size_bytes: i64,
    /// MIME type supplied at upload
    pub content_type: Option<String>,
    /// Upload timestamp
    pub created_at: DateTime<Utc>,
    /// Lifecycle state
    pub status: BlobStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        assert_eq!(BlobStatus::parse("ready").unwrap(), BlobStatus::Ready);
        assert!(BlobStatus::parse("pending").is_err());
    }
}
