//! Engine request/response payloads
//!
//! These are the values a transport layer serializes; the engine itself
//! never parses wire formats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vaultsync_core::domain::{
    BlobId, ConflictInfo, Cursor, DeviceId, OplogEntry, QuotaInfo, SyncItemRecord,
};

/// Result of a handshake: a fresh session plus where the server log stands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeResponse {
    /// The device the session was issued to, echoed back
    pub device_id: DeviceId,
    /// Opaque session token; gates blob downloads
    pub sync_token: String,
    /// Token expiry
    pub expires_at: DateTime<Utc>,
    /// The user's current head cursor; a fresh device pulls from 0 instead
    pub server_cursor: Cursor,
    /// Limits and usage at handshake time
    pub quota: QuotaInfo,
}

/// Result of a push batch
///
/// A push that loses some items to conflicts still succeeds: conflicts are
/// data, reported here per item, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    /// The user's head cursor after the batch; identical retries return
    /// the same value
    pub ack_cursor: Cursor,
    /// Items that lost the last-writer-wins check, with the server state
    pub conflicts: Vec<ConflictInfo>,
    /// Net storage bytes this batch added (negative for net deletes)
    pub applied_storage_delta: i64,
    /// Net object count this batch added
    pub applied_objects_delta: i64,
}

/// One page of replicated changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    /// Oplog entries after the requested cursor, ascending
    pub oplog: Vec<OplogEntry>,
    /// Current rows for the items the entries touch. Bodies reflect the
    /// present state, which may be newer than the entry that named them.
    pub items: Vec<SyncItemRecord>,
    /// Cursor to resume from; equals the request cursor when nothing new
    pub next_cursor: Cursor,
}

/// Result of a blob upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobUploadResponse {
    /// Server-assigned blob identifier
    pub blob_id: BlobId,
    /// Key the object was stored under (`{user_id}/{blob_id}`)
    pub object_key: String,
    /// Hex-encoded SHA-256 of the uploaded bytes
    pub sha256: String,
    /// Size of the uploaded bytes
    pub size_bytes: i64,
}

/// A downloaded blob with its recorded digest
#[derive(Debug, Clone)]
pub struct BlobDownload {
    /// The object bytes
    pub data: Vec<u8>,
    /// Hex-encoded SHA-256 recorded at upload
    pub sha256: String,
    /// MIME type recorded at upload
    pub content_type: Option<String>,
}
