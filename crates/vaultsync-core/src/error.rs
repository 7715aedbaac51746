//! Engine error taxonomy
//!
//! Every caller-visible failure maps to a stable string code via
//! [`SyncError::code`]. Conflicts are deliberately *not* represented here:
//! a losing push is a normal partial-success outcome reported in the push
//! result, not an error.

use thiserror::Error;

/// Convenience alias for engine results.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the replication engine.
///
/// The taxonomy follows three caller-actionable groups plus backend
/// failures:
/// - validation errors (`InvalidPayload`, `InvalidCursor`) - caller-fixable,
///   nothing partially applied
/// - quota errors (`Quota*Exceeded`) - carry the specific violated limit
/// - authorization (`InvalidToken`) - caller must re-handshake
/// - backend unavailability (`Storage`, `ObjectStore`, `DeviceRegistry`) -
///   fatal for the whole request, never degraded to partial state
#[derive(Debug, Error)]
pub enum SyncError {
    /// Storage usage would exceed the user's byte limit
    #[error("storage quota exceeded")]
    QuotaStorageExceeded,

    /// Object count would exceed the user's object limit
    #[error("object quota exceeded")]
    QuotaObjectExceeded,

    /// A single item or blob exceeds the per-item size limit
    #[error("item exceeds maximum size of {limit_bytes} bytes")]
    QuotaItemExceeded {
        /// The configured per-item limit
        limit_bytes: i64,
    },

    /// The user's active device count exceeds the device limit
    #[error("device quota exceeded")]
    QuotaDeviceExceeded,

    /// A pull was requested with a malformed cursor
    #[error("invalid cursor: {0}")]
    InvalidCursor(i64),

    /// A push item is missing required fields, or replays a used
    /// (device, op_seq) key with different content
    #[error("invalid sync payload: {0}")]
    InvalidPayload(String),

    /// The presented sync token does not match the stored session,
    /// or the session has expired
    #[error("invalid or expired sync token")]
    InvalidToken,

    /// The requested blob does not exist for this user
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// The relational store failed or is unavailable
    #[error("storage backend error: {0}")]
    Storage(String),

    /// The object-store backend failed or is unavailable
    #[error("object store error: {0}")]
    ObjectStore(String),

    /// The external device registry failed or is unavailable
    #[error("device registry error: {0}")]
    DeviceRegistry(String),
}

impl SyncError {
    /// Stable wire code for this error, or `None` for backend failures
    /// that clients cannot act on beyond retrying.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::QuotaStorageExceeded => Some("QUOTA_STORAGE_EXCEEDED"),
            Self::QuotaObjectExceeded => Some("QUOTA_OBJECT_EXCEEDED"),
            Self::QuotaItemExceeded { .. } => Some("QUOTA_ITEM_EXCEEDED"),
            Self::QuotaDeviceExceeded => Some("QUOTA_DEVICE_EXCEEDED"),
            Self::InvalidCursor(_) => Some("SYNC_INVALID_CURSOR"),
            Self::InvalidPayload(_) => Some("SYNC_INVALID_PAYLOAD"),
            Self::InvalidToken => Some("SYNC_INVALID_TOKEN"),
            Self::BlobNotFound(_)
            | Self::Storage(_)
            | Self::ObjectStore(_)
            | Self::DeviceRegistry(_) => None,
        }
    }

    /// True when retrying the identical request cannot succeed without the
    /// caller changing something first.
    pub fn is_caller_error(&self) -> bool {
        self.code().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            SyncError::QuotaStorageExceeded.code(),
            Some("QUOTA_STORAGE_EXCEEDED")
        );
        assert_eq!(
            SyncError::QuotaItemExceeded {
                limit_bytes: 5 * 1024 * 1024
            }
            .code(),
            Some("QUOTA_ITEM_EXCEEDED")
        );
        assert_eq!(
            SyncError::InvalidCursor(-1).code(),
            Some("SYNC_INVALID_CURSOR")
        );
        assert_eq!(SyncError::InvalidToken.code(), Some("SYNC_INVALID_TOKEN"));
        assert_eq!(SyncError::Storage("down".into()).code(), None);
    }

    #[test]
    fn backend_errors_are_not_caller_errors() {
        assert!(SyncError::QuotaDeviceExceeded.is_caller_error());
        assert!(!SyncError::ObjectStore("bucket missing".into()).is_caller_error());
    }
}
