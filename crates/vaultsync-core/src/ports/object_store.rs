//! Object store port (driven/secondary port)
//!
//! The backend is assumed to provide durable put/get by key and nothing
//! more. Keys are opaque strings of the form `{user_id}/{blob_id}`.
//!
//! Uses `anyhow::Result` because failures are adapter-specific (filesystem,
//! S3-compatible bucket, ...) and need no domain-level classification; the
//! engine converts them to `SyncError::ObjectStore` at its seam.

use async_trait::async_trait;

/// Durable put/get-by-key storage for blob payloads
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object, overwriting any existing value at `key`
    async fn put(&self, key: &str, data: &[u8], content_type: Option<&str>)
        -> anyhow::Result<()>;

    /// Read an object; `None` when the key does not exist
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
}
