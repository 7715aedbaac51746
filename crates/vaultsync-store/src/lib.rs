//! VaultSync Store - SQLite persistence for sync state
//!
//! SQLite-based storage for:
//! - The append-only per-user oplog (cursor assignment, range scans)
//! - The latest-state item projection with last-writer-wins upserts
//! - The quota ledger (limits, delta-maintained usage)
//! - Per-device sync sessions
//! - Blob metadata and device keyring rows
//!
//! ## Architecture
//!
//! This crate is a driven (secondary) adapter in the hexagonal
//! architecture: `vaultsync-engine` orchestrates these stores, and the
//! domain rules they enforce live in `vaultsync-core`. Schema setup runs
//! once, explicitly, when the [`DatabasePool`] is constructed - never as a
//! checked flag on the request path.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use vaultsync_store::{DatabasePool, OplogStore};
//!
//! # async fn example() -> Result<(), vaultsync_store::StoreError> {
//! let pool = DatabasePool::open(Path::new("/var/lib/vaultsync/sync.db")).await?;
//! let oplog = OplogStore::new(pool.pool().clone());
//! # Ok(())
//! # }
//! ```

pub mod blobs;
pub mod items;
pub mod keyring;
pub mod oplog;
pub mod pool;
pub mod quota;
pub mod session;

pub use blobs::BlobMetaStore;
pub use items::{ItemHead, ItemStore, UpsertOutcome};
pub use keyring::KeyringStore;
pub use oplog::{AppendOutcome, OplogStore};
pub use pool::DatabasePool;
pub use quota::QuotaStore;
pub use session::SessionStore;

use chrono::{DateTime, Utc};

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to establish a database connection
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be mapped back to a domain type
    #[error("row decode error: {0}")]
    RowDecode(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}

/// Parse an RFC 3339 timestamp column
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::RowDecode(format!("bad timestamp '{s}': {e}")))
}

/// Parse an optional RFC 3339 timestamp column
pub(crate) fn parse_optional_datetime(
    s: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    match s {
        Some(ref value) if !value.is_empty() => parse_datetime(value).map(Some),
        _ => Ok(None),
    }
}
