//! VaultSync Engine - the sync protocol coordinator
//!
//! Keeps a user's devices consistent through an append-only per-user oplog,
//! cursor-based pull, last-writer-wins pushes, quota accounting, and
//! content-addressed blob storage behind per-device sessions.
//!
//! ## Architecture
//!
//! The engine is the application core of a hexagonal layout:
//! - domain rules and ports in `vaultsync-core`
//! - SQLite persistence in `vaultsync-store`
//! - object-store adapters in `vaultsync-blob`
//!
//! The transport layer (not part of this workspace) authenticates the
//! caller, parses requests into the types in [`messages`], and calls the
//! [`SyncEngine`].
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use vaultsync_blob::FsObjectStore;
//! use vaultsync_core::config::EngineConfig;
//! use vaultsync_core::domain::{DeviceId, UserId};
//! use vaultsync_core::ports::device_registry::StaticDeviceRegistry;
//! use vaultsync_engine::SyncEngine;
//! use vaultsync_store::DatabasePool;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::open(Path::new("/var/lib/vaultsync/sync.db")).await?;
//! let objects = Arc::new(FsObjectStore::new("/var/lib/vaultsync/objects")?);
//! let engine = SyncEngine::new(
//!     &pool,
//!     objects,
//!     Arc::new(StaticDeviceRegistry(1)),
//!     EngineConfig::default(),
//! );
//!
//! let user = UserId::new("user-1")?;
//! let device = DeviceId::new("laptop")?;
//! let session = engine.handshake(&user, &device).await?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod messages;

pub use engine::SyncEngine;
pub use messages::{
    BlobDownload, BlobUploadResponse, HandshakeResponse, PullResponse, PushResponse,
};
