//! VaultSync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `SyncItemRecord`, `OplogEntry`, `QuotaInfo`, `SyncSession`, `BlobRecord`
//! - **Conflict policy** - whole-item last-writer-wins with a deterministic device-id tie-break
//! - **Port definitions** - Traits for adapters: `ObjectStore`, `DeviceRegistry`
//! - **Error taxonomy** - `SyncError` with the stable wire codes clients branch on
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure replication logic with no I/O.
//! Ports define trait interfaces that adapter crates implement.
//! The protocol coordinator in `vaultsync-engine` orchestrates domain
//! entities through port interfaces.

pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

pub use error::{SyncError, SyncResult};
