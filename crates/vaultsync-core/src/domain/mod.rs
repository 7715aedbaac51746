//! Domain entities and replication rules
//!
//! Pure types and policy - no I/O. Adapters translate these to and from
//! their storage representations.

pub mod blob;
pub mod conflict;
pub mod item;
pub mod keyring;
pub mod newtypes;
pub mod op;
pub mod quota;
pub mod session;

pub use blob::{BlobRecord, BlobStatus};
pub use conflict::{candidate_wins, ConflictInfo};
pub use item::SyncItemRecord;
pub use keyring::KeyringEntry;
pub use newtypes::{BlobId, Cursor, DeviceId, ItemId, UserId};
pub use op::{OpType, OplogEntry, SyncItemInput};
pub use quota::{QuotaDelta, QuotaInfo, QuotaLimits, QuotaUsage};
pub use session::SyncSession;
