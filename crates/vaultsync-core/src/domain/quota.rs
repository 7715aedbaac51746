//! Quota limits, usage and signed deltas
//!
//! Usage is advisory and eventually exact: it moves by signed deltas after
//! each accepted mutation, and the device count is reconciled against the
//! authoritative device registry rather than derived purely from deltas.

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Per-user resource limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    /// Total payload bytes across live items and blobs
    pub storage_limit_bytes: i64,
    /// Number of live objects
    pub object_limit: i64,
    /// Maximum size of a single item or blob
    pub item_limit: i64,
    /// Maximum number of active devices
    pub device_limit: i64,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            storage_limit_bytes: 1024 * 1024 * 1024,
            object_limit: 50_000,
            item_limit: 5 * 1024 * 1024,
            device_limit: 3,
        }
    }
}

/// Current per-user resource usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    /// Payload bytes currently counted
    pub used_storage_bytes: i64,
    /// Live objects currently counted
    pub used_objects: i64,
    /// Active devices, reconciled from the device registry
    pub used_devices: i64,
}

/// Limits plus live usage, as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaInfo {
    /// Configured limits
    pub limits: QuotaLimits,
    /// Current usage
    pub usage: QuotaUsage,
}

impl QuotaInfo {
    /// Check a prospective mutation against limits and current usage.
    ///
    /// Check order is fixed: per-item size first (an oversized item is
    /// rejected even when net usage would still fit), then device count,
    /// then storage bytes, then object count. The first violated limit is
    /// returned. The check is advisory: it is not serialized against
    /// concurrent pushes from other devices.
    ///
    /// # Errors
    /// Returns the `Quota*Exceeded` variant of the first violated limit.
    pub fn validate_delta(
        &self,
        storage_delta: i64,
        objects_delta: i64,
        item_size: Option<i64>,
    ) -> Result<(), SyncError> {
        if let Some(size) = item_size {
            if size > self.limits.item_limit {
                return Err(SyncError::QuotaItemExceeded {
                    limit_bytes: self.limits.item_limit,
                });
            }
        }
        if self.usage.used_devices > self.limits.device_limit {
            return Err(SyncError::QuotaDeviceExceeded);
        }
        if self.usage.used_storage_bytes + storage_delta > self.limits.storage_limit_bytes {
            return Err(SyncError::QuotaStorageExceeded);
        }
        if self.usage.used_objects + objects_delta > self.limits.object_limit {
            return Err(SyncError::QuotaObjectExceeded);
        }
        Ok(())
    }
}

/// Signed change in storage bytes and object count attributable to one or
/// more applied operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDelta {
    /// Byte delta (negative for deletes and shrinking items)
    pub storage_bytes: i64,
    /// Object-count delta
    pub objects: i64,
}

impl QuotaDelta {
    /// A delta that changes nothing
    pub const ZERO: QuotaDelta = QuotaDelta {
        storage_bytes: 0,
        objects: 0,
    };

    /// Build a delta
    #[must_use]
    pub const fn new(storage_bytes: i64, objects: i64) -> Self {
        Self {
            storage_bytes,
            objects,
        }
    }

    /// Fold another delta into this one
    pub fn accumulate(&mut self, other: QuotaDelta) {
        self.storage_bytes += other.storage_bytes;
        self.objects += other.objects;
    }

    /// True when applying this delta would be a no-op
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.storage_bytes == 0 && self.objects == 0
    }
}
