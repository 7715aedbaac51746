//! Last-writer-wins conflict policy
//!
//! The engine never merges: an incoming operation either replaces the
//! stored item wholesale or loses. The decision is deterministic so every
//! replica converges on the same winner regardless of arrival order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{DeviceId, ItemId};

/// Decide whether a candidate write replaces the existing item state.
///
/// The candidate wins when its `updated_at` is strictly newer, or equal
/// with a lexicographically greater device id. A server row without a
/// recorded device id always loses the tie-break.
#[must_use]
pub fn candidate_wins(
    candidate_updated_at: DateTime<Utc>,
    candidate_device: &DeviceId,
    existing_updated_at: DateTime<Utc>,
    existing_device: Option<&DeviceId>,
) -> bool {
    if candidate_updated_at > existing_updated_at {
        return true;
    }
    if candidate_updated_at < existing_updated_at {
        return false;
    }
    match existing_device {
        None => true,
        Some(existing) => candidate_device > existing,
    }
}

/// Server state reported back for a losing push item
///
/// Not an error: conflicts travel alongside applied items in the push
/// result so the client can re-fetch and decide whether to retry with a
/// newer timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictInfo {
    /// Item the candidate lost on
    pub item_id: ItemId,
    /// The winning (server-side) timestamp
    pub server_updated_at: DateTime<Utc>,
    /// The device that wrote the winning state, if recorded
    pub server_device_id: Option<DeviceId>,
}
