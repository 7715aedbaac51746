//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the identifiers the engine passes around.
//! User, device and item ids are produced by external collaborators
//! (authentication, the client) and are opaque here beyond being non-empty;
//! validation happens once at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SyncError;

/// Authenticated user identifier, supplied out-of-band by the identity layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Create a new UserId
    ///
    /// # Errors
    /// Returns `SyncError::InvalidPayload` if the id is empty
    pub fn new(id: impl Into<String>) -> Result<Self, SyncError> {
        let id = id.into();
        if id.is_empty() {
            return Err(SyncError::InvalidPayload("user id cannot be empty".into()));
        }
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = SyncError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// Device identifier within a user's account
///
/// Ordering is derived from the inner string: the lexicographic comparison
/// is the deterministic tie-break of the last-writer-wins policy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new DeviceId
    ///
    /// # Errors
    /// Returns `SyncError::InvalidPayload` if the id is empty
    pub fn new(id: impl Into<String>) -> Result<Self, SyncError> {
        let id = id.into();
        if id.is_empty() {
            return Err(SyncError::InvalidPayload(
                "device id cannot be empty".into(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = SyncError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

/// Logical item identifier, chosen by the client
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Create a new ItemId (empty ids are caught by push validation,
    /// not here, so deserialization of server rows never fails)
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id is empty (invalid for push)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Server-assigned oplog position, strictly increasing per user
///
/// Cursor 0 is the origin: it precedes every assigned cursor and is what a
/// fresh device pulls from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cursor(i64);

impl Cursor {
    /// The origin cursor, before any oplog entry
    pub const ORIGIN: Cursor = Cursor(0);

    /// Wrap a raw cursor value
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw value
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Cursor {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Identifier for an uploaded blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(Uuid);

impl BlobId {
    /// Create a new random BlobId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a BlobId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BlobId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for BlobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BlobId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::InvalidPayload(format!("invalid blob id: {e}")))
    }
}
