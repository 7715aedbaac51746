//! Device keyring entries
//!
//! The engine stores wrapped key material so a device can recover its
//! decryption capability after reinstalling. The material is opaque
//! ciphertext end to end; the engine never performs cryptography on it
//! beyond hashing recovery codes at rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{DeviceId, UserId};

/// One wrapped key per (user, device, key_type)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyringEntry {
    /// Owning user
    pub user_id: UserId,
    /// Device that registered the key
    pub device_id: DeviceId,
    /// Application-defined key kind (e.g. "master", "recovery")
    pub key_type: String,
    /// Opaque encrypted key material
    pub encrypted_key: String,
    /// Salted hash of the recovery code, when one was registered
    pub recovery_code_hash: Option<String>,
    /// Last rotation timestamp
    pub rotated_at: Option<DateTime<Utc>>,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}
