//! VaultSync Blob - object store adapters for blob payloads
//!
//! Implementations of the `ObjectStore` port from `vaultsync-core`:
//! - [`FsObjectStore`]: objects as files under a root directory, one
//!   subdirectory per user
//! - [`MemoryObjectStore`]: in-process map, for tests and ephemeral setups
//!
//! Also home to [`sha256_hex`], the digest the engine records for every
//! uploaded blob.

pub mod fs;
pub mod memory;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a payload
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn sha256_hex_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
