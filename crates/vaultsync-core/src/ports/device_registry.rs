//! Device registry port (driven/secondary port)
//!
//! Device enrollment lives with the identity layer (an external
//! collaborator). The quota ledger only needs the authoritative count of
//! active devices to reconcile its `used_devices` figure, so that is the
//! whole interface.

use async_trait::async_trait;

use crate::domain::UserId;

/// Read side of the authoritative device registry
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Number of currently active devices for the user
    async fn count_active_devices(&self, user_id: &UserId) -> anyhow::Result<i64>;
}

/// Registry stub reporting a fixed device count
///
/// Useful for deployments where device enrollment is not wired up yet, and
/// for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticDeviceRegistry(pub i64);

#[async_trait]
impl DeviceRegistry for StaticDeviceRegistry {
    async fn count_active_devices(&self, _user_id: &UserId) -> anyhow::Result<i64> {
        Ok(self.0)
    }
}
