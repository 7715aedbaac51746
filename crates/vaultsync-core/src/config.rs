//! Configuration for the VaultSync engine.
//!
//! Typed configuration with serde support and sensible defaults. The
//! transport layer owns request parsing and routing configuration; only
//! the knobs the engine itself consults live here.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::QuotaLimits;

/// Engine-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Limits assigned to a user on first contact
    pub default_limits: QuotaLimits,
    /// Sync token lifetime in hours (default: 7 days)
    pub token_ttl_hours: i64,
    /// Hard cap on oplog entries returned per pull
    pub pull_page_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_limits: QuotaLimits::default(),
            token_ttl_hours: 24 * 7,
            pull_page_limit: 200,
        }
    }
}

impl EngineConfig {
    /// Token lifetime as a chrono duration
    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        Duration::hours(self.token_ttl_hours)
    }
}
