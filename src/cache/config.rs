//! Cache configuration.
//!
//! Controls expiry of the like cache entries via `plaudit.toml`.

use std::time::Duration;

// Default values for cache configuration
const DEFAULT_COUNTER_TTL_SECS: u64 = 5 * 60;
const DEFAULT_MEMBERSHIP_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_DIRTY_TTL_SECS: u64 = 60 * 60;

/// Expiry policy of the like cache, built from the `[cache]` settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of an item counter, refreshed on every hit.
    pub counter_ttl_seconds: u64,
    /// Lifetime of an actor membership map, refreshed on every hit.
    pub membership_ttl_seconds: u64,
    /// Lifetime of the dirty set, refreshed on every toggle.
    pub dirty_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            counter_ttl_seconds: DEFAULT_COUNTER_TTL_SECS,
            membership_ttl_seconds: DEFAULT_MEMBERSHIP_TTL_SECS,
            dirty_ttl_seconds: DEFAULT_DIRTY_TTL_SECS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            counter_ttl_seconds: settings.counter_ttl.as_secs(),
            membership_ttl_seconds: settings.membership_ttl.as_secs(),
            dirty_ttl_seconds: settings.dirty_ttl.as_secs(),
        }
    }
}

impl CacheConfig {
    pub fn counter_ttl(&self) -> Duration {
        Duration::from_secs(self.counter_ttl_seconds.max(1))
    }

    pub fn membership_ttl(&self) -> Duration {
        Duration::from_secs(self.membership_ttl_seconds.max(1))
    }

    pub fn dirty_ttl(&self) -> Duration {
        Duration::from_secs(self.dirty_ttl_seconds.max(1))
    }
}
