//! Plaudit like cache.
//!
//! A [`CacheStore`] backend (Redis in production, [`MemoryCacheStore`] for a
//! single node and tests) wrapped by [`LikeCache`], which owns the key layout
//! and the TTL policy:
//!
//! ```toml
//! [cache]
//! backend = "redis"
//! redis_url = "redis://127.0.0.1:6379"
//! counter_ttl_seconds = 300
//! membership_ttl_seconds = 86400
//! dirty_ttl_seconds = 3600
//! ```

mod config;
mod keys;
mod likes;
mod lock;
mod memory;
mod redis;
mod store;

pub use self::config::CacheConfig;
pub use self::keys::{LikeKey, MEMBERSHIP_LOADED_FIELD, item_member};
pub use self::likes::{CounterAdjust, DirtySnapshot, LikeCache};
pub use self::memory::MemoryCacheStore;
pub use self::redis::RedisCacheStore;
pub use self::store::{CacheError, CacheOp, CacheResult, CacheStore};
