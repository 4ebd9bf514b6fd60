//! Cache backend contract.
//!
//! A backend stores four primitive structures (counters, hashes used as
//! membership maps, sorted sets, plain sets) and knows nothing about likes.
//! Reads are individual calls; every mutation goes through [`CacheStore::batch`]
//! so callers can group related writes into one round trip.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache call timed out after {0:?}")]
    Timeout(Duration),
    #[error("cache key `{key}` holds a different structure")]
    WrongType { key: String },
    #[error("increment of cache key `{key}` would overflow")]
    Overflow { key: String },
}

impl CacheError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// One mutation against the cache backend.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheOp {
    SetCounter {
        key: String,
        value: i64,
        ttl: Duration,
    },
    IncrCounter {
        key: String,
        delta: i64,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
    Delete {
        key: String,
    },
    MapInsert {
        key: String,
        fields: Vec<String>,
    },
    MapRemove {
        key: String,
        field: String,
    },
    RankIncr {
        key: String,
        member: String,
        delta: f64,
    },
    RankSet {
        key: String,
        member: String,
        score: f64,
    },
    RankRemove {
        key: String,
        member: String,
    },
    SetAdd {
        key: String,
        member: String,
    },
    SetRemove {
        key: String,
        members: Vec<String>,
    },
}

impl CacheOp {
    /// Key the operation touches.
    pub fn key(&self) -> &str {
        match self {
            CacheOp::SetCounter { key, .. }
            | CacheOp::IncrCounter { key, .. }
            | CacheOp::Expire { key, .. }
            | CacheOp::Delete { key }
            | CacheOp::MapInsert { key, .. }
            | CacheOp::MapRemove { key, .. }
            | CacheOp::RankIncr { key, .. }
            | CacheOp::RankSet { key, .. }
            | CacheOp::RankRemove { key, .. }
            | CacheOp::SetAdd { key, .. }
            | CacheOp::SetRemove { key, .. } => key,
        }
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a counter; `None` when the key is absent or expired.
    async fn get_counter(&self, key: &str) -> CacheResult<Option<i64>>;

    /// Presence of each field in a hash, in request order. A missing hash
    /// reports every field as absent.
    async fn map_contains(&self, key: &str, fields: &[String]) -> CacheResult<Vec<bool>>;

    /// Highest-scored members, best first.
    async fn rank_top(&self, key: &str, limit: usize) -> CacheResult<Vec<(String, f64)>>;

    async fn rank_score(&self, key: &str, member: &str) -> CacheResult<Option<f64>>;

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>>;

    /// Apply mutations in order within one round trip.
    ///
    /// Backends may apply a prefix of the batch before failing; callers must not
    /// assume all-or-nothing semantics.
    async fn batch(&self, ops: &[CacheOp]) -> CacheResult<()>;

    async fn apply(&self, op: CacheOp) -> CacheResult<()> {
        self.batch(std::slice::from_ref(&op)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_exposes_its_key() {
        let op = CacheOp::RankIncr {
            key: "item:likes:rank".to_string(),
            member: "42".to_string(),
            delta: 1.0,
        };
        assert_eq!(op.key(), "item:likes:rank");

        let op = CacheOp::SetRemove {
            key: "item:updated".to_string(),
            members: vec!["1".to_string()],
        };
        assert_eq!(op.key(), "item:updated");
    }

    #[test]
    fn timeout_error_mentions_deadline() {
        let err = CacheError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "cache call timed out after 250ms");
    }
}
