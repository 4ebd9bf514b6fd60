//! Redis cache backend.
//!
//! Uses a multiplexed [`ConnectionManager`] that reconnects on its own; every
//! call is cloned off the manager and bounded by the configured timeout.
//! Batches are sent as one `MULTI`/`EXEC` pipeline.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Pipeline, RedisError};
use tracing::{debug, info};

use super::store::{CacheError, CacheOp, CacheResult, CacheStore};

pub struct RedisCacheStore {
    manager: ConnectionManager,
    timeout: Duration,
}

impl std::fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RedisCacheStore {
    /// Open a managed connection to `url`, failing if the first connect does
    /// not complete within `timeout`.
    pub async fn connect(url: &str, timeout: Duration) -> CacheResult<Self> {
        let client = Client::open(url).map_err(CacheError::unavailable)?;
        let manager = tokio::time::timeout(timeout, client.get_connection_manager())
            .await
            .map_err(|_| CacheError::Timeout(timeout))?
            .map_err(CacheError::unavailable)?;

        info!("connected to redis");
        Ok(Self { manager, timeout })
    }

    /// Round-trip `PING`, for readiness checks.
    pub async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        self.bounded("", async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn bounded<T>(
        &self,
        key: &str,
        call: impl Future<Output = Result<T, RedisError>>,
    ) -> CacheResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(map_redis_error(key, err)),
            Err(_) => Err(CacheError::Timeout(self.timeout)),
        }
    }
}

fn map_redis_error(key: &str, err: RedisError) -> CacheError {
    if err.code() == Some("WRONGTYPE") {
        return CacheError::WrongType {
            key: key.to_string(),
        };
    }
    if err
        .detail()
        .is_some_and(|detail| detail.contains("would overflow"))
    {
        return CacheError::Overflow {
            key: key.to_string(),
        };
    }
    CacheError::unavailable(err)
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn push_op(pipe: &mut Pipeline, op: &CacheOp) {
    match op {
        CacheOp::SetCounter { key, value, ttl } => {
            pipe.cmd("SET")
                .arg(key)
                .arg(*value)
                .arg("EX")
                .arg(ttl_secs(*ttl))
                .ignore();
        }
        CacheOp::IncrCounter { key, delta } => {
            pipe.cmd("INCRBY").arg(key).arg(*delta).ignore();
        }
        CacheOp::Expire { key, ttl } => {
            pipe.cmd("EXPIRE").arg(key).arg(ttl_secs(*ttl)).ignore();
        }
        CacheOp::Delete { key } => {
            pipe.cmd("DEL").arg(key).ignore();
        }
        CacheOp::MapInsert { key, fields } => {
            if fields.is_empty() {
                return;
            }
            let cmd = pipe.cmd("HSET").arg(key);
            for field in fields {
                cmd.arg(field).arg(1);
            }
            cmd.ignore();
        }
        CacheOp::MapRemove { key, field } => {
            pipe.cmd("HDEL").arg(key).arg(field).ignore();
        }
        CacheOp::RankIncr { key, member, delta } => {
            pipe.cmd("ZINCRBY").arg(key).arg(*delta).arg(member).ignore();
        }
        CacheOp::RankSet { key, member, score } => {
            pipe.cmd("ZADD").arg(key).arg(*score).arg(member).ignore();
        }
        CacheOp::RankRemove { key, member } => {
            pipe.cmd("ZREM").arg(key).arg(member).ignore();
        }
        CacheOp::SetAdd { key, member } => {
            pipe.cmd("SADD").arg(key).arg(member).ignore();
        }
        CacheOp::SetRemove { key, members } => {
            if members.is_empty() {
                return;
            }
            pipe.cmd("SREM").arg(key).arg(members).ignore();
        }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get_counter(&self, key: &str) -> CacheResult<Option<i64>> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.bounded(key, async move {
            let value: Option<i64> = cmd.query_async(&mut conn).await?;
            Ok(value)
        })
        .await
    }

    async fn map_contains(&self, key: &str, fields: &[String]) -> CacheResult<Vec<bool>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("HMGET");
        cmd.arg(key).arg(fields);
        let values: Vec<Option<String>> = self
            .bounded(key, async move { cmd.query_async(&mut conn).await })
            .await?;
        Ok(values.into_iter().map(|value| value.is_some()).collect())
    }

    async fn rank_top(&self, key: &str, limit: usize) -> CacheResult<Vec<(String, f64)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let stop = isize::try_from(limit).unwrap_or(isize::MAX) - 1;
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("ZREVRANGE");
        cmd.arg(key).arg(0).arg(stop).arg("WITHSCORES");
        self.bounded(key, async move {
            let ranked: Vec<(String, f64)> = cmd.query_async(&mut conn).await?;
            Ok(ranked)
        })
        .await
    }

    async fn rank_score(&self, key: &str, member: &str) -> CacheResult<Option<f64>> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("ZSCORE");
        cmd.arg(key).arg(member);
        self.bounded(key, async move {
            let score: Option<f64> = cmd.query_async(&mut conn).await?;
            Ok(score)
        })
        .await
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("SMEMBERS");
        cmd.arg(key);
        self.bounded(key, async move {
            let members: Vec<String> = cmd.query_async(&mut conn).await?;
            Ok(members)
        })
        .await
    }

    async fn batch(&self, ops: &[CacheOp]) -> CacheResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in ops {
            push_op(&mut pipe, op);
        }
        debug!(ops = ops.len(), "sending cache batch");

        let first_key = ops.first().map(CacheOp::key).unwrap_or_default();
        let mut conn = self.manager.clone();
        self.bounded(first_key, async move {
            let _: () = pipe.query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }
}
