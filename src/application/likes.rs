//! Like counting and toggling over the record store and the like cache.
//!
//! Reads are cache-aside: the cache answers when it can, the record store
//! answers otherwise and the result is written back. Cache failures on the
//! read path only cost latency.
//!
//! A toggle mutates the record store inside a transaction, applies the cache
//! batch before committing and rolls back if the batch fails. Every toggle
//! that reaches the cache leaves the item in the dirty set, so a commit that
//! fails after the batch is repaired by the next reconciliation. Only a cached
//! counter is shifted by the batch; an absent one is deleted and recounted
//! from committed rows when the toggle reads its result.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, error, info, instrument, warn};

use crate::application::error::LikeError;
use crate::application::repos::{LikeTransaction, LikesRepo};
use crate::cache::{CacheError, CounterAdjust, LikeCache};
use crate::domain::likes::{ActorId, ItemId, LikeCount, RankedItem, ToggleOutcome};

const METRIC_CACHE_HIT: &str = "plaudit_like_cache_hit_total";
const METRIC_CACHE_MISS: &str = "plaudit_like_cache_miss_total";
const METRIC_CACHE_DEGRADED: &str = "plaudit_like_cache_degraded_total";
const METRIC_TOGGLE: &str = "plaudit_like_toggle_total";
const METRIC_TOGGLE_ROLLBACK: &str = "plaudit_like_toggle_rollback_total";

#[derive(Clone)]
pub struct LikeService {
    repo: Arc<dyn LikesRepo>,
    cache: LikeCache,
}

impl LikeService {
    pub fn new(repo: Arc<dyn LikesRepo>, cache: LikeCache) -> Self {
        Self { repo, cache }
    }

    /// Like count of `item`.
    #[instrument(skip(self))]
    pub async fn get_count(&self, item: i64) -> Result<u64, LikeError> {
        let item = item_id(item)?;
        self.count_for(item).await
    }

    /// Like counts for a listing of items, in request order.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn get_counts(&self, items: &[i64]) -> Result<Vec<LikeCount>, LikeError> {
        let items = items
            .iter()
            .map(|raw| item_id(*raw))
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts = Vec::with_capacity(items.len());
        for item in items {
            let count = self.count_for(item).await?;
            counts.push(LikeCount { item, count });
        }
        Ok(counts)
    }

    /// Whether `actor` currently likes `item`.
    #[instrument(skip(self))]
    pub async fn is_liked(&self, item: i64, actor: i64) -> Result<bool, LikeError> {
        let item = item_id(item)?;
        let actor = actor_id(actor)?;
        self.liked_for(actor, item).await
    }

    /// Flip the like state of (`item`, `actor`).
    #[instrument(skip(self))]
    pub async fn toggle(&self, item: i64, actor: i64) -> Result<ToggleOutcome, LikeError> {
        let item = item_id(item)?;
        let actor = actor_id(actor)?;

        let was_liked = self.liked_for(actor, item).await?;

        let mut tx = self.repo.begin().await.inspect_err(|_| {
            counter!(METRIC_TOGGLE, "result" => "record_store_error").increment(1);
        })?;
        let mutation = if was_liked {
            tx.delete_like(item, actor).await
        } else {
            tx.insert_like(item, actor).await
        };
        let changed = match mutation {
            Ok(changed) => changed,
            Err(err) => {
                rollback(tx, item, actor).await;
                counter!(METRIC_TOGGLE, "result" => "record_store_error").increment(1);
                return Err(err.into());
            }
        };
        let adjust = if changed {
            self.counter_adjust(item).await
        } else {
            debug!(
                item_id = %item,
                actor_id = %actor,
                was_liked,
                "relation already in requested state; skipping count adjustment"
            );
            CounterAdjust::Skip
        };

        let ops = if was_liked {
            self.cache.unlike_ops(actor, item, adjust)
        } else {
            self.cache.like_ops(actor, item, adjust)
        };
        if let Err(err) = self.cache.batch(&ops).await {
            warn!(
                item_id = %item,
                actor_id = %actor,
                error = %err,
                "cache batch failed; rolling back like toggle"
            );
            rollback(tx, item, actor).await;
            counter!(METRIC_TOGGLE_ROLLBACK).increment(1);
            counter!(METRIC_TOGGLE, "result" => "cache_unavailable").increment(1);
            return Err(LikeError::CacheUnavailable(err));
        }

        if let Err(err) = tx.commit().await {
            error!(
                item_id = %item,
                actor_id = %actor,
                error = %err,
                "commit failed after cache batch; item stays dirty until reconciliation"
            );
            if let Err(cache_err) = self.cache.forget_membership(actor).await {
                degraded("forget_membership", &cache_err);
            }
            counter!(METRIC_TOGGLE, "result" => "record_store_error").increment(1);
            return Err(err.into());
        }

        let liked = !was_liked;
        let count = self.count_for(item).await?;
        counter!(METRIC_TOGGLE, "result" => if liked { "liked" } else { "unliked" }).increment(1);
        info!(item_id = %item, actor_id = %actor, liked, count, "like toggled");

        Ok(ToggleOutcome { count, liked })
    }

    /// Drop the cached counter and ranking entry of `item`, e.g. after it was
    /// taken down by moderation.
    #[instrument(skip(self))]
    pub async fn invalidate_item(&self, item: i64) -> Result<(), LikeError> {
        let item = item_id(item)?;
        self.cache.batch(&self.cache.invalidate_ops(item)).await?;
        info!(item_id = %item, "like cache entries invalidated");
        Ok(())
    }

    /// Most liked items, best first. Served from the ranking only.
    #[instrument(skip(self))]
    pub async fn top_liked(&self, limit: usize) -> Result<Vec<RankedItem>, LikeError> {
        let ranked = self.cache.top_ranked(limit).await?;
        Ok(ranked
            .into_iter()
            .map(|(item, score)| RankedItem { item, score })
            .collect())
    }

    async fn count_for(&self, item: ItemId) -> Result<u64, LikeError> {
        match self.cache.get_counter(item).await {
            Ok(Some(cached)) if cached >= 0 => {
                counter!(METRIC_CACHE_HIT, "kind" => "counter").increment(1);
                if let Err(err) = self.cache.refresh_counter(item).await {
                    degraded("refresh_counter", &err);
                }
                return Ok(cached.unsigned_abs());
            }
            Ok(Some(cached)) => {
                debug!(item_id = %item, cached, "negative cached counter; recomputing");
            }
            Ok(None) => {}
            Err(err) => degraded("get_counter", &err),
        }

        counter!(METRIC_CACHE_MISS, "kind" => "counter").increment(1);
        let count = self.repo.count_likes(item).await?;
        if let Err(err) = self.cache.set_counter(item, count).await {
            degraded("set_counter", &err);
        }
        Ok(count)
    }

    /// A relative adjustment is only correct against a cached counter; a
    /// missing or negative one is recounted after commit instead.
    async fn counter_adjust(&self, item: ItemId) -> CounterAdjust {
        match self.cache.get_counter(item).await {
            Ok(Some(cached)) if cached >= 0 => CounterAdjust::Shift,
            Ok(_) => CounterAdjust::Recount,
            Err(err) => {
                degraded("get_counter", &err);
                CounterAdjust::Recount
            }
        }
    }

    async fn liked_for(&self, actor: ActorId, item: ItemId) -> Result<bool, LikeError> {
        match self.cache.has_membership(actor, item).await {
            Ok(Some(liked)) => {
                counter!(METRIC_CACHE_HIT, "kind" => "membership").increment(1);
                if let Err(err) = self.cache.refresh_membership(actor).await {
                    degraded("refresh_membership", &err);
                }
                return Ok(liked);
            }
            Ok(None) => {}
            Err(err) => degraded("has_membership", &err),
        }

        counter!(METRIC_CACHE_MISS, "kind" => "membership").increment(1);
        let liked_items = self.repo.liked_items(actor).await?;
        if let Err(err) = self.cache.set_membership(actor, &liked_items).await {
            degraded("set_membership", &err);
        }
        Ok(liked_items.contains(&item))
    }
}

fn item_id(raw: i64) -> Result<ItemId, LikeError> {
    ItemId::new(raw).map_err(|_| LikeError::InvalidItem(raw))
}

fn actor_id(raw: i64) -> Result<ActorId, LikeError> {
    ActorId::new(raw).map_err(|_| LikeError::InvalidActor(raw))
}

fn degraded(op: &'static str, err: &CacheError) {
    counter!(METRIC_CACHE_DEGRADED, "op" => op).increment(1);
    warn!(op, error = %err, "like cache degraded; falling back to record store");
}

async fn rollback(tx: Box<dyn LikeTransaction>, item: ItemId, actor: ActorId) {
    if let Err(err) = tx.rollback().await {
        // Dropping the transaction discards it regardless.
        warn!(
            item_id = %item,
            actor_id = %actor,
            error = %err,
            "like toggle rollback failed"
        );
    }
}
