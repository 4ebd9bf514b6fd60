//! Typed like cache over a raw [`CacheStore`].
//!
//! Turns item/actor ids into keys, applies the configured TTLs and builds the
//! mutation batches used by toggles, reconciliation and moderation.

use std::sync::Arc;

use tracing::warn;

use super::config::CacheConfig;
use super::keys::{LikeKey, MEMBERSHIP_LOADED_FIELD, item_member};
use super::store::{CacheOp, CacheResult, CacheStore};
use crate::domain::likes::{ActorId, ItemId};

/// Snapshot of the dirty set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySnapshot {
    pub items: Vec<ItemId>,
    /// Members that do not name a valid item.
    pub invalid: Vec<String>,
}

impl DirtySnapshot {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.invalid.is_empty()
    }

    /// Every raw member the snapshot was built from.
    pub fn members(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|item| item_member(*item))
            .chain(self.invalid.iter().cloned())
            .collect()
    }
}

/// What a toggle batch does with the item counter and ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterAdjust {
    /// The relation did not change; counter and ranking stay as they are.
    Skip,
    /// The counter is cached; shift it and the ranking by the delta.
    Shift,
    /// No counter is cached. Any counter is deleted so the next read counts
    /// committed rows; the ranking is still shifted.
    Recount,
}

#[derive(Clone)]
pub struct LikeCache {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
}

impl std::fmt::Debug for LikeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LikeCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LikeCache {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub async fn get_counter(&self, item: ItemId) -> CacheResult<Option<i64>> {
        self.store
            .get_counter(&LikeKey::ItemCounter(item).render())
            .await
    }

    /// Slide the counter expiry forward after a hit.
    pub async fn refresh_counter(&self, item: ItemId) -> CacheResult<()> {
        self.store
            .apply(CacheOp::Expire {
                key: LikeKey::ItemCounter(item).render(),
                ttl: self.config.counter_ttl(),
            })
            .await
    }

    pub async fn set_counter(&self, item: ItemId, value: u64) -> CacheResult<()> {
        self.store.apply(self.set_counter_op(item, value)).await
    }

    pub async fn incr_counter(&self, item: ItemId, delta: i64) -> CacheResult<()> {
        self.store
            .apply(CacheOp::IncrCounter {
                key: LikeKey::ItemCounter(item).render(),
                delta,
            })
            .await
    }

    /// `None` when the actor's map is absent or was never loaded in full.
    pub async fn has_membership(&self, actor: ActorId, item: ItemId) -> CacheResult<Option<bool>> {
        let fields = [MEMBERSHIP_LOADED_FIELD.to_string(), item_member(item)];
        let present = self
            .store
            .map_contains(&LikeKey::ActorMembership(actor).render(), &fields)
            .await?;
        match present.as_slice() {
            [true, liked] => Ok(Some(*liked)),
            _ => Ok(None),
        }
    }

    pub async fn refresh_membership(&self, actor: ActorId) -> CacheResult<()> {
        self.store
            .apply(CacheOp::Expire {
                key: LikeKey::ActorMembership(actor).render(),
                ttl: self.config.membership_ttl(),
            })
            .await
    }

    /// Replace the actor's map with `items`, marked as fully loaded.
    pub async fn set_membership(&self, actor: ActorId, items: &[ItemId]) -> CacheResult<()> {
        let key = LikeKey::ActorMembership(actor).render();
        let fields = std::iter::once(MEMBERSHIP_LOADED_FIELD.to_string())
            .chain(items.iter().map(|item| item_member(*item)))
            .collect();
        self.store
            .batch(&[
                CacheOp::Delete { key: key.clone() },
                CacheOp::MapInsert {
                    key: key.clone(),
                    fields,
                },
                CacheOp::Expire {
                    key,
                    ttl: self.config.membership_ttl(),
                },
            ])
            .await
    }

    /// Drop the actor's map so the next read reloads it from the record store.
    pub async fn forget_membership(&self, actor: ActorId) -> CacheResult<()> {
        self.store
            .apply(CacheOp::Delete {
                key: LikeKey::ActorMembership(actor).render(),
            })
            .await
    }

    pub async fn update_ranking(&self, item: ItemId, delta: f64) -> CacheResult<()> {
        self.store
            .apply(CacheOp::RankIncr {
                key: LikeKey::Ranking.render(),
                member: item_member(item),
                delta,
            })
            .await
    }

    pub async fn set_ranking(&self, item: ItemId, score: f64) -> CacheResult<()> {
        self.store
            .apply(CacheOp::RankSet {
                key: LikeKey::Ranking.render(),
                member: item_member(item),
                score,
            })
            .await
    }

    pub async fn ranking_score(&self, item: ItemId) -> CacheResult<Option<f64>> {
        self.store
            .rank_score(&LikeKey::Ranking.render(), &item_member(item))
            .await
    }

    /// Best-ranked items first. Members that do not parse are skipped.
    pub async fn top_ranked(&self, limit: usize) -> CacheResult<Vec<(ItemId, f64)>> {
        let ranked = self
            .store
            .rank_top(&LikeKey::Ranking.render(), limit)
            .await?;
        Ok(ranked
            .into_iter()
            .filter_map(|(member, score)| match member.parse::<ItemId>() {
                Ok(item) => Some((item, score)),
                Err(_) => {
                    warn!(member = %member, "skipping unparsable ranking member");
                    None
                }
            })
            .collect())
    }

    pub async fn mark_dirty(&self, item: ItemId) -> CacheResult<()> {
        self.store.batch(&self.dirty_ops(item)).await
    }

    pub async fn list_dirty(&self) -> CacheResult<DirtySnapshot> {
        let members = self.store.set_members(&LikeKey::Dirty.render()).await?;
        let mut snapshot = DirtySnapshot::default();
        for member in members {
            match member.parse::<ItemId>() {
                Ok(item) => snapshot.items.push(item),
                Err(_) => snapshot.invalid.push(member),
            }
        }
        snapshot.items.sort_unstable();
        Ok(snapshot)
    }

    /// Remove exactly `members` from the dirty set; marks added since the
    /// snapshot survive.
    pub async fn clear_dirty(&self, members: Vec<String>) -> CacheResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        self.store
            .apply(CacheOp::SetRemove {
                key: LikeKey::Dirty.render(),
                members,
            })
            .await
    }

    pub async fn batch(&self, ops: &[CacheOp]) -> CacheResult<()> {
        self.store.batch(ops).await
    }

    /// Cache side of a committed like.
    pub fn like_ops(&self, actor: ActorId, item: ItemId, adjust: CounterAdjust) -> Vec<CacheOp> {
        let membership = LikeKey::ActorMembership(actor).render();
        let mut ops = vec![
            CacheOp::MapInsert {
                key: membership.clone(),
                fields: vec![item_member(item)],
            },
            CacheOp::Expire {
                key: membership,
                ttl: self.config.membership_ttl(),
            },
        ];
        ops.extend(self.adjust_ops(item, 1, adjust));
        ops.extend(self.dirty_ops(item));
        ops
    }

    /// Cache side of a committed unlike.
    pub fn unlike_ops(&self, actor: ActorId, item: ItemId, adjust: CounterAdjust) -> Vec<CacheOp> {
        let mut ops = vec![self.clear_membership_op(actor, item)];
        ops.extend(self.adjust_ops(item, -1, adjust));
        ops.extend(self.dirty_ops(item));
        ops
    }

    /// Absolute counter and ranking writes for recomputed counts. Items with
    /// no likes leave the ranking.
    pub fn reconcile_ops(&self, counts: &[(ItemId, u64)]) -> Vec<CacheOp> {
        let mut ops = Vec::with_capacity(counts.len() * 2);
        for &(item, count) in counts {
            ops.push(self.set_counter_op(item, count));
            if count == 0 {
                ops.push(self.remove_from_ranking_op(item));
            } else {
                ops.push(CacheOp::RankSet {
                    key: LikeKey::Ranking.render(),
                    member: item_member(item),
                    score: count as f64,
                });
            }
        }
        ops
    }

    pub fn invalidate_ops(&self, item: ItemId) -> Vec<CacheOp> {
        vec![
            CacheOp::Delete {
                key: LikeKey::ItemCounter(item).render(),
            },
            self.remove_from_ranking_op(item),
        ]
    }

    fn adjust_ops(&self, item: ItemId, delta: i64, adjust: CounterAdjust) -> Vec<CacheOp> {
        let counter = LikeKey::ItemCounter(item).render();
        let mut ops = match adjust {
            CounterAdjust::Skip => return Vec::new(),
            CounterAdjust::Shift => vec![
                CacheOp::IncrCounter {
                    key: counter.clone(),
                    delta,
                },
                CacheOp::Expire {
                    key: counter,
                    ttl: self.config.counter_ttl(),
                },
            ],
            // INCRBY on an absent key starts from zero.
            CounterAdjust::Recount => vec![CacheOp::Delete { key: counter }],
        };
        ops.push(CacheOp::RankIncr {
            key: LikeKey::Ranking.render(),
            member: item_member(item),
            delta: delta as f64,
        });
        ops
    }

    fn dirty_ops(&self, item: ItemId) -> [CacheOp; 2] {
        let dirty = LikeKey::Dirty.render();
        [
            CacheOp::SetAdd {
                key: dirty.clone(),
                member: item_member(item),
            },
            CacheOp::Expire {
                key: dirty,
                ttl: self.config.dirty_ttl(),
            },
        ]
    }

    fn set_counter_op(&self, item: ItemId, value: u64) -> CacheOp {
        CacheOp::SetCounter {
            key: LikeKey::ItemCounter(item).render(),
            value: i64::try_from(value).unwrap_or(i64::MAX),
            ttl: self.config.counter_ttl(),
        }
    }

    fn clear_membership_op(&self, actor: ActorId, item: ItemId) -> CacheOp {
        CacheOp::MapRemove {
            key: LikeKey::ActorMembership(actor).render(),
            field: item_member(item),
        }
    }

    fn remove_from_ranking_op(&self, item: ItemId) -> CacheOp {
        CacheOp::RankRemove {
            key: LikeKey::Ranking.render(),
            member: item_member(item),
        }
    }
}
