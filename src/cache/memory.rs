//! In-process cache backend.
//!
//! Mirrors the Redis semantics the like cache relies on: relative updates
//! create missing keys from zero, emptied hashes and sets disappear, and
//! expired keys behave exactly like absent ones. A batch is applied under a
//! single write lock, which also sweeps expired keys once enough writes have
//! gone by since the last sweep.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use super::lock::{rw_read, rw_write};
use super::store::{CacheError, CacheOp, CacheResult, CacheStore};

const SOURCE: &str = "cache::memory";
const SWEEP_EVERY_OPS: usize = 256;

#[derive(Debug, Clone)]
enum Value {
    Counter(i64),
    Map(HashSet<String>),
    Ranking(HashMap<String, f64>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn persistent(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }

    fn is_empty(&self) -> bool {
        match &self.value {
            Value::Counter(_) => false,
            Value::Map(fields) => fields.is_empty(),
            Value::Ranking(scores) => scores.is_empty(),
            Value::Set(members) => members.is_empty(),
        }
    }
}

/// Cache backend held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
    ops_since_sweep: AtomicUsize,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "len")
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining lifetime of a key; `None` if absent or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = rw_read(&self.entries, SOURCE, "ttl");
        let entry = entries.get(key).filter(|entry| entry.is_live(now))?;
        entry
            .expires_at
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    fn read<T>(
        &self,
        key: &str,
        op: &'static str,
        read: impl FnOnce(Option<&Value>) -> CacheResult<T>,
    ) -> CacheResult<T> {
        let now = Instant::now();
        let entries = rw_read(&self.entries, SOURCE, op);
        let value = entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| &entry.value);
        read(value)
    }
}

fn sweep_expired(entries: &mut HashMap<String, Entry>, now: Instant) {
    let before = entries.len();
    entries.retain(|_, entry| entry.is_live(now));
    let removed = before - entries.len();
    if removed > 0 {
        debug!(removed, remaining = entries.len(), "swept expired cache keys");
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::WrongType {
        key: key.to_string(),
    }
}

/// Live entry for `key`, creating it with `init` when absent or expired.
fn entry_or_insert<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
    init: impl FnOnce() -> Value,
) -> &'a mut Entry {
    let expired = entries.get(key).is_some_and(|entry| !entry.is_live(now));
    if expired {
        entries.remove(key);
    }
    entries
        .entry(key.to_string())
        .or_insert_with(|| Entry::persistent(init()))
}

fn live_mut<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut Entry> {
    entries.get_mut(key).filter(|entry| entry.is_live(now))
}

fn drop_if_empty(entries: &mut HashMap<String, Entry>, key: &str) {
    if entries.get(key).is_some_and(Entry::is_empty) {
        entries.remove(key);
    }
}

fn apply_op(entries: &mut HashMap<String, Entry>, op: &CacheOp, now: Instant) -> CacheResult<()> {
    match op {
        CacheOp::SetCounter { key, value, ttl } => {
            entries.insert(
                key.clone(),
                Entry {
                    value: Value::Counter(*value),
                    expires_at: Some(now + *ttl),
                },
            );
        }
        CacheOp::IncrCounter { key, delta } => {
            let entry = entry_or_insert(entries, key, now, || Value::Counter(0));
            match &mut entry.value {
                Value::Counter(current) => {
                    *current = current
                        .checked_add(*delta)
                        .ok_or_else(|| CacheError::Overflow { key: key.clone() })?;
                }
                _ => return Err(wrong_type(key)),
            }
        }
        CacheOp::Expire { key, ttl } => {
            if let Some(entry) = live_mut(entries, key, now) {
                entry.expires_at = Some(now + *ttl);
            }
        }
        CacheOp::Delete { key } => {
            entries.remove(key);
        }
        CacheOp::MapInsert { key, fields } => {
            let entry = entry_or_insert(entries, key, now, || Value::Map(HashSet::new()));
            match &mut entry.value {
                Value::Map(existing) => existing.extend(fields.iter().cloned()),
                _ => return Err(wrong_type(key)),
            }
        }
        CacheOp::MapRemove { key, field } => {
            if let Some(entry) = live_mut(entries, key, now) {
                match &mut entry.value {
                    Value::Map(existing) => {
                        existing.remove(field);
                    }
                    _ => return Err(wrong_type(key)),
                }
            }
            drop_if_empty(entries, key);
        }
        CacheOp::RankIncr { key, member, delta } => {
            let entry = entry_or_insert(entries, key, now, || Value::Ranking(HashMap::new()));
            match &mut entry.value {
                Value::Ranking(scores) => *scores.entry(member.clone()).or_insert(0.0) += delta,
                _ => return Err(wrong_type(key)),
            }
        }
        CacheOp::RankSet { key, member, score } => {
            let entry = entry_or_insert(entries, key, now, || Value::Ranking(HashMap::new()));
            match &mut entry.value {
                Value::Ranking(scores) => {
                    scores.insert(member.clone(), *score);
                }
                _ => return Err(wrong_type(key)),
            }
        }
        CacheOp::RankRemove { key, member } => {
            if let Some(entry) = live_mut(entries, key, now) {
                match &mut entry.value {
                    Value::Ranking(scores) => {
                        scores.remove(member);
                    }
                    _ => return Err(wrong_type(key)),
                }
            }
            drop_if_empty(entries, key);
        }
        CacheOp::SetAdd { key, member } => {
            let entry = entry_or_insert(entries, key, now, || Value::Set(BTreeSet::new()));
            match &mut entry.value {
                Value::Set(members) => {
                    members.insert(member.clone());
                }
                _ => return Err(wrong_type(key)),
            }
        }
        CacheOp::SetRemove { key, members } => {
            if let Some(entry) = live_mut(entries, key, now) {
                match &mut entry.value {
                    Value::Set(existing) => {
                        for member in members {
                            existing.remove(member);
                        }
                    }
                    _ => return Err(wrong_type(key)),
                }
            }
            drop_if_empty(entries, key);
        }
    }
    Ok(())
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get_counter(&self, key: &str) -> CacheResult<Option<i64>> {
        self.read(key, "get_counter", |value| match value {
            None => Ok(None),
            Some(Value::Counter(current)) => Ok(Some(*current)),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn map_contains(&self, key: &str, fields: &[String]) -> CacheResult<Vec<bool>> {
        self.read(key, "map_contains", |value| match value {
            None => Ok(vec![false; fields.len()]),
            Some(Value::Map(existing)) => Ok(fields
                .iter()
                .map(|field| existing.contains(field))
                .collect()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn rank_top(&self, key: &str, limit: usize) -> CacheResult<Vec<(String, f64)>> {
        self.read(key, "rank_top", |value| match value {
            None => Ok(Vec::new()),
            Some(Value::Ranking(scores)) => {
                let mut ranked: Vec<(String, f64)> = scores
                    .iter()
                    .map(|(member, score)| (member.clone(), *score))
                    .collect();
                // Same order as ZREVRANGE: score descending, then member descending.
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
                ranked.truncate(limit);
                Ok(ranked)
            }
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn rank_score(&self, key: &str, member: &str) -> CacheResult<Option<f64>> {
        self.read(key, "rank_score", |value| match value {
            None => Ok(None),
            Some(Value::Ranking(scores)) => Ok(scores.get(member).copied()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        self.read(key, "set_members", |value| match value {
            None => Ok(Vec::new()),
            Some(Value::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn batch(&self, ops: &[CacheOp]) -> CacheResult<()> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "batch");
        // Like a Redis transaction, a failing command does not stop the rest.
        let mut first_error = None;
        for op in ops {
            if let Err(err) = apply_op(&mut entries, op, now) {
                first_error.get_or_insert(err);
            }
        }

        let pending = self.ops_since_sweep.fetch_add(ops.len(), Ordering::Relaxed) + ops.len();
        if pending >= SWEEP_EVERY_OPS {
            self.ops_since_sweep.store(0, Ordering::Relaxed);
            sweep_expired(&mut entries, now);
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
