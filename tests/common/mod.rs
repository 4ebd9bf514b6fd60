#![allow(dead_code)]

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use plaudit::application::likes::LikeService;
use plaudit::application::reconcile::Reconciler;
use plaudit::application::repos::{LikeTransaction, LikesRepo, RepoError};
use plaudit::cache::{
    CacheConfig, CacheError, CacheOp, CacheResult, CacheStore, LikeCache, MemoryCacheStore,
};
use plaudit::domain::likes::{ActorId, ItemId};
use tokio::sync::Mutex;

pub type RecountHook = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

pub fn item(raw: i64) -> ItemId {
    ItemId::new(raw).expect("valid item id")
}

pub fn actor(raw: i64) -> ActorId {
    ActorId::new(raw).expect("valid actor id")
}

/// Transactional like store held in memory.
///
/// Transactions stage their mutations and apply them on commit, so a rolled
/// back or dropped transaction leaves no trace.
#[derive(Default)]
pub struct MemoryLikesRepo {
    relations: Arc<Mutex<BTreeSet<(i64, i64)>>>,
    pub fail_begin: AtomicBool,
    pub fail_mutation: AtomicBool,
    pub fail_commit: AtomicBool,
    pub fail_reads: AtomicBool,
    pub reads: AtomicUsize,
    pub commits: Arc<AtomicUsize>,
    pub rollbacks: Arc<AtomicUsize>,
    recount_hook: Mutex<Option<RecountHook>>,
}

impl MemoryLikesRepo {
    /// Insert a relation directly, bypassing the cache.
    pub async fn seed(&self, item: i64, actor: i64) {
        self.relations.lock().await.insert((item, actor));
    }

    pub async fn remove(&self, item: i64, actor: i64) {
        self.relations.lock().await.remove(&(item, actor));
    }

    pub async fn contains(&self, item: i64, actor: i64) -> bool {
        self.relations.lock().await.contains(&(item, actor))
    }

    pub async fn count(&self, item: i64) -> u64 {
        self.relations
            .lock()
            .await
            .iter()
            .filter(|(candidate, _)| *candidate == item)
            .count() as u64
    }

    /// Run `hook` once, in the middle of the next grouped recount.
    pub async fn on_next_recount<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: RecountHook = Box::new(move || Box::pin(hook()));
        *self.recount_hook.lock().await = Some(hook);
    }

    fn check_reads(&self) -> Result<(), RepoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("injected read failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl LikesRepo for MemoryLikesRepo {
    async fn count_likes(&self, item: ItemId) -> Result<u64, RepoError> {
        self.check_reads()?;
        Ok(self.count(item.get()).await)
    }

    async fn liked_items(&self, actor: ActorId) -> Result<Vec<ItemId>, RepoError> {
        self.check_reads()?;
        let relations = self.relations.lock().await;
        Ok(relations
            .iter()
            .filter(|(_, candidate)| *candidate == actor.get())
            .map(|(item, _)| ItemId::new(*item).expect("stored item ids are valid"))
            .collect())
    }

    async fn count_likes_grouped(&self, items: &[ItemId]) -> Result<Vec<(ItemId, u64)>, RepoError> {
        self.check_reads()?;
        let hook = self.recount_hook.lock().await.take();
        if let Some(hook) = hook {
            hook().await;
        }

        let mut counts = Vec::new();
        for item in items {
            let count = self.count(item.get()).await;
            if count > 0 {
                counts.push((*item, count));
            }
        }
        Ok(counts)
    }

    async fn begin(&self) -> Result<Box<dyn LikeTransaction>, RepoError> {
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        Ok(Box::new(MemoryLikeTransaction {
            relations: Arc::clone(&self.relations),
            staged: Vec::new(),
            fail_mutation: self.fail_mutation.load(Ordering::SeqCst),
            fail_commit: self.fail_commit.load(Ordering::SeqCst),
            commits: Arc::clone(&self.commits),
            rollbacks: Arc::clone(&self.rollbacks),
        }))
    }
}

enum Staged {
    Insert(i64, i64),
    Delete(i64, i64),
}

struct MemoryLikeTransaction {
    relations: Arc<Mutex<BTreeSet<(i64, i64)>>>,
    staged: Vec<Staged>,
    fail_mutation: bool,
    fail_commit: bool,
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
}

impl MemoryLikeTransaction {
    async fn visible(&self, pair: (i64, i64)) -> bool {
        let mut present = self.relations.lock().await.contains(&pair);
        for staged in &self.staged {
            match staged {
                Staged::Insert(item, actor) if (*item, *actor) == pair => present = true,
                Staged::Delete(item, actor) if (*item, *actor) == pair => present = false,
                _ => {}
            }
        }
        present
    }
}

#[async_trait]
impl LikeTransaction for MemoryLikeTransaction {
    async fn insert_like(&mut self, item: ItemId, actor: ActorId) -> Result<bool, RepoError> {
        if self.fail_mutation {
            return Err(RepoError::from_persistence("injected insert failure"));
        }
        let pair = (item.get(), actor.get());
        if self.visible(pair).await {
            return Ok(false);
        }
        self.staged.push(Staged::Insert(pair.0, pair.1));
        Ok(true)
    }

    async fn delete_like(&mut self, item: ItemId, actor: ActorId) -> Result<bool, RepoError> {
        if self.fail_mutation {
            return Err(RepoError::from_persistence("injected delete failure"));
        }
        let pair = (item.get(), actor.get());
        if !self.visible(pair).await {
            return Ok(false);
        }
        self.staged.push(Staged::Delete(pair.0, pair.1));
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        if self.fail_commit {
            return Err(RepoError::from_persistence("injected commit failure"));
        }
        let mut relations = self.relations.lock().await;
        for staged in &self.staged {
            match staged {
                Staged::Insert(item, actor) => {
                    relations.insert((*item, *actor));
                }
                Staged::Delete(item, actor) => {
                    relations.remove(&(*item, *actor));
                }
            }
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepoError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Memory cache whose reads and writes can be made to fail on demand.
#[derive(Default)]
pub struct FlakyCache {
    pub inner: MemoryCacheStore,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub batches: AtomicUsize,
}

impl FlakyCache {
    fn check(&self, flag: &AtomicBool) -> CacheResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("injected cache failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FlakyCache {
    async fn get_counter(&self, key: &str) -> CacheResult<Option<i64>> {
        self.check(&self.fail_reads)?;
        self.inner.get_counter(key).await
    }

    async fn map_contains(&self, key: &str, fields: &[String]) -> CacheResult<Vec<bool>> {
        self.check(&self.fail_reads)?;
        self.inner.map_contains(key, fields).await
    }

    async fn rank_top(&self, key: &str, limit: usize) -> CacheResult<Vec<(String, f64)>> {
        self.check(&self.fail_reads)?;
        self.inner.rank_top(key, limit).await
    }

    async fn rank_score(&self, key: &str, member: &str) -> CacheResult<Option<f64>> {
        self.check(&self.fail_reads)?;
        self.inner.rank_score(key, member).await
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        self.check(&self.fail_reads)?;
        self.inner.set_members(key).await
    }

    async fn batch(&self, ops: &[CacheOp]) -> CacheResult<()> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.check(&self.fail_writes)?;
        self.inner.batch(ops).await
    }
}

pub struct Harness {
    pub repo: Arc<MemoryLikesRepo>,
    pub store: Arc<FlakyCache>,
    pub cache: LikeCache,
    pub likes: LikeService,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        let repo = Arc::new(MemoryLikesRepo::default());
        let store = Arc::new(FlakyCache::default());
        let cache = LikeCache::new(store.clone(), CacheConfig::default());
        let likes = LikeService::new(repo.clone(), cache.clone());
        let reconciler = Reconciler::new(repo.clone(), cache.clone());
        Self {
            repo,
            store,
            cache,
            likes,
            reconciler,
        }
    }

    pub fn fail_cache_reads(&self, fail: bool) {
        self.store.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_cache_writes(&self, fail: bool) {
        self.store.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn dirty_items(&self) -> Vec<ItemId> {
        self.cache.list_dirty().await.expect("list dirty").items
    }
}
