//! Interval-driven reconciliation worker.
//!
//! Passes start every `reconciler.interval_seconds` counted from job start,
//! not on wall-clock boundaries, so the period is a plain number of seconds
//! rather than a cron expression. A pass that overruns the period delays the
//! next tick; missed ticks are never replayed in a burst.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::application::reconcile::Reconciler;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a running background job.
pub struct JobHandle {
    name: &'static str,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl JobHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the job to stop and wait for it. A pass already in progress is
    /// allowed to finish.
    pub async fn shutdown(self) {
        // The receiver is gone only if the task already exited.
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            warn!(job = self.name, error = %err, "job task ended abnormally");
        }
        info!(job = self.name, "job stopped");
    }
}

/// Run `reconciler` every `period` until the returned handle is shut down.
///
/// The first pass happens one period after spawning. Ticks missed while a pass
/// runs are delayed, not replayed.
pub fn spawn_reconcile_job(reconciler: Reconciler, period: Duration) -> JobHandle {
    let (stop, stop_rx) = watch::channel(false);
    let period = period.max(MIN_PERIOD);
    let task = tokio::spawn(run(reconciler, period, stop_rx));
    info!(job = "reconcile", period_ms = period.as_millis() as u64, "job started");
    JobHandle {
        name: "reconcile",
        stop,
        task,
    }
}

async fn run(reconciler: Reconciler, period: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // Skip the first immediate tick

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                // Failures are logged and counted by the reconciler; the next
                // tick retries.
                let _ = reconciler.run_once().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::application::repos::{LikeTransaction, LikesRepo, RepoError};
    use crate::cache::{CacheConfig, LikeCache, MemoryCacheStore};
    use crate::domain::likes::{ActorId, ItemId};

    struct FixedCounts;

    #[async_trait]
    impl LikesRepo for FixedCounts {
        async fn count_likes(&self, _item: ItemId) -> Result<u64, RepoError> {
            Ok(3)
        }

        async fn liked_items(&self, _actor: ActorId) -> Result<Vec<ItemId>, RepoError> {
            Ok(Vec::new())
        }

        async fn count_likes_grouped(
            &self,
            items: &[ItemId],
        ) -> Result<Vec<(ItemId, u64)>, RepoError> {
            Ok(items.iter().map(|item| (*item, 3)).collect())
        }

        async fn begin(&self) -> Result<Box<dyn LikeTransaction>, RepoError> {
            Err(RepoError::from_persistence("read-only fixture"))
        }
    }

    fn fixture() -> (LikeCache, Reconciler) {
        let cache = LikeCache::new(Arc::new(MemoryCacheStore::new()), CacheConfig::default());
        let reconciler = Reconciler::new(Arc::new(FixedCounts), cache.clone());
        (cache, reconciler)
    }

    #[tokio::test(start_paused = true)]
    async fn job_reconciles_on_each_tick() {
        let (cache, reconciler) = fixture();
        let item = ItemId::new(42).expect("valid item");
        cache.mark_dirty(item).await.expect("mark dirty");

        let handle = spawn_reconcile_job(reconciler, Duration::from_secs(300));
        tokio::time::sleep(Duration::from_secs(301)).await;
        handle.shutdown().await;

        assert!(cache.list_dirty().await.expect("dirty").is_empty());
        assert_eq!(cache.get_counter(item).await.expect("counter"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn job_repeats_after_every_period() {
        let (cache, reconciler) = fixture();
        let first = ItemId::new(1).expect("valid item");
        let second = ItemId::new(2).expect("valid item");
        cache.mark_dirty(first).await.expect("mark dirty");

        let handle = spawn_reconcile_job(reconciler, Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(cache.list_dirty().await.expect("dirty").is_empty());

        cache.mark_dirty(second).await.expect("mark dirty");
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(cache.list_dirty().await.expect("dirty").items, vec![second]);

        tokio::time::sleep(Duration::from_secs(31)).await;
        handle.shutdown().await;
        assert!(cache.list_dirty().await.expect("dirty").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn job_waits_a_full_period_before_first_pass() {
        let (cache, reconciler) = fixture();
        let item = ItemId::new(7).expect("valid item");
        cache.mark_dirty(item).await.expect("mark dirty");

        let handle = spawn_reconcile_job(reconciler, Duration::from_secs(300));
        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.shutdown().await;

        assert_eq!(cache.list_dirty().await.expect("dirty").items, vec![item]);
    }

    #[tokio::test]
    async fn shutdown_joins_idle_job() {
        let (_, reconciler) = fixture();
        let handle = spawn_reconcile_job(reconciler, Duration::from_secs(3600));
        assert_eq!(handle.name(), "reconcile");

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("job should stop promptly");
    }
}
