//! Periodic repair of cached counters.
//!
//! Only items in the dirty set are recounted. Each pass overwrites their
//! counters and ranking scores with absolute values from the record store and
//! then removes exactly the members it processed, so marks added while the pass
//! runs are kept for the next one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::application::error::ReconcileError;
use crate::application::repos::LikesRepo;
use crate::cache::LikeCache;
use crate::domain::likes::ItemId;

const METRIC_RECONCILE_ITEMS: &str = "plaudit_reconcile_items_total";
const METRIC_RECONCILE_FAILURE: &str = "plaudit_reconcile_failure_total";
const METRIC_RECONCILE_MS: &str = "plaudit_reconcile_ms";

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Valid item ids found in the dirty set.
    pub dirty: usize,
    /// Items whose counter and ranking were rewritten.
    pub reconciled: usize,
    /// Items found without any likes.
    pub zeroed: usize,
}

#[derive(Clone)]
pub struct Reconciler {
    repo: Arc<dyn LikesRepo>,
    cache: LikeCache,
}

impl Reconciler {
    pub fn new(repo: Arc<dyn LikesRepo>, cache: LikeCache) -> Self {
        Self { repo, cache }
    }

    pub async fn run_once(&self) -> Result<ReconcileReport, ReconcileError> {
        let started_at = Instant::now();
        let result = self.reconcile().await;
        histogram!(METRIC_RECONCILE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        match &result {
            Ok(report) if report.reconciled > 0 => {
                counter!(METRIC_RECONCILE_ITEMS).increment(report.reconciled as u64);
                info!(
                    dirty = report.dirty,
                    reconciled = report.reconciled,
                    zeroed = report.zeroed,
                    "like counters reconciled"
                );
            }
            Ok(_) => debug!("no dirty like counters"),
            Err(err) => {
                counter!(METRIC_RECONCILE_FAILURE).increment(1);
                warn!(error = %err, "like reconciliation failed; dirty set kept");
            }
        }
        result
    }

    async fn reconcile(&self) -> Result<ReconcileReport, ReconcileError> {
        let snapshot = self
            .cache
            .list_dirty()
            .await
            .map_err(ReconcileError::ListDirty)?;
        if snapshot.is_empty() {
            return Ok(ReconcileReport::default());
        }
        if !snapshot.invalid.is_empty() {
            warn!(
                members = ?snapshot.invalid,
                "dropping dirty members that are not item ids"
            );
        }

        let recomputed = if snapshot.items.is_empty() {
            Vec::new()
        } else {
            let grouped: HashMap<ItemId, u64> = self
                .repo
                .count_likes_grouped(&snapshot.items)
                .await
                .map_err(ReconcileError::Recount)?
                .into_iter()
                .collect();
            snapshot
                .items
                .iter()
                .map(|item| (*item, grouped.get(item).copied().unwrap_or(0)))
                .collect::<Vec<_>>()
        };

        if !recomputed.is_empty() {
            self.cache
                .batch(&self.cache.reconcile_ops(&recomputed))
                .await
                .map_err(ReconcileError::Write)?;
        }
        self.cache
            .clear_dirty(snapshot.members())
            .await
            .map_err(ReconcileError::ClearDirty)?;

        Ok(ReconcileReport {
            dirty: snapshot.items.len(),
            reconciled: recomputed.len(),
            zeroed: recomputed.iter().filter(|(_, count)| *count == 0).count(),
        })
    }
}
