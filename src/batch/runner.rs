// ============================================================================
// Batch Runner
// ============================================================================
//
// Drives many single-item mutations sequentially: item N+1 does not start
// until item N settles. Sequential on purpose - it bounds load on the
// backend, keeps the processed/total progress signal monotonic, and avoids
// interleaved optimistic applies racing on a shared parent list.
//
// A failed item is recorded with its reason and the batch continues; one
// aggregate invalidation runs at the end instead of one per item.
//
// ============================================================================

use super::job::{BatchJob, BatchOutcome, BatchProgress};
use crate::cache::ReadCache;
use crate::core::{EntityId, QueryKey, Result};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

pub struct BatchRunner {
    cache: Arc<ReadCache>,
}

impl BatchRunner {
    pub fn new(cache: Arc<ReadCache>) -> Self {
        Self { cache }
    }

    /// Progress channel for one batch of `total` items.
    pub fn progress_channel(
        total: usize,
    ) -> (watch::Sender<BatchProgress>, watch::Receiver<BatchProgress>) {
        watch::channel(BatchProgress {
            processed: 0,
            total,
        })
    }

    /// Run each item through `per_item` in input order, isolating failures,
    /// then invalidate `aggregate` once. Never errors: partial failure is
    /// returned as the outcome partition.
    pub async fn run_batch<F, Fut>(
        &self,
        items: Vec<EntityId>,
        aggregate: &QueryKey,
        per_item: F,
    ) -> BatchOutcome
    where
        F: FnMut(EntityId) -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let (progress, _) = Self::progress_channel(items.len());
        self.run_batch_observed(items, aggregate, per_item, progress)
            .await
    }

    /// `run_batch` with an externally observable progress channel.
    pub async fn run_batch_observed<F, Fut>(
        &self,
        items: Vec<EntityId>,
        aggregate: &QueryKey,
        mut per_item: F,
        progress: watch::Sender<BatchProgress>,
    ) -> BatchOutcome
    where
        F: FnMut(EntityId) -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let mut job = BatchJob::new(items);
        job.start();
        log::debug!(
            "batch started: {} items against '{}'",
            job.items().len(),
            aggregate
        );

        for id in job.items().to_vec() {
            match per_item(id).await {
                Ok(_) => job.record_success(id),
                Err(err) => {
                    log::warn!("batch item {} failed: {}", id, err);
                    job.record_failure(id, err);
                }
            }
            let _ = progress.send(job.progress());
        }

        job.complete();
        self.cache.invalidate(aggregate).await;

        let outcome = job.into_outcome();
        log::info!(
            "batch completed: {} succeeded, {} failed",
            outcome.success.len(),
            outcome.failures.len()
        );
        outcome
    }
}

impl std::fmt::Debug for BatchRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner").finish_non_exhaustive()
    }
}
