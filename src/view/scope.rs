// ============================================================================
// View Scope
// ============================================================================
//
// One instance per mounted view. Owns the view's read subscriptions, its
// Overlay Registry and Selection Controller, and wires the rules that span
// them:
//
// - presence: an item renders if it is in the latest cache snapshot OR
//   overlay-marked;
// - exclusivity: overlay-marked and mid-mutation ids are not selectable;
// - post-batch: successful ids become overlay-marked and leave the
//   selection, failed ids stay selected for direct retry;
// - reconciliation: fresh snapshots of the view's list key are fed to the
//   overlay so markers clear once the server confirms them.
//
// Disposing the scope stops its refetch loops. It never cancels an in-flight
// mutation or batch: a write resolving after disposal applies to the cache
// normally, or no-ops if the key is gone.
//
// ============================================================================

use super::overlay::OverlayRegistry;
use super::selection::SelectionController;
use crate::backend::{BackendApi, WriteRequest};
use crate::batch::{BatchOutcome, BatchProgress, BatchRunner};
use crate::cache::{CacheEvent, QueryEntry, ReadCache, Subscription};
use crate::core::{EntityId, OperationKind, QueryKey, Result, collect_entity_ids, list_contains};
use crate::mutation::{MutationExecutor, patch};
use serde_json::Value;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct ViewScope {
    cache: Arc<ReadCache>,
    executor: Arc<MutationExecutor>,
    backend: Arc<dyn BackendApi>,
    list_key: QueryKey,
    overlay: Arc<Mutex<OverlayRegistry>>,
    selection: Mutex<SelectionController>,
    subscriptions: Mutex<Vec<Subscription>>,
    reconciler: JoinHandle<()>,
}

impl ViewScope {
    pub(crate) async fn mount(
        cache: Arc<ReadCache>,
        executor: Arc<MutationExecutor>,
        backend: Arc<dyn BackendApi>,
        list_key: QueryKey,
        refresh_interval: Duration,
    ) -> Self {
        let subscription = cache.subscribe(list_key.clone(), refresh_interval).await;
        let overlay = Arc::new(Mutex::new(OverlayRegistry::new()));
        let reconciler =
            spawn_overlay_reconciler(Arc::clone(&cache), list_key.clone(), Arc::clone(&overlay));
        Self {
            cache,
            executor,
            backend,
            list_key,
            overlay,
            selection: Mutex::new(SelectionController::new()),
            subscriptions: Mutex::new(vec![subscription]),
            reconciler,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.list_key
    }

    /// Latest cached snapshot of the view's list.
    pub async fn snapshot(&self) -> Option<QueryEntry> {
        self.cache.get(&self.list_key).await
    }

    /// Subscribe this view to an additional key (e.g. a stats panel beside
    /// the list). Released on dispose with the rest.
    pub async fn subscribe(&self, key: QueryKey, refresh_interval: Duration) -> Result<()> {
        let subscription = self.cache.subscribe(key, refresh_interval).await;
        self.subscriptions.lock()?.push(subscription);
        Ok(())
    }

    /// Presence rule: in the latest cache snapshot OR overlay-marked.
    pub async fn is_present(&self, id: EntityId) -> Result<bool> {
        let marked = { self.overlay.lock()?.is_marked(id) };
        if marked {
            return Ok(true);
        }
        Ok(self
            .cache
            .get(&self.list_key)
            .await
            .map(|entry| list_contains(&entry.data, id))
            .unwrap_or(false))
    }

    /// Snapshot ids merged with overlay markers.
    pub async fn visible_ids(&self) -> Result<BTreeSet<EntityId>> {
        let mut ids = self
            .cache
            .get(&self.list_key)
            .await
            .map(|entry| collect_entity_ids(&entry.data))
            .unwrap_or_default();
        let overlay_ids = self.overlay.lock()?.ids();
        ids.extend(overlay_ids);
        Ok(ids)
    }

    /// Snapshot ids minus overlay markers and mid-mutation ids: the ids a
    /// batch may be built from.
    pub async fn selectable_ids(&self) -> Result<BTreeSet<EntityId>> {
        let snapshot_ids = self
            .cache
            .get(&self.list_key)
            .await
            .map(|entry| collect_entity_ids(&entry.data))
            .unwrap_or_default();
        let in_flight = self.executor.in_flight_entities().await;
        let overlay_ids = self.overlay.lock()?.ids();
        Ok(snapshot_ids
            .into_iter()
            .filter(|id| !overlay_ids.contains(id) && !in_flight.contains(id))
            .collect())
    }

    /// Flip one id's selection. Overlay-marked and mid-mutation ids are
    /// refused (the selection may never contain them). Returns whether the
    /// id is selected afterwards.
    pub async fn toggle(&self, id: EntityId) -> Result<bool> {
        let marked = { self.overlay.lock()?.is_marked(id) };
        if marked {
            log::debug!("toggle of {} refused: overlay-marked", id);
            return Ok(false);
        }
        if self.executor.in_flight_entities().await.contains(&id) {
            log::debug!("toggle of {} refused: mutation in flight", id);
            return Ok(false);
        }
        Ok(self.selection.lock()?.toggle(id))
    }

    /// Select-all/deselect-all fusion over the current selectable set.
    /// Returns the selection afterwards.
    pub async fn select_all(&self) -> Result<BTreeSet<EntityId>> {
        let selectable = self.selectable_ids().await?;
        let mut selection = self.selection.lock()?;
        selection.select_all(&selectable);
        Ok(selection.selected().clone())
    }

    pub async fn is_exhaustive(&self) -> Result<bool> {
        let selectable = self.selectable_ids().await?;
        Ok(self.selection.lock()?.is_exhaustive(&selectable))
    }

    pub fn selected(&self) -> Result<BTreeSet<EntityId>> {
        Ok(self.selection.lock()?.selected().clone())
    }

    pub fn clear_selection(&self) -> Result<()> {
        self.selection.lock()?.clear();
        Ok(())
    }

    pub fn is_marked(&self, id: EntityId) -> Result<bool> {
        Ok(self.overlay.lock()?.is_marked(id))
    }

    /// Record a server-confirmed mutation for an id: overlay-mark it and
    /// drop it from the selection.
    pub fn mark_confirmed(&self, id: EntityId) -> Result<()> {
        self.overlay.lock()?.mark(id);
        self.selection.lock()?.deselect(id);
        Ok(())
    }

    /// One optimistic write through the process-wide executor, with the
    /// projection chosen by operation kind (register appends a stub, delete
    /// removes the item, update/diagnose leave the listing untouched).
    pub async fn execute(
        &self,
        entity_id: EntityId,
        kind: OperationKind,
        params: Value,
    ) -> Result<Value> {
        let backend = Arc::clone(&self.backend);
        let write_params = params.clone();
        let write = move || async move {
            backend
                .write(WriteRequest::new(entity_id, kind).with_params(write_params))
                .await
        };
        let key = self.list_key.clone();
        match kind {
            OperationKind::Register => {
                self.executor
                    .execute(entity_id, kind, key, patch::append_stub(entity_id, params), write)
                    .await
            }
            OperationKind::Delete => {
                self.executor
                    .execute(entity_id, kind, key, patch::remove_entity(entity_id), write)
                    .await
            }
            OperationKind::Update | OperationKind::Diagnose => {
                self.executor
                    .execute(entity_id, kind, key, patch::keep(), write)
                    .await
            }
        }
    }

    /// Drive a batch of per-item operations and apply the outcome to the
    /// view: successes become overlay-marked and leave the selection,
    /// failures stay selected. Never errors on partial failure.
    pub async fn run_batch<F, Fut>(
        &self,
        items: Vec<EntityId>,
        per_item: F,
    ) -> Result<BatchOutcome>
    where
        F: FnMut(EntityId) -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let (progress, _) = BatchRunner::progress_channel(items.len());
        self.run_batch_observed(items, per_item, progress).await
    }

    /// `run_batch` with an externally observable progress channel.
    pub async fn run_batch_observed<F, Fut>(
        &self,
        items: Vec<EntityId>,
        per_item: F,
        progress: watch::Sender<BatchProgress>,
    ) -> Result<BatchOutcome>
    where
        F: FnMut(EntityId) -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let runner = BatchRunner::new(Arc::clone(&self.cache));
        let aggregate = self.list_key.root();
        let outcome = runner
            .run_batch_observed(items, &aggregate, per_item, progress)
            .await;
        self.apply_outcome(&outcome)?;
        Ok(outcome)
    }

    /// Batch-register the items as golden records. Per-item writes defer
    /// their invalidation to the single aggregate invalidation at the end of
    /// the batch.
    pub async fn register_batch<F>(
        &self,
        items: Vec<EntityId>,
        params_for: F,
    ) -> Result<BatchOutcome>
    where
        F: Fn(EntityId) -> Value,
    {
        let executor = Arc::clone(&self.executor);
        let backend = Arc::clone(&self.backend);
        let key = self.list_key.clone();
        let per_item = move |id: EntityId| {
            let executor = Arc::clone(&executor);
            let backend = Arc::clone(&backend);
            let key = key.clone();
            let params = params_for(id);
            async move {
                let write_params = params.clone();
                let write = move || async move {
                    backend
                        .write(
                            WriteRequest::new(id, OperationKind::Register)
                                .with_params(write_params),
                        )
                        .await
                };
                executor
                    .execute_deferred(
                        id,
                        OperationKind::Register,
                        key,
                        patch::append_stub(id, params),
                        write,
                    )
                    .await
            }
        };
        self.run_batch(items, per_item).await
    }

    /// Stop this view's refetch loops and its overlay reconciler. In-flight
    /// mutations and batch jobs keep running on the process-wide executor.
    pub async fn dispose(self) {
        self.reconciler.abort();
        let subscriptions = self
            .subscriptions
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default();
        for subscription in subscriptions {
            subscription.dispose().await;
        }
    }

    fn apply_outcome(&self, outcome: &BatchOutcome) -> Result<()> {
        {
            let mut overlay = self.overlay.lock()?;
            for id in &outcome.success {
                overlay.mark(*id);
            }
        }
        self.selection.lock()?.prune_confirmed(&outcome.success);
        Ok(())
    }
}

impl Drop for ViewScope {
    fn drop(&mut self) {
        self.reconciler.abort();
        // Remaining subscriptions release themselves via their own Drop.
    }
}

impl std::fmt::Debug for ViewScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewScope")
            .field("list_key", &self.list_key)
            .finish_non_exhaustive()
    }
}

/// Listens for fresh snapshots of the view's list key and feeds their ids to
/// the overlay, clearing markers the server has confirmed.
fn spawn_overlay_reconciler(
    cache: Arc<ReadCache>,
    key: QueryKey,
    overlay: Arc<Mutex<OverlayRegistry>>,
) -> JoinHandle<()> {
    let mut events = cache.events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CacheEvent::Updated { key: updated }) if updated == key => {
                    let snapshot_ids = match cache.get(&key).await {
                        Some(entry) => collect_entity_ids(&entry.data),
                        None => continue,
                    };
                    match overlay.lock() {
                        Ok(mut overlay) => overlay.observe_refetch(&snapshot_ids),
                        Err(_) => break,
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("view '{}' lagged {} cache events", key, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
