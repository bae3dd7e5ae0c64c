// ============================================================================
// Mutation Executor
// ============================================================================
//
// Performs a single optimistic write:
//
//   1. De-duplication guard: a second execute for an in-flight
//      (entity, operation) pair coalesces onto the same shared future, so
//      exactly one outbound write is issued and every caller observes the
//      same result.
//   2. Capture a snapshot via ReadCache::set_optimistic.
//   3. Await the opaque write().
//   4. Success: invalidate the resource prefix (a refetch is the source of
//      truth, the write's response is returned but never cached) and mark
//      the record Reconciled.
//   5. Failure: restore the snapshot, mark RolledBack, surface the error.
//
// An invalidation-triggered refetch that resolves after a rollback still
// wins: server data always supersedes optimistic state.
//
// ============================================================================

use super::state::{MutationId, MutationRecord, MutationState};
use crate::cache::ReadCache;
use crate::core::{EntityId, OperationKind, QueryKey, Result};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Instrument, Level, event, info_span};

type SharedWrite = Shared<BoxFuture<'static, Result<Value>>>;
type InFlightMap = Arc<Mutex<HashMap<(EntityId, OperationKind), InFlight>>>;

struct InFlight {
    record: MutationRecord,
    future: SharedWrite,
}

pub struct MutationExecutor {
    cache: Arc<ReadCache>,
    in_flight: InFlightMap,
}

impl MutationExecutor {
    pub fn new(cache: Arc<ReadCache>) -> Self {
        Self {
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// True while a write for the pair is in flight.
    pub async fn is_in_flight(&self, entity_id: EntityId, kind: OperationKind) -> bool {
        self.in_flight.lock().await.contains_key(&(entity_id, kind))
    }

    /// Entity ids with any write currently in flight. Consulted by view
    /// scopes when computing selectable ids.
    pub async fn in_flight_entities(&self) -> BTreeSet<EntityId> {
        self.in_flight
            .lock()
            .await
            .keys()
            .map(|(entity_id, _)| *entity_id)
            .collect()
    }

    /// Current record state for the pair, while one is tracked.
    pub async fn record_state(
        &self,
        entity_id: EntityId,
        kind: OperationKind,
    ) -> Option<MutationState> {
        self.in_flight
            .lock()
            .await
            .get(&(entity_id, kind))
            .map(|slot| slot.record.state())
    }

    /// Execute one optimistic write against `key`'s cache slice.
    ///
    /// `patch` is the pure optimistic projection; `write` is the opaque
    /// backend call. A duplicate call for an in-flight pair issues no second
    /// write and resolves to the same result.
    ///
    /// # Errors
    /// Returns the write's error after the snapshot has been restored.
    pub async fn execute<P, W, Fut>(
        &self,
        entity_id: EntityId,
        kind: OperationKind,
        key: QueryKey,
        patch: P,
        write: W,
    ) -> Result<Value>
    where
        P: FnOnce(Option<&Value>) -> Value + Send + 'static,
        W: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.launch(entity_id, kind, key, patch, write, true).await
    }

    /// `execute` without the on-success invalidation. Used by batch flows,
    /// where one aggregate invalidation at the end of the whole batch
    /// replaces a per-item refetch storm; the caller owns that invalidation.
    pub async fn execute_deferred<P, W, Fut>(
        &self,
        entity_id: EntityId,
        kind: OperationKind,
        key: QueryKey,
        patch: P,
        write: W,
    ) -> Result<Value>
    where
        P: FnOnce(Option<&Value>) -> Value + Send + 'static,
        W: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.launch(entity_id, kind, key, patch, write, false).await
    }

    async fn launch<P, W, Fut>(
        &self,
        entity_id: EntityId,
        kind: OperationKind,
        key: QueryKey,
        patch: P,
        write: W,
        invalidate_on_success: bool,
    ) -> Result<Value>
    where
        P: FnOnce(Option<&Value>) -> Value + Send + 'static,
        W: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let shared = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(existing) = in_flight.get(&(entity_id, kind)) {
                event!(
                    Level::DEBUG,
                    mutation = %existing.record.id(),
                    entity = %entity_id,
                    kind = %kind,
                    "duplicate execute coalesced onto in-flight write"
                );
                existing.future.clone()
            } else {
                let id = MutationId::new();
                let record = MutationRecord::new(id, entity_id, kind);
                let future = Self::drive(
                    Arc::clone(&self.cache),
                    Arc::clone(&self.in_flight),
                    id,
                    entity_id,
                    kind,
                    key,
                    patch,
                    write,
                    invalidate_on_success,
                )
                .boxed()
                .shared();
                in_flight.insert(
                    (entity_id, kind),
                    InFlight {
                        record,
                        future: future.clone(),
                    },
                );
                future
            }
        };
        shared.await
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive<P, W, Fut>(
        cache: Arc<ReadCache>,
        in_flight: InFlightMap,
        id: MutationId,
        entity_id: EntityId,
        kind: OperationKind,
        key: QueryKey,
        patch: P,
        write: W,
        invalidate_on_success: bool,
    ) -> Result<Value>
    where
        P: FnOnce(Option<&Value>) -> Value + Send + 'static,
        W: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let span = info_span!("mutation", mutation = %id, entity = %entity_id, kind = %kind);
        async move {
            let token = cache.set_optimistic(&key, patch).await;
            {
                let mut map = in_flight.lock().await;
                if let Some(slot) = map.get_mut(&(entity_id, kind)) {
                    if let Err(err) = slot.record.mark_applied(token.prior().cloned()) {
                        event!(Level::WARN, %err, "record transition failed");
                    }
                }
            }
            event!(Level::DEBUG, key = %token.key(), "optimistic projection applied");

            match write().await {
                Ok(data) => {
                    if invalidate_on_success {
                        cache.invalidate(&key.root()).await;
                    }
                    Self::finish(&in_flight, entity_id, kind, true).await;
                    event!(Level::INFO, "reconciled");
                    Ok(data)
                }
                Err(err) => {
                    cache.restore(token).await;
                    Self::finish(&in_flight, entity_id, kind, false).await;
                    event!(Level::WARN, %err, "rolled back");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Move the record to its terminal state and discard it. Records are
    /// transient: nothing survives reconciliation or rollback except the
    /// cache itself.
    async fn finish(
        in_flight: &InFlightMap,
        entity_id: EntityId,
        kind: OperationKind,
        reconciled: bool,
    ) {
        let mut map = in_flight.lock().await;
        if let Some(mut slot) = map.remove(&(entity_id, kind)) {
            let transition = if reconciled {
                slot.record.mark_reconciled()
            } else {
                slot.record.mark_rolled_back()
            };
            if let Err(err) = transition {
                event!(Level::WARN, %err, "record transition failed");
            }
        }
    }
}

impl std::fmt::Debug for MutationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationExecutor").finish_non_exhaustive()
    }
}
