// ============================================================================
// OptiSync Library
// ============================================================================

pub mod backend;
pub mod batch;
pub mod cache;
pub mod core;
pub mod mutation;
pub mod view;

// Re-export main types for convenience
pub use backend::{BackendApi, WriteRequest};
pub use batch::{BatchJob, BatchOutcome, BatchProgress, BatchRunner, BatchStatus};
pub use cache::{CacheConfig, CacheEvent, CacheStats, QueryEntry, ReadCache, Subscription};
pub use crate::core::{EntityId, OperationKind, QueryKey, Result, SyncError};
pub use mutation::{MutationExecutor, MutationId, MutationRecord, MutationState};
pub use view::{OverlayRegistry, SelectionController, ViewScope};

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// High-level Client API
// ============================================================================

/// Application-root handle over the optimistic sync layer.
///
/// Owns the process-wide Read Cache and Mutation Executor and manufactures
/// view scopes. Constructed once with the backend collaborator injected, and
/// passed down to views - there is no ambient global instance, which keeps
/// every piece mockable in tests.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use optisync::{BackendApi, Client, QueryKey, Result, WriteRequest};
///
/// struct StaticBackend;
///
/// #[async_trait]
/// impl BackendApi for StaticBackend {
///     async fn fetch(&self, _key: &QueryKey) -> Result<Value> {
///         Ok(json!([]))
///     }
///     async fn write(&self, _request: WriteRequest) -> Result<Value> {
///         Ok(json!({"status": "ok"}))
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let client = Client::new(Arc::new(StaticBackend));
/// let key = QueryKey::new("golden").with("my_function");
///
/// // Nothing fetched yet - reads never block on the network.
/// assert!(client.cache().get(&key).await.is_none());
/// # });
/// ```
pub struct Client {
    backend: Arc<dyn BackendApi>,
    cache: Arc<ReadCache>,
    executor: Arc<MutationExecutor>,
}

impl Client {
    /// Create a client over the given backend with default cache tuning.
    pub fn new(backend: Arc<dyn BackendApi>) -> Self {
        Self::with_config(backend, CacheConfig::default())
    }

    /// Create a client with custom cache tuning.
    pub fn with_config(backend: Arc<dyn BackendApi>, config: CacheConfig) -> Self {
        let cache = ReadCache::with_config(Arc::clone(&backend), config);
        let executor = Arc::new(MutationExecutor::new(Arc::clone(&cache)));
        Self {
            backend,
            cache,
            executor,
        }
    }

    /// The process-wide read cache.
    pub fn cache(&self) -> &Arc<ReadCache> {
        &self.cache
    }

    /// The process-wide mutation executor.
    pub fn executor(&self) -> &Arc<MutationExecutor> {
        &self.executor
    }

    pub fn backend(&self) -> &Arc<dyn BackendApi> {
        &self.backend
    }

    /// Mount a view over a list key: subscribes the key at the given refresh
    /// interval and returns the view's scope (overlay + selection +
    /// lifecycle). Dispose the scope when the view unmounts.
    pub async fn view(&self, list_key: QueryKey, refresh_interval: Duration) -> ViewScope {
        ViewScope::mount(
            Arc::clone(&self.cache),
            Arc::clone(&self.executor),
            Arc::clone(&self.backend),
            list_key,
            refresh_interval,
        )
        .await
    }

    /// One optimistic write routed through the injected backend, for callers
    /// outside any view scope.
    pub async fn execute<P>(
        &self,
        entity_id: EntityId,
        kind: OperationKind,
        key: QueryKey,
        patch: P,
        params: Value,
    ) -> Result<Value>
    where
        P: FnOnce(Option<&Value>) -> Value + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        self.executor
            .execute(entity_id, kind, key, patch, move || async move {
                backend
                    .write(WriteRequest::new(entity_id, kind).with_params(params))
                    .await
            })
            .await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}
