// ============================================================================
// Backend API Boundary
// ============================================================================
//
// The one seam between this layer and the dashboard's remote services
// (connection, golden-record, widget and healer endpoints). The core never
// retries and never inspects transport details; retry policy belongs to the
// caller.
//
// ============================================================================

use crate::core::{EntityId, OperationKind, QueryKey, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single write against the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub entity_id: EntityId,
    pub kind: OperationKind,
    /// Operation payload (note/tags for a registration, layout for a widget
    /// update, lookback window for a diagnosis, ...).
    pub params: Value,
}

impl WriteRequest {
    pub fn new(entity_id: EntityId, kind: OperationKind) -> Self {
        Self {
            entity_id,
            kind,
            params: Value::Null,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

/// Backend API collaborator - allows pluggable transports and mock backends
/// in tests.
///
/// `fetch` resolves a query key to its authoritative listing; `write`
/// performs one mutation and resolves to the server's response payload.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Fetch the authoritative data for a query key.
    async fn fetch(&self, key: &QueryKey) -> Result<Value>;

    /// Perform a single write. The response payload is surfaced to the
    /// caller but never written into the read cache; a subsequent refetch
    /// is the source of truth.
    async fn write(&self, request: WriteRequest) -> Result<Value>;
}
