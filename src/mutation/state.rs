// ============================================================================
// Mutation Record State Management
// ============================================================================
//
// Implements the State Pattern for the optimistic mutation lifecycle. Each
// record moves through defined states:
//
//   Idle -> OptimisticApplied -> Reconciled   (write succeeded)
//                             -> RolledBack   (write failed)
//
// Reconciled and RolledBack are absorbing: no transition leaves them. A
// fresh call creates a fresh record.
//
// ============================================================================

use crate::cache::QueryEntry;
use crate::core::{EntityId, OperationKind, Result, SyncError};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global mutation ID counter
static NEXT_MUTATION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a mutation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(pub u64);

impl MutationId {
    /// Generate a new unique mutation ID
    pub fn new() -> Self {
        MutationId(NEXT_MUTATION_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MutationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mut_{}", self.0)
    }
}

/// Mutation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    /// Record created, optimistic projection not yet applied
    Idle,

    /// Optimistic projection applied, write in flight
    OptimisticApplied,

    /// Write succeeded; the relevant keys were invalidated for refetch
    Reconciled,

    /// Write failed; the snapshot was restored
    RolledBack,
}

impl MutationState {
    /// Check if the write is currently in flight
    pub fn is_in_flight(&self) -> bool {
        matches!(self, MutationState::OptimisticApplied)
    }

    /// Check if the record is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, MutationState::Reconciled | MutationState::RolledBack)
    }
}

impl std::fmt::Display for MutationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationState::Idle => write!(f, "IDLE"),
            MutationState::OptimisticApplied => write!(f, "OPTIMISTIC_APPLIED"),
            MutationState::Reconciled => write!(f, "RECONCILED"),
            MutationState::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

/// One tracked write: identity, lifecycle state, and the immutable capture
/// of the cache slice taken immediately before the optimistic projection.
#[derive(Debug)]
pub struct MutationRecord {
    id: MutationId,
    entity_id: EntityId,
    kind: OperationKind,
    state: MutationState,
    /// Pre-projection entry; `None` while Idle, or when the key had no
    /// cached entry before the projection.
    snapshot: Option<QueryEntry>,
    start_time: std::time::Instant,
}

impl MutationRecord {
    pub fn new(id: MutationId, entity_id: EntityId, kind: OperationKind) -> Self {
        Self {
            id,
            entity_id,
            kind,
            state: MutationState::Idle,
            snapshot: None,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn id(&self) -> MutationId {
        self.id
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    pub fn snapshot(&self) -> Option<&QueryEntry> {
        self.snapshot.as_ref()
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Mark the optimistic projection applied, recording the captured
    /// pre-image.
    ///
    /// # Errors
    /// Returns error unless the record is Idle
    pub fn mark_applied(&mut self, snapshot: Option<QueryEntry>) -> Result<()> {
        if self.state != MutationState::Idle {
            return Err(SyncError::InvalidState(format!(
                "cannot apply: mutation {} is {}",
                self.id, self.state
            )));
        }
        self.snapshot = snapshot;
        self.state = MutationState::OptimisticApplied;
        Ok(())
    }

    /// Mark the write reconciled
    ///
    /// # Errors
    /// Returns error unless the write is in flight
    pub fn mark_reconciled(&mut self) -> Result<()> {
        if !self.state.is_in_flight() {
            return Err(SyncError::InvalidState(format!(
                "cannot reconcile: mutation {} is {}",
                self.id, self.state
            )));
        }
        self.state = MutationState::Reconciled;
        Ok(())
    }

    /// Mark the write rolled back
    ///
    /// # Errors
    /// Returns error unless the write is in flight
    pub fn mark_rolled_back(&mut self) -> Result<()> {
        if !self.state.is_in_flight() {
            return Err(SyncError::InvalidState(format!(
                "cannot roll back: mutation {} is {}",
                self.id, self.state
            )));
        }
        self.state = MutationState::RolledBack;
        Ok(())
    }
}
