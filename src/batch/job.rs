use crate::core::{EntityId, SyncError};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Batch lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    Running,
    Completed,
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::Pending => write!(f, "PENDING"),
            BatchStatus::Running => write!(f, "RUNNING"),
            BatchStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// Monotonic progress signal published after each item settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub processed: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn done(&self) -> bool {
        self.processed >= self.total
    }
}

/// One multi-item operation in flight.
///
/// Invariant: the success and failure sets are disjoint and together cover
/// exactly the prefix of `items` already processed (`cursor`); on completion
/// they partition the full input.
#[derive(Debug)]
pub struct BatchJob {
    items: Vec<EntityId>,
    success: BTreeSet<EntityId>,
    failures: BTreeMap<EntityId, SyncError>,
    cursor: usize,
    status: BatchStatus,
}

impl BatchJob {
    pub fn new(items: Vec<EntityId>) -> Self {
        Self {
            items,
            success: BTreeSet::new(),
            failures: BTreeMap::new(),
            cursor: 0,
            status: BatchStatus::Pending,
        }
    }

    pub fn items(&self) -> &[EntityId] {
        &self.items
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn progress(&self) -> BatchProgress {
        BatchProgress {
            processed: self.cursor,
            total: self.items.len(),
        }
    }

    pub(crate) fn start(&mut self) {
        if self.status == BatchStatus::Pending {
            self.status = BatchStatus::Running;
        }
    }

    pub(crate) fn record_success(&mut self, id: EntityId) {
        self.success.insert(id);
        self.cursor += 1;
        debug_assert_eq!(self.success.len() + self.failures.len(), self.cursor);
    }

    pub(crate) fn record_failure(&mut self, id: EntityId, error: SyncError) {
        self.failures.insert(id, error);
        self.cursor += 1;
        debug_assert_eq!(self.success.len() + self.failures.len(), self.cursor);
    }

    pub(crate) fn complete(&mut self) {
        self.status = BatchStatus::Completed;
    }

    pub fn into_outcome(self) -> BatchOutcome {
        BatchOutcome {
            success: self.success,
            failures: self.failures,
        }
    }
}

/// Partitioned result of a batch: every input id lands in exactly one side.
/// Partial failure is data, never an exception - callers inspect `failures`
/// (with the per-item reason) and can offer a targeted retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub success: BTreeSet<EntityId>,
    pub failures: BTreeMap<EntityId, SyncError>,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.success.len() + self.failures.len()
    }

    pub fn is_full_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_ids(&self) -> BTreeSet<EntityId> {
        self.failures.keys().copied().collect()
    }
}
