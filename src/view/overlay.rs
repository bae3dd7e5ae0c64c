use crate::core::EntityId;
use std::collections::{BTreeSet, HashMap};

/// Default number of refetch cycles a marker survives without the listing
/// ever including its id (e.g. when the endpoint filters it out by design).
pub const DEFAULT_CYCLE_BUDGET: u32 = 3;

/// View-scoped set of entity ids whose mutation succeeded but whose
/// authoritative listing has not been refetched yet.
///
/// Rendering rule for a list backed by cache + overlay: an item is present
/// if it is in the latest cache snapshot OR marked here. The marker is a
/// bridge, never a source of truth - once a fresh snapshot includes the id
/// the marker is cleared, and a bounded number of observed refetch cycles
/// expires it as a fallback.
#[derive(Debug)]
pub struct OverlayRegistry {
    /// id -> refetch cycles left before fallback expiry
    marked: HashMap<EntityId, u32>,
    cycle_budget: u32,
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self::with_cycle_budget(DEFAULT_CYCLE_BUDGET)
    }

    pub fn with_cycle_budget(cycle_budget: u32) -> Self {
        Self {
            marked: HashMap::new(),
            cycle_budget: cycle_budget.max(1),
        }
    }

    pub fn mark(&mut self, id: EntityId) {
        self.marked.insert(id, self.cycle_budget);
    }

    pub fn is_marked(&self, id: EntityId) -> bool {
        self.marked.contains_key(&id)
    }

    pub fn clear(&mut self, id: EntityId) {
        self.marked.remove(&id);
    }

    pub fn clear_all(&mut self) {
        self.marked.clear();
    }

    pub fn ids(&self) -> BTreeSet<EntityId> {
        self.marked.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.marked.is_empty()
    }

    /// Feed a fresh cache snapshot through the registry. Ids the snapshot
    /// now includes are reconciled and cleared; every other marker burns one
    /// cycle of its budget and expires at zero.
    pub fn observe_refetch(&mut self, snapshot_ids: &BTreeSet<EntityId>) {
        self.marked.retain(|id, cycles_left| {
            if snapshot_ids.contains(id) {
                log::debug!("overlay marker {} reconciled by refetch", id);
                return false;
            }
            *cycles_left -= 1;
            if *cycles_left == 0 {
                log::debug!("overlay marker {} expired without reconciliation", id);
                return false;
            }
            true
        });
    }
}

impl Default for OverlayRegistry {
    fn default() -> Self {
        Self::new()
    }
}
