use crate::core::EntityId;
use std::collections::BTreeSet;

/// View-scoped set of entity ids chosen for a pending batch operation.
///
/// `select_all` is a bidirectional toggle: invoked while the selection
/// already equals the full selectable set it clears instead of re-selecting.
/// The caller supplies `selectable` with overlay-marked and mid-mutation ids
/// already excluded.
#[derive(Debug, Default)]
pub struct SelectionController {
    selected: BTreeSet<EntityId>,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip one id. Returns whether the id is selected afterwards.
    pub fn toggle(&mut self, id: EntityId) -> bool {
        if self.selected.remove(&id) {
            false
        } else {
            self.selected.insert(id);
            true
        }
    }

    pub fn is_selected(&self, id: EntityId) -> bool {
        self.selected.contains(&id)
    }

    pub fn selected(&self) -> &BTreeSet<EntityId> {
        &self.selected
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// True iff the selection equals the selectable set exactly.
    pub fn is_exhaustive(&self, selectable: &BTreeSet<EntityId>) -> bool {
        self.selected == *selectable
    }

    /// Select-all/deselect-all fusion: exhaustive -> clear, otherwise the
    /// selection becomes exactly the selectable set.
    pub fn select_all(&mut self, selectable: &BTreeSet<EntityId>) {
        if self.is_exhaustive(selectable) {
            self.selected.clear();
        } else {
            self.selected = selectable.clone();
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Remove one id, e.g. when it becomes overlay-confirmed.
    pub fn deselect(&mut self, id: EntityId) {
        self.selected.remove(&id);
    }

    /// Post-batch pruning: successful ids leave the selection, failed ids
    /// stay selected so the user can retry them directly.
    pub fn prune_confirmed(&mut self, confirmed: &BTreeSet<EntityId>) {
        self.selected.retain(|id| !confirmed.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ids(n: usize) -> Vec<EntityId> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn test_toggle() {
        let mut selection = SelectionController::new();
        let id = Uuid::new_v4();
        assert!(selection.toggle(id));
        assert!(selection.is_selected(id));
        assert!(!selection.toggle(id));
        assert!(selection.is_empty());
    }

    #[test]
    fn test_select_all_fusion() {
        let all = ids(3);
        let selectable: BTreeSet<EntityId> = all.iter().copied().collect();
        let mut selection = SelectionController::new();

        selection.select_all(&selectable);
        assert!(selection.is_exhaustive(&selectable));
        assert_eq!(selection.len(), 3);

        selection.select_all(&selectable);
        assert!(selection.is_empty());
    }

    #[test]
    fn test_select_all_from_partial_selects_everything() {
        let all = ids(3);
        let selectable: BTreeSet<EntityId> = all.iter().copied().collect();
        let mut selection = SelectionController::new();

        selection.toggle(all[0]);
        assert!(!selection.is_exhaustive(&selectable));

        selection.select_all(&selectable);
        assert!(selection.is_exhaustive(&selectable));
    }

    #[test]
    fn test_prune_confirmed_keeps_failures() {
        let all = ids(3);
        let mut selection = SelectionController::new();
        for id in &all {
            selection.toggle(*id);
        }

        let confirmed = BTreeSet::from([all[0], all[2]]);
        selection.prune_confirmed(&confirmed);

        assert!(!selection.is_selected(all[0]));
        assert!(selection.is_selected(all[1]));
        assert!(!selection.is_selected(all[2]));
    }
}
