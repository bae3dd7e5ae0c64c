use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Entities (golden records, executions, widgets, connections) are keyed by
/// UUID on the server.
pub type EntityId = Uuid;

/// The write flows of the dashboard. Together with the entity id this forms
/// the de-duplication identity of a mutation: at most one
/// `(EntityId, OperationKind)` pair may be in flight at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Register an execution as a golden record.
    Register,
    /// Delete a golden record or widget.
    Delete,
    /// Update widget layout / connection settings.
    Update,
    /// Run healer diagnosis for a function.
    Diagnose,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Register => write!(f, "register"),
            OperationKind::Delete => write!(f, "delete"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Diagnose => write!(f, "diagnose"),
        }
    }
}

/// Fields probed, in order, when extracting an entity id from a list item.
const ID_FIELDS: [&str; 3] = ["uuid", "id", "execution_uuid"];

/// Extract the entity id of a single list item, if it carries one.
pub fn entity_id_of(item: &Value) -> Option<EntityId> {
    let obj = item.as_object()?;
    ID_FIELDS
        .iter()
        .find_map(|field| obj.get(*field))
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

/// Collect every entity id present in a cached list slice.
pub fn collect_entity_ids(data: &Value) -> BTreeSet<EntityId> {
    let mut ids = BTreeSet::new();
    if let Value::Array(items) = data {
        for item in items {
            if let Some(id) = entity_id_of(item) {
                ids.insert(id);
            }
        }
    }
    ids
}

/// True if the cached list slice contains the entity.
pub fn list_contains(data: &Value, id: EntityId) -> bool {
    match data {
        Value::Array(items) => items.iter().any(|item| entity_id_of(item) == Some(id)),
        _ => false,
    }
}
