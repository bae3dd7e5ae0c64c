//! Optimistic projections for the common list-slice shapes.
//!
//! A projection is a pure transform from the current cache slice to the
//! patched one; the executor captures the pre-image before applying it.

use crate::core::{EntityId, entity_id_of};
use serde_json::{Map, Value};

/// Append a stub item carrying the entity id (plus any known fields) to a
/// cached list, e.g. a just-registered golden record pending its refetch.
pub fn append_stub(
    id: EntityId,
    body: Value,
) -> impl FnOnce(Option<&Value>) -> Value + Send + 'static {
    move |current| {
        let mut items = match current {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        let mut stub = match body {
            Value::Object(fields) => fields,
            Value::Null => Map::new(),
            other => {
                let mut fields = Map::new();
                fields.insert("value".to_string(), other);
                fields
            }
        };
        stub.insert("uuid".to_string(), Value::String(id.to_string()));
        items.push(Value::Object(stub));
        Value::Array(items)
    }
}

/// Remove the entity's item from a cached list.
pub fn remove_entity(id: EntityId) -> impl FnOnce(Option<&Value>) -> Value + Send + 'static {
    move |current| match current {
        Some(Value::Array(items)) => Value::Array(
            items
                .iter()
                .filter(|item| entity_id_of(item) != Some(id))
                .cloned()
                .collect(),
        ),
        Some(other) => other.clone(),
        None => Value::Array(Vec::new()),
    }
}

/// Identity projection for writes that do not change the listing (e.g. a
/// healer diagnosis). The snapshot/rollback machinery still runs.
pub fn keep() -> impl FnOnce(Option<&Value>) -> Value + Send + 'static {
    |current| current.cloned().unwrap_or(Value::Array(Vec::new()))
}
