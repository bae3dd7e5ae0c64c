pub mod error;
pub mod key;
pub mod types;

pub use error::{Result, SyncError};
pub use key::QueryKey;
pub use types::{EntityId, OperationKind, collect_entity_ids, entity_id_of, list_contains};
