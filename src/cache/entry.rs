use crate::core::QueryKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Last-known server data for one query key.
///
/// `stale` marks the entry for refetch by the next active subscriber cycle;
/// a stale entry is still served by `get` (reads never block on the network).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEntry {
    pub data: Value,
    pub fetched_at: DateTime<Utc>,
    pub stale: bool,
}

impl QueryEntry {
    /// Entry holding freshly fetched server data.
    pub fn fresh(data: Value) -> Self {
        Self {
            data,
            fetched_at: Utc::now(),
            stale: false,
        }
    }

    /// Entry created by an optimistic projection before any server data
    /// exists for the key. Born stale so the next refetch cycle replaces it.
    pub fn projected(data: Value) -> Self {
        Self {
            data,
            fetched_at: Utc::now(),
            stale: true,
        }
    }
}

/// Opaque capture of a cache slice taken immediately before an optimistic
/// projection. `ReadCache::restore` re-applies the captured value as a hard
/// overwrite; `prior == None` records that the key had no entry at all, so
/// restoring removes the projected entry.
#[derive(Debug, Clone)]
pub struct RestoreToken {
    pub(crate) key: QueryKey,
    pub(crate) prior: Option<QueryEntry>,
}

impl RestoreToken {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// The captured pre-image, if the key existed before the projection.
    pub fn prior(&self) -> Option<&QueryEntry> {
        self.prior.as_ref()
    }
}
