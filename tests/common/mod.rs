#![allow(dead_code)]

use async_trait::async_trait;
use optisync::{BackendApi, CacheEvent, EntityId, QueryKey, Result, SyncError, WriteRequest};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// Scripted backend: per-key fetch routes, per-entity write failures, and a
/// log of every write issued.
pub struct MockBackend {
    routes: Mutex<HashMap<QueryKey, Value>>,
    failing_writes: Mutex<HashSet<EntityId>>,
    writes: Mutex<Vec<WriteRequest>>,
    fetches: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            failing_writes: Mutex::new(HashSet::new()),
            writes: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn set_route(&self, key: QueryKey, value: Value) {
        self.routes.lock().unwrap().insert(key, value);
    }

    pub fn clear_route(&self, key: &QueryKey) {
        self.routes.lock().unwrap().remove(key);
    }

    pub fn fail_write(&self, id: EntityId) {
        self.failing_writes.lock().unwrap().insert(id);
    }

    pub fn heal_write(&self, id: EntityId) {
        self.failing_writes.lock().unwrap().remove(&id);
    }

    pub fn write_log(&self) -> Vec<WriteRequest> {
        self.writes.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendApi for MockBackend {
    async fn fetch(&self, key: &QueryKey) -> Result<Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.routes
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| SyncError::Backend(format!("no route for '{}'", key)))
    }

    async fn write(&self, request: WriteRequest) -> Result<Value> {
        self.writes.lock().unwrap().push(request.clone());
        if self
            .failing_writes
            .lock()
            .unwrap()
            .contains(&request.entity_id)
        {
            return Err(SyncError::Network(format!(
                "write rejected for {}",
                request.entity_id
            )));
        }
        Ok(json!({"status": "ok", "uuid": request.entity_id.to_string()}))
    }
}

/// A list row shaped like a golden-dataset item.
pub fn golden_row(id: EntityId) -> Value {
    json!({"uuid": id.to_string(), "function_name": "fn_a"})
}

pub fn golden_list(ids: &[EntityId]) -> Value {
    Value::Array(ids.iter().map(|id| golden_row(*id)).collect())
}

/// Await the next cache event matching the predicate, with a timeout.
pub async fn wait_for_event<F>(rx: &mut broadcast::Receiver<CacheEvent>, pred: F) -> CacheEvent
where
    F: Fn(&CacheEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for cache event")
}

pub async fn wait_for_update(rx: &mut broadcast::Receiver<CacheEvent>, key: &QueryKey) {
    wait_for_event(rx, |event| {
        matches!(event, CacheEvent::Updated { key: updated } if updated == key)
    })
    .await;
}
