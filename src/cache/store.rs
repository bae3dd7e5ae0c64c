// ============================================================================
// Read Cache
// ============================================================================
//
// Process-wide store of last-known server data, keyed by QueryKey.
// Reads never block on the network: `get` serves the last fetched value even
// when it is stale. Writers are serialized per key (each entry sits behind
// its own lock, the same layout the storage engine uses for tables).
//
// Optimistic projections go through `set_optimistic`/`restore`: the returned
// token captures the exact pre-projection entry, and `restore` re-applies it
// as a hard overwrite. Server data always supersedes a projection - the next
// refetch simply replaces the entry.
//
// ============================================================================

use super::entry::{QueryEntry, RestoreToken};
use super::subscription::{self, SubscriberSlot, Subscription};
use crate::backend::BackendApi;
use crate::core::QueryKey;
use lru::LruCache;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock, broadcast};

/// Push notification emitted on every cache state change. View components
/// subscribe on mount and re-render on receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// Fresh server data was written for the key.
    Updated { key: QueryKey },
    /// The key was patched locally (optimistic apply or rollback restore).
    Patched { key: QueryKey },
    /// The key was marked stale by an invalidation.
    Invalidated { key: QueryKey },
    /// The key's last subscriber left; the entry moved to the retired store.
    Retired { key: QueryKey },
}

/// Read cache tuning knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Capacity of the retired-entry store (entries whose last subscriber
    /// unsubscribed, kept so a remounted view renders instantly).
    pub retired_capacity: usize,
    /// Buffer size of the broadcast event channel.
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retired_capacity: 64,
            event_capacity: 128,
        }
    }
}

impl CacheConfig {
    pub fn retired_capacity(mut self, capacity: usize) -> Self {
        self.retired_capacity = capacity;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// Snapshot of the cache's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub refetches: u64,
    pub optimistic_applies: u64,
    pub restores: u64,
    pub invalidations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    refetches: AtomicU64,
    optimistic_applies: AtomicU64,
    restores: AtomicU64,
    invalidations: AtomicU64,
}

pub struct ReadCache {
    backend: Arc<dyn BackendApi>,
    /// Weak handle to this cache, for the refetch loops it spawns. Loops
    /// upgrade per cycle and exit once the cache is gone.
    handle: Weak<ReadCache>,
    /// Live entries, one lock per key.
    entries: RwLock<HashMap<QueryKey, Arc<RwLock<QueryEntry>>>>,
    /// Refetch-loop bookkeeping for subscribed keys.
    subscribers: Mutex<HashMap<QueryKey, SubscriberSlot>>,
    /// Last-known data for keys with no remaining subscriber.
    retired: Mutex<LruCache<QueryKey, QueryEntry>>,
    events: broadcast::Sender<CacheEvent>,
    counters: Counters,
}

impl ReadCache {
    pub fn new(backend: Arc<dyn BackendApi>) -> Arc<Self> {
        Self::with_config(backend, CacheConfig::default())
    }

    pub fn with_config(backend: Arc<dyn BackendApi>, config: CacheConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let retired_capacity =
            NonZeroUsize::new(config.retired_capacity).unwrap_or(NonZeroUsize::MIN);
        Arc::new_cyclic(|handle| Self {
            backend,
            handle: handle.clone(),
            entries: RwLock::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            retired: Mutex::new(LruCache::new(retired_capacity)),
            events,
            counters: Counters::default(),
        })
    }

    /// Subscribe to cache push notifications.
    pub fn events(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Last-known entry for the key, live or retired. Never blocks on the
    /// network; a stale entry is returned as-is.
    pub async fn get(&self, key: &QueryKey) -> Option<QueryEntry> {
        {
            let entries = self.entries.read().await;
            if let Some(slot) = entries.get(key) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(slot.read().await.clone());
            }
        }
        let mut retired = self.retired.lock().await;
        match retired.get(key) {
            Some(entry) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Subscribe a view to a key. The first subscriber spawns the refetch
    /// loop (initial fetch, then one refetch per interval tick or stale
    /// wakeup); later subscribers share it. Dispose the returned guard when
    /// the view unmounts.
    pub async fn subscribe(&self, key: QueryKey, refresh_interval: Duration) -> Subscription {
        let mut subscribers = self.subscribers.lock().await;
        match subscribers.get_mut(&key) {
            Some(slot) => {
                slot.count += 1;
            }
            None => {
                let notify = Arc::new(Notify::new());
                let task = subscription::spawn_refetch_loop(
                    self.handle.clone(),
                    key.clone(),
                    refresh_interval,
                    Arc::clone(&notify),
                );
                subscribers.insert(key.clone(), SubscriberSlot::new(notify, task));
                log::debug!("refetch loop started for '{}'", key);
            }
        }
        Subscription::new(self.handle.clone(), key)
    }

    /// Mark every entry under the prefix stale and wake the matching refetch
    /// loops. Never fetches synchronously: the loops pick the work up on
    /// their next cycle.
    pub async fn invalidate(&self, prefix: &QueryKey) {
        let mut touched = Vec::new();
        {
            let entries = self.entries.read().await;
            for (key, slot) in entries.iter() {
                if key.starts_with(prefix) {
                    slot.write().await.stale = true;
                    touched.push(key.clone());
                }
            }
        }
        {
            let subscribers = self.subscribers.lock().await;
            for (key, slot) in subscribers.iter() {
                if key.starts_with(prefix) {
                    slot.notify.notify_one();
                }
            }
        }
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        log::debug!("invalidated prefix '{}' ({} entries)", prefix, touched.len());
        for key in touched {
            let _ = self.events.send(CacheEvent::Invalidated { key });
        }
    }

    /// Apply a pure transform to the key's slice synchronously and return a
    /// token capturing the exact pre-transform entry. A key with no entry
    /// yet gets a projected (stale-born) entry; its token records the
    /// absence so restore removes it again.
    pub async fn set_optimistic<F>(&self, key: &QueryKey, patch: F) -> RestoreToken
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let mut entries = self.entries.write().await;
        let token = match entries.get(key).cloned() {
            Some(slot) => {
                let mut entry = slot.write().await;
                let prior = entry.clone();
                entry.data = patch(Some(&prior.data));
                RestoreToken {
                    key: key.clone(),
                    prior: Some(prior),
                }
            }
            None => {
                let entry = QueryEntry::projected(patch(None));
                entries.insert(key.clone(), Arc::new(RwLock::new(entry)));
                RestoreToken {
                    key: key.clone(),
                    prior: None,
                }
            }
        };
        drop(entries);
        self.counters.optimistic_applies.fetch_add(1, Ordering::Relaxed);
        let _ = self.events.send(CacheEvent::Patched { key: key.clone() });
        token
    }

    /// Re-apply the token's captured pre-image as a hard overwrite,
    /// regardless of what has happened to the entry in between. If the key
    /// moved to the retired store (the owning view was disposed while the
    /// write was in flight) the retired copy is restored instead; a key that
    /// is nowhere cached any more makes this a silent no-op.
    pub async fn restore(&self, token: RestoreToken) {
        let mut entries = self.entries.write().await;
        match entries.get(&token.key).cloned() {
            Some(slot) => {
                match token.prior {
                    Some(prior) => {
                        *slot.write().await = prior;
                    }
                    None => {
                        entries.remove(&token.key);
                    }
                }
                drop(entries);
            }
            None => {
                drop(entries);
                let mut retired = self.retired.lock().await;
                if !retired.contains(&token.key) {
                    log::debug!("restore for '{}' skipped: key no longer cached", token.key);
                    return;
                }
                match token.prior {
                    Some(prior) => {
                        retired.put(token.key.clone(), prior);
                    }
                    None => {
                        retired.pop(&token.key);
                    }
                }
            }
        }
        self.counters.restores.fetch_add(1, Ordering::Relaxed);
        let _ = self.events.send(CacheEvent::Patched { key: token.key });
    }

    /// Fetch the key from the backend and replace its entry. A failed fetch
    /// keeps the last-known value in place.
    pub(crate) async fn refresh(&self, key: &QueryKey) {
        match self.backend.fetch(key).await {
            Ok(data) => {
                let mut entries = self.entries.write().await;
                match entries.get(key).cloned() {
                    Some(slot) => {
                        *slot.write().await = QueryEntry::fresh(data);
                    }
                    None => {
                        entries.insert(key.clone(), Arc::new(RwLock::new(QueryEntry::fresh(data))));
                    }
                }
                drop(entries);
                self.counters.refetches.fetch_add(1, Ordering::Relaxed);
                let _ = self.events.send(CacheEvent::Updated { key: key.clone() });
            }
            Err(err) => {
                log::warn!("refetch of '{}' failed: {}", key, err);
            }
        }
    }

    /// Drop one subscription for the key. The last one aborts the refetch
    /// loop and moves the entry into the retired store.
    pub(crate) async fn release(&self, key: &QueryKey) {
        let mut subscribers = self.subscribers.lock().await;
        match subscribers.get_mut(key) {
            Some(slot) if slot.count > 1 => {
                slot.count -= 1;
                return;
            }
            Some(_) => {
                if let Some(slot) = subscribers.remove(key) {
                    slot.task.abort();
                }
            }
            None => return,
        }
        drop(subscribers);

        let removed = {
            let mut entries = self.entries.write().await;
            entries.remove(key)
        };
        if let Some(slot) = removed {
            let entry = slot.read().await.clone();
            self.retired.lock().await.put(key.clone(), entry);
            let _ = self.events.send(CacheEvent::Retired { key: key.clone() });
        }
        log::debug!("refetch loop stopped for '{}'", key);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            refetches: self.counters.refetches.load(Ordering::Relaxed),
            optimistic_applies: self.counters.optimistic_applies.load(Ordering::Relaxed),
            restores: self.counters.restores.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ReadCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
