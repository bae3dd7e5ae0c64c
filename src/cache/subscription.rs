use super::store::ReadCache;
use crate::core::QueryKey;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Per-key refetch-loop bookkeeping held by the cache.
pub(crate) struct SubscriberSlot {
    pub(crate) count: usize,
    pub(crate) notify: Arc<Notify>,
    pub(crate) task: JoinHandle<()>,
}

impl SubscriberSlot {
    pub(crate) fn new(notify: Arc<Notify>, task: JoinHandle<()>) -> Self {
        Self {
            count: 1,
            notify,
            task,
        }
    }
}

/// One loop per subscribed key: fetches immediately on the first tick, then
/// refetches on every interval tick or as soon as an invalidation wakes it.
/// Holds the cache weakly and exits once the cache itself is gone.
pub(crate) fn spawn_refetch_loop(
    cache: Weak<ReadCache>,
    key: QueryKey,
    refresh_interval: Duration,
    notify: Arc<Notify>,
) -> JoinHandle<()> {
    let period = refresh_interval.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = notify.notified() => {}
            }
            match cache.upgrade() {
                Some(cache) => cache.refresh(&key).await,
                None => break,
            }
        }
    })
}

/// Guard for one view's interest in one key.
///
/// Prefer `dispose().await` when the view unmounts. Dropping the guard
/// without disposing schedules the release on the current runtime as a best
/// effort, mirroring how a pooled connection guard treats an unclosed drop.
pub struct Subscription {
    cache: Weak<ReadCache>,
    key: QueryKey,
    active: bool,
}

impl Subscription {
    pub(crate) fn new(cache: Weak<ReadCache>, key: QueryKey) -> Self {
        Self {
            cache,
            key,
            active: true,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Release this subscription. The key's last subscriber stops the
    /// refetch loop and retires the entry.
    pub async fn dispose(mut self) {
        self.active = false;
        if let Some(cache) = self.cache.upgrade() {
            cache.release(&self.key).await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let Some(cache) = self.cache.upgrade() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let key = self.key.clone();
            handle.spawn(async move {
                cache.release(&key).await;
            });
        } else {
            log::warn!(
                "subscription for '{}' dropped outside a runtime; refetch loop stops with the cache",
                self.key
            );
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("active", &self.active)
            .finish()
    }
}
