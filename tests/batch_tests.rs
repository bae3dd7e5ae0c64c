/// Batch runner tests
///
/// Covers sequential per-item execution, failure isolation with retained
/// reasons, the partition invariant, the single aggregate invalidation, and
/// the progress signal.
/// Run with: cargo test --test batch_tests
mod common;

use common::*;
use optisync::mutation::patch;
use optisync::{BatchRunner, Client, OperationKind, QueryKey, SyncError, WriteRequest};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const INTERVAL: Duration = Duration::from_secs(300);

type PerItemOp = Box<dyn FnMut(Uuid) -> Pin<Box<dyn Future<Output = optisync::Result<Value>>>>>;

/// Per-item operation mirroring a golden batch registration: deferred
/// invalidation, write routed through the backend.
fn register_op(client: &Arc<Client>, key: &QueryKey) -> PerItemOp {
    let client = Arc::clone(client);
    let key = key.clone();
    Box::new(move |id: Uuid| {
        let client = Arc::clone(&client);
        let key = key.clone();
        Box::pin(async move {
            let backend = Arc::clone(client.backend());
            client
                .executor()
                .execute_deferred(
                    id,
                    OperationKind::Register,
                    key,
                    patch::append_stub(id, Value::Null),
                    move || async move {
                        backend
                            .write(WriteRequest::new(id, OperationKind::Register))
                            .await
                    },
                )
                .await
        })
    })
}

#[tokio::test(start_paused = true)]
async fn test_partial_failure_partitions_batch() {
    let backend = Arc::new(MockBackend::new());
    let key = QueryKey::new("golden");
    backend.set_route(key.clone(), golden_list(&[]));

    let client = Arc::new(Client::new(backend.clone()));
    let mut events = client.cache().events();
    let subscription = client.cache().subscribe(key.clone(), INTERVAL).await;
    wait_for_update(&mut events, &key).await;

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();
    backend.fail_write(b);

    let runner = BatchRunner::new(Arc::clone(client.cache()));
    let outcome = runner
        .run_batch(vec![a, b, c], &key, register_op(&client, &key))
        .await;

    // Exactly one side per input id, reasons retained.
    assert_eq!(outcome.total(), 3);
    assert_eq!(outcome.success, BTreeSet::from([a, c]));
    assert_eq!(outcome.failed_ids(), BTreeSet::from([b]));
    assert!(matches!(outcome.failures[&b], SyncError::Network(_)));
    assert!(!outcome.is_full_success());

    // All three writes were attempted, in input order.
    let log = backend.write_log();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0].entity_id, a);
    assert_eq!(log[1].entity_id, b);
    assert_eq!(log[2].entity_id, c);

    // One aggregate invalidation at the end, no per-item refetch storm.
    assert_eq!(client.cache().stats().invalidations, 1);

    subscription.dispose().await;
}

#[tokio::test]
async fn test_failed_item_rollback_is_isolated() {
    let backend = Arc::new(MockBackend::new());
    let key = QueryKey::new("golden");
    let client = Arc::new(Client::new(backend.clone()));

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    backend.fail_write(b);

    let runner = BatchRunner::new(Arc::clone(client.cache()));
    let outcome = runner
        .run_batch(vec![a, b], &key, register_op(&client, &key))
        .await;
    assert_eq!(outcome.success, BTreeSet::from([a]));

    // b's rollback removed only b's stub; a's optimistic stub survives until
    // the refetch replaces the slice.
    let data = client.cache().get(&key).await.unwrap().data;
    let items = data.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["uuid"], json!(a.to_string()));
}

#[tokio::test]
async fn test_progress_signal_is_monotonic() {
    let backend = Arc::new(MockBackend::new());
    let key = QueryKey::new("golden");
    let client = Arc::new(Client::new(backend.clone()));

    let items: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
    backend.fail_write(items[2]);

    let (progress_tx, mut progress_rx) = BatchRunner::progress_channel(items.len());
    let watcher = tokio::spawn(async move {
        let mut seen = Vec::new();
        loop {
            if progress_rx.changed().await.is_err() {
                break;
            }
            let progress = *progress_rx.borrow();
            seen.push(progress);
            if progress.done() {
                break;
            }
        }
        seen
    });

    let runner = BatchRunner::new(Arc::clone(client.cache()));
    let outcome = runner
        .run_batch_observed(items.clone(), &key, register_op(&client, &key), progress_tx)
        .await;
    assert_eq!(outcome.total(), 4);

    let seen = watcher.await.unwrap();
    assert!(!seen.is_empty());
    for window in seen.windows(2) {
        assert!(window[1].processed >= window[0].processed);
    }
    let last = seen.last().unwrap();
    assert_eq!(last.processed, 4);
    assert_eq!(last.total, 4);
}

#[tokio::test]
async fn test_empty_batch_completes_cleanly() {
    let backend = Arc::new(MockBackend::new());
    let key = QueryKey::new("golden");
    let client = Arc::new(Client::new(backend.clone()));

    let runner = BatchRunner::new(Arc::clone(client.cache()));
    let outcome = runner
        .run_batch(Vec::new(), &key, register_op(&client, &key))
        .await;

    assert_eq!(outcome.total(), 0);
    assert!(outcome.is_full_success());
    assert_eq!(backend.write_count(), 0);
}
