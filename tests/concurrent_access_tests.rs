/// Concurrent access tests
///
/// Covers shared refetch loops across views and interleaved mutations over
/// the process-wide cache.
/// Run with: cargo test --test concurrent_access_tests
mod common;

use common::*;
use optisync::mutation::patch;
use optisync::{Client, OperationKind, QueryKey};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const INTERVAL: Duration = Duration::from_secs(300);

#[tokio::test(start_paused = true)]
async fn test_views_share_one_refetch_loop_per_key() {
    let backend = Arc::new(MockBackend::new());
    let key = QueryKey::new("golden");
    let a = Uuid::new_v4();
    backend.set_route(key.clone(), golden_list(&[a]));

    let client = Client::new(backend.clone());
    let mut events = client.cache().events();
    let first = client.cache().subscribe(key.clone(), INTERVAL).await;
    let second = client.cache().subscribe(key.clone(), INTERVAL).await;
    wait_for_update(&mut events, &key).await;

    // Releasing one subscriber keeps the loop alive for the other.
    first.dispose().await;
    client.cache().invalidate(&key).await;
    wait_for_update(&mut events, &key).await;

    // Releasing the last subscriber stops it.
    second.dispose().await;
    let fetches = backend.fetch_count();
    tokio::time::advance(Duration::from_secs(3600)).await;
    tokio::task::yield_now().await;
    assert_eq!(backend.fetch_count(), fetches);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_mutations_converge_with_refetch() {
    let backend = Arc::new(MockBackend::new());
    let key = QueryKey::new("golden");
    let a = Uuid::new_v4();
    backend.set_route(key.clone(), golden_list(&[a]));

    let client = Arc::new(Client::new(backend.clone()));
    let mut events = client.cache().events();
    let subscription = client.cache().subscribe(key.clone(), INTERVAL).await;
    wait_for_update(&mut events, &key).await;

    let b = Uuid::new_v4();
    let c = Uuid::new_v4();
    backend.set_route(key.clone(), golden_list(&[a, b, c]));

    let mut handles = Vec::new();
    for id in [b, c] {
        let client = Arc::clone(&client);
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            client
                .execute(
                    id,
                    OperationKind::Register,
                    key,
                    patch::append_stub(id, Value::Null),
                    Value::Null,
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(backend.write_count(), 2);

    wait_for_update(&mut events, &key).await;
    // Either completion order converges to the same server truth.
    let mut settled = client.cache().get(&key).await.unwrap();
    for _ in 0..100 {
        if settled.data == golden_list(&[a, b, c]) && !settled.stale {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        settled = client.cache().get(&key).await.unwrap();
    }
    assert_eq!(settled.data, golden_list(&[a, b, c]));
    assert!(!settled.stale);

    subscription.dispose().await;
}
