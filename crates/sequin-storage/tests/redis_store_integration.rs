use std::collections::HashSet;
use std::sync::Arc;

use sequin_storage::{CounterKey, RedisSequenceStore, SequenceStore};
use sequin_test_infra::redis::RedisServer;

async fn start() -> (RedisServer, RedisSequenceStore) {
    let server = RedisServer::new().await.expect("start redis");
    let url = server.url().await.expect("redis url");
    let store = RedisSequenceStore::connect(&url).await.expect("connect redis");
    (server, store)
}

fn key(prefix: &str) -> CounterKey {
    CounterKey::new("ticket", prefix)
}

#[tokio::test]
async fn first_allocation_applies_the_increment() {
    let (_server, store) = start().await;

    assert!(store.current(&key("21")).await.unwrap().is_none());
    assert_eq!(store.allocate(&key("21"), 10).await.unwrap().sequence, 10);
    assert_eq!(store.allocate(&key("21"), 10).await.unwrap().sequence, 20);
    assert_eq!(
        store.current(&key("21")).await.unwrap().unwrap().sequence,
        20
    );
}

#[tokio::test]
async fn separators_inside_key_parts_do_not_collide() {
    let (_server, store) = start().await;
    let left = CounterKey::new("a:b", "c");
    let right = CounterKey::new("a", "b:c");

    store.allocate(&left, 1).await.unwrap();
    store.allocate(&left, 1).await.unwrap();

    assert_eq!(store.allocate(&right, 1).await.unwrap().sequence, 1);
}

#[tokio::test]
async fn start_value_and_reset() {
    let (_server, store) = start().await;
    let store = store.with_start_value(500);

    assert_eq!(store.allocate(&key("21"), 1).await.unwrap().sequence, 500);

    store.reset(&key("21"), 7).await.unwrap();
    assert_eq!(store.allocate(&key("21"), 1).await.unwrap().sequence, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_allocations_never_collide() {
    let (_server, store) = start().await;
    let store = Arc::new(store);
    let mut handles = vec![];

    for _ in 0..50 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.allocate(&key("21"), 1).await.unwrap().sequence
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        assert!(seen.insert(handle.await.unwrap()));
    }
    assert_eq!(seen, (1..=50).collect::<HashSet<_>>());
}
