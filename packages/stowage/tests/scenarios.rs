//! End-to-end behavior across the store layers.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use stowage::fetch::mock::MockTransport;
use stowage::{
    FetchError, JsonFileStorage, MemoryStorage, PaginatedFetchStore, QueryOptions, Registry, Store,
};

fn orders_page(request: &stowage::Request) -> Result<Value, FetchError> {
    let page = request.query.get("page").map(String::as_str);
    let limit = request.query.get("limit").map(String::as_str);
    match (request.path.as_str(), page, limit) {
        ("/orders/42", Some("0"), Some("10")) => Ok(json!([{"id": "a"}, {"id": "b"}])),
        _ => Err(MockTransport::not_found(&request.path)),
    }
}

#[tokio::test]
async fn mount_fetch_of_a_short_first_page() {
    let transport = MockTransport::new().with_handler(orders_page);
    let store = PaginatedFetchStore::<Vec<Value>, ()>::builder(transport)
        .path("/orders/42")
        .build()
        .unwrap();

    let loading = Arc::new(Mutex::new(Vec::new()));
    let sink = loading.clone();
    let _sub = store
        .loading_store()
        .subscribe(move |v| sink.lock().unwrap().push(*v));

    let mut query = store.query(QueryOptions::default()).unwrap();
    query.mounted().await;

    assert_eq!(query.data(), vec![json!({"id": "a"}), json!({"id": "b"})]);
    assert_eq!(*loading.lock().unwrap(), vec![true, false]);
    assert!(query.fetched());
    assert!(!query.loading());
    assert!(query.has_reached_end());
    assert_eq!(query.error(), None);
}

#[tokio::test]
async fn load_more_after_the_end_makes_no_request() {
    let transport = MockTransport::new().with_handler(orders_page);
    let store = PaginatedFetchStore::<Vec<Value>, ()>::builder(transport.clone())
        .path("/orders/42")
        .build()
        .unwrap();

    store.fetch(()).await.unwrap();
    let value = store.load_more(()).await.unwrap();

    assert_eq!(value.len(), 2);
    assert_eq!(transport.request_count(), 1);
}

#[test]
fn last_write_wins_and_every_observer_sees_each_write_once() {
    let store = Store::new(0u32);
    let seen: Vec<Arc<Mutex<Vec<u32>>>> = (0..3).map(|_| Arc::new(Mutex::new(Vec::new()))).collect();
    let subs: Vec<_> = seen
        .iter()
        .map(|log| {
            let log = log.clone();
            store.subscribe(move |v| log.lock().unwrap().push(*v))
        })
        .collect();

    store.set(1);
    store.update(|n| n + 10);
    store.set(7);

    assert_eq!(store.get(), 7);
    for log in &seen {
        assert_eq!(*log.lock().unwrap(), vec![1, 11, 7]);
    }
    for sub in subs {
        sub.unsubscribe();
    }
}

#[test]
fn unpersisted_store_is_hydrated_immediately() {
    assert!(Store::new("x".to_string()).is_hydrated());
}

#[tokio::test]
async fn persisted_store_with_nothing_stored_becomes_hydrated() {
    let store = Store::builder(Vec::<String>::new())
        .persist("never-written", MemoryStorage::new())
        .build()
        .unwrap();

    store.hydrated().await;
    assert!(store.is_hydrated());
    assert!(store.get().is_empty());
}

#[tokio::test]
async fn persisted_value_survives_a_new_instance() {
    let dir = tempfile::tempdir().unwrap();
    let storage = JsonFileStorage::new(dir.path()).unwrap();

    let first = Store::builder(Vec::<String>::new())
        .persist("selected-ids", storage.clone())
        .build()
        .unwrap();
    first.hydrated().await;
    first.set(vec!["order-1".to_string(), "order-2".to_string()]);
    first.flush().await.unwrap();

    let second = Store::builder(Vec::<String>::new())
        .persist("selected-ids", storage)
        .build()
        .unwrap();
    second.hydrated().await;

    assert_eq!(
        second.get(),
        vec!["order-1".to_string(), "order-2".to_string()]
    );
}

#[tokio::test]
async fn clear_removes_the_blob_but_keeps_the_value() {
    let storage = MemoryStorage::new();
    let store = Store::builder(0u32)
        .persist("count", storage.clone())
        .build()
        .unwrap();
    store.hydrated().await;

    store.set(3);
    store.flush().await.unwrap();
    assert_eq!(storage.get("count").as_deref(), Some("3"));

    store.clear();
    store.flush().await.unwrap();
    assert_eq!(storage.get("count"), None);
    assert_eq!(store.get(), 3);
}

#[test]
fn registry_hands_out_one_instance_per_key() {
    let registry = Registry::new();

    let from_header = registry
        .get_or_insert_with("selected-ids", || Store::new(Vec::<String>::new()))
        .unwrap();
    let from_list = registry
        .get_or_insert_with("selected-ids", || Store::new(Vec::<String>::new()))
        .unwrap();

    assert!(Store::ptr_eq(&from_header, &from_list));
    from_header.set(vec!["order-9".to_string()]);
    assert_eq!(from_list.get(), vec!["order-9".to_string()]);
}

#[tokio::test]
async fn registry_holds_fetch_stores_too() {
    let registry = Registry::new();
    let transport = MockTransport::new().with_handler(orders_page);

    let make = || {
        PaginatedFetchStore::<Vec<Value>, ()>::builder(transport.clone())
            .path("/orders/42")
            .build()
    };
    let a: PaginatedFetchStore<Vec<Value>, ()> =
        registry.get_or_try_insert_with("orders/42", make).unwrap();
    let b: PaginatedFetchStore<Vec<Value>, ()> =
        registry.get_or_try_insert_with("orders/42", make).unwrap();

    assert!(PaginatedFetchStore::ptr_eq(&a, &b));
    a.fetch(()).await.unwrap();
    assert_eq!(b.data().len(), 2);
}
