// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Behavior shared by every runnable store implementation.

use std::sync::Arc;

use runplane_core::model::{Runnable, State};
use runplane_core::store::{
    InMemoryRunnableStore, RunnableStore, RunnableStores, SqliteRunnableStore, connect_sqlite,
};

fn runnable(id: &str) -> Runnable {
    let mut runnable = Runnable::new(id, "proj", "container", "container+job", "job");
    runnable.image = Some("busybox".to_string());
    runnable.args = vec!["echo".to_string(), "hi".to_string()];
    runnable
}

async fn stores() -> Vec<Arc<dyn RunnableStore>> {
    let pool = connect_sqlite("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");
    vec![
        Arc::new(InMemoryRunnableStore::new("job")) as Arc<dyn RunnableStore>,
        Arc::new(SqliteRunnableStore::new(pool, "job")) as Arc<dyn RunnableStore>,
    ]
}

#[tokio::test]
async fn test_roundtrip_and_not_found_after_remove() {
    for store in stores().await {
        let original = runnable("r1");
        store.store("r1", &original).await.unwrap();
        assert_eq!(store.find("r1").await.unwrap(), original);

        store.remove("r1").await.unwrap();
        let err = store.find("r1").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.error_code(), "NOT_FOUND");
    }
}

#[tokio::test]
async fn test_find_all_sees_every_runnable() {
    for store in stores().await {
        for id in ["b", "a", "c"] {
            store.store(id, &runnable(id)).await.unwrap();
        }
        let ids: Vec<String> = store
            .find_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}

#[tokio::test]
async fn test_concurrent_writers_last_one_wins() {
    for store in stores().await {
        let mut handles = Vec::new();
        for state in [State::Ready, State::Running, State::Completed] {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut r = runnable("r1");
                r.set_state(state);
                store.store("r1", &r).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let found = store.find("r1").await.unwrap();
        assert!(matches!(
            found.state,
            State::Ready | State::Running | State::Completed
        ));
        assert_eq!(store.find_all().await.unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_fan_out_first_match_wins() {
    let pool = connect_sqlite("sqlite::memory:").await.unwrap();
    let jobs: Arc<dyn RunnableStore> = Arc::new(SqliteRunnableStore::new(pool, "job"));
    let services: Arc<dyn RunnableStore> = Arc::new(InMemoryRunnableStore::new("service"));

    let mut service = Runnable::new("r1", "proj", "container", "container+serve", "service");
    service.replicas = Some(2);
    services.store("r1", &service).await.unwrap();
    jobs.store("r2", &runnable("r2")).await.unwrap();

    let stores = RunnableStores::new()
        .with(jobs)
        .unwrap()
        .with(services)
        .unwrap();

    assert_eq!(stores.locate("r1", |_| true).await.unwrap().kind, "service");
    assert_eq!(stores.locate("r2", |_| true).await.unwrap().kind, "job");
    assert!(stores.locate("r3", |_| true).await.unwrap_err().is_not_found());
}
