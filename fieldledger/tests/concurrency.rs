use axum::{body::Body, http::Request, http::StatusCode};
use fieldledger_core::{DataStore, StoreError};
use futures::future::join_all;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower::util::ServiceExt;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_http_creates_are_not_lost() {
    let tempdir = tempfile::tempdir().unwrap();
    let store = DataStore::open(tempdir.path().join("db.json"));
    let app = fieldledger::app(store.clone());

    let requests = (0..40).map(|i| {
        let app = app.clone();
        tokio::spawn(async move {
            let req = Request::builder()
                .method("POST")
                .uri("/api/assets")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"name": format!("Asset {i}"), "serialNumber": format!("SN-{i}")})
                        .to_string(),
                ))
                .unwrap();
            app.oneshot(req).await.unwrap().status()
        })
    });

    for status in join_all(requests).await {
        assert_eq!(status.unwrap(), StatusCode::CREATED);
    }

    let assets = store.list("assets").await.unwrap();
    assert_eq!(assets.len(), 40);
    let mut ids: Vec<&str> = assets.iter().map(|a| a["id"].as_str().unwrap()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_always_parses_while_writes_are_in_flight() {
    let tempdir = tempfile::tempdir().unwrap();
    let path = tempdir.path().join("db.json");
    let store = DataStore::open(&path);
    store.init().await.unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let done = done.clone();
        let path = path.clone();
        tokio::spawn(async move {
            let mut reads = 0usize;
            loop {
                let raw = tokio::fs::read_to_string(&path).await.unwrap();
                let value: Value = serde_json::from_str(&raw).unwrap();
                assert!(value.is_object());
                reads += 1;
                if done.load(Ordering::SeqCst) {
                    break reads;
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let mut pending: Vec<Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send>>> =
        Vec::new();
    for i in 0..30 {
        let id = format!("staff-{i}");
        let record = json!({"id": id, "fullName": format!("Worker {i}")});
        let create = store.create("staff", record.as_object().unwrap().clone());
        pending.push(Box::pin(async move { create.await.map(|_| ()) }));

        let patch = json!({"role": "SUPERVISOR"});
        let update = store.update("staff", &id, patch.as_object().unwrap().clone(), "id");
        pending.push(Box::pin(async move { update.await.map(|_| ()) }));

        if i % 3 == 0 {
            let remove = store.remove("staff", &id, "id");
            pending.push(Box::pin(async move { remove.await.map(|_| ()) }));
        }
    }
    for result in join_all(pending).await {
        result.unwrap();
    }
    done.store(true, Ordering::SeqCst);
    assert!(reader.await.unwrap() > 0);

    let staff = store.list("staff").await.unwrap();
    assert_eq!(staff.len(), 20);
    assert!(staff.iter().all(|s| s["role"] == "SUPERVISOR"));
}
