//! HTTP dispatch layer: resource names in the URL map onto stored
//! collections, plus a few project and purchase-order lookups.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use fieldledger_core::collections::field_matches;
use fieldledger_core::ids::{ensure_identity, matches_identity};
use fieldledger_core::records::{Asset, DailyLog, Entity, GoodsReceivedNote, Invoice};
use fieldledger_core::{DataStore, Record};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod error;
pub mod resources;

pub use error::ApiError;
use resources::{Resource, ResourceRegistry};

/// Shared application state containing the data store.
#[derive(Clone)]
pub struct AppState {
    pub store: DataStore,
    pub resources: Arc<ResourceRegistry>,
}

impl AppState {
    fn resource(&self, name: &str) -> Result<Resource, ApiError> {
        self.resources
            .get(name)
            .copied()
            .ok_or_else(|| ApiError::UnknownResource(name.to_string()))
    }
}

pub fn router(store: DataStore) -> Router {
    router_with(store, ResourceRegistry::default())
}

pub fn router_with(store: DataStore, resources: ResourceRegistry) -> Router {
    let state = AppState {
        store,
        resources: Arc::new(resources),
    };
    Router::new()
        .route("/api/{resource}", get(list_records).post(create_record))
        .route(
            "/api/{resource}/{id}",
            get(get_record)
                .put(update_record)
                .patch(update_record)
                .delete(delete_record),
        )
        .route("/api/projects/{id}/daily-logs", get(project_daily_logs))
        .route("/api/projects/{id}/assets", get(project_assets))
        .route("/api/purchase-orders/{id}/invoices", get(order_invoices))
        .route("/api/purchase-orders/{id}/grns", get(order_grns))
        .with_state(state)
}

fn into_object(body: Value) -> Result<Record, ApiError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::BadRequest("request body must be a JSON object".into())),
    }
}

/// `GET /api/{resource}?field=value&...` filters by equality on every pair.
async fn list_records(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(filters): Query<BTreeMap<String, String>>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let res = state.resource(&resource)?;
    let mut filters = filters.into_iter();
    let records = match filters.next() {
        None => state.store.list(res.collection).await?,
        Some((field, value)) => {
            let mut found = state
                .store
                .find_where(res.collection, &field, Value::String(value))
                .await?;
            for (field, value) in filters {
                let needle = Value::String(value);
                found.retain(|r| field_matches(r, &field, &needle));
            }
            found.into_iter().map(Value::Object).collect()
        }
    };
    Ok(Json(records))
}

async fn create_record(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Record>), ApiError> {
    let res = state.resource(&resource)?;
    let mut record = into_object(body)?;
    ensure_identity(&mut record, res.id_field, res.id_prefix);
    let created = state.store.create(res.collection, record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_record(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
) -> Result<Json<Record>, ApiError> {
    let res = state.resource(&resource)?;
    state
        .store
        .get_by_id(res.collection, &id, res.id_field)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound { resource, id })
}

async fn update_record(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Record>, ApiError> {
    let res = state.resource(&resource)?;
    let patch = into_object(body)?;
    state
        .store
        .update(res.collection, &id, patch, res.id_field)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound { resource, id })
}

async fn delete_record(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let res = state.resource(&resource)?;
    let removed = if res.dependents.is_empty() {
        state.store.remove(res.collection, &id, res.id_field).await?
    } else {
        let target = id.clone();
        state
            .store
            .mutate_if(res.collection, move |items, doc| {
                let Some(index) = items.iter().position(|v| {
                    v.as_object()
                        .is_some_and(|r| matches_identity(r, res.id_field, &target))
                }) else {
                    return (false, false);
                };
                items.remove(index);
                let owner = Value::String(target);
                for dep in res.dependents {
                    if doc.contains(dep.collection) {
                        doc.collection_mut(dep.collection).retain(|v| {
                            !v.as_object()
                                .is_some_and(|r| field_matches(r, dep.field, &owner))
                        });
                    }
                }
                (true, true)
            })
            .await?
    };
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound { resource, id })
    }
}

/// Records of `collection` whose `field` names the owner in the path.
async fn owned_by(
    state: &AppState,
    collection: &str,
    field: &str,
    owner: String,
) -> Result<Json<Vec<Record>>, ApiError> {
    let found = state
        .store
        .find_where(collection, field, Value::String(owner))
        .await?;
    Ok(Json(found))
}

async fn project_daily_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Record>>, ApiError> {
    owned_by(&state, DailyLog::COLLECTION, "projectId", id).await
}

async fn project_assets(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Record>>, ApiError> {
    owned_by(&state, Asset::COLLECTION, "projectId", id).await
}

async fn order_invoices(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Record>>, ApiError> {
    owned_by(&state, Invoice::COLLECTION, "poId", id).await
}

async fn order_grns(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Record>>, ApiError> {
    owned_by(&state, GoodsReceivedNote::COLLECTION, "poId", id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{self, Body},
        http::Request,
    };
    use serde_json::json;
    use tower::util::ServiceExt;

    fn test_app() -> (tempfile::TempDir, DataStore, Router) {
        let tempdir = tempfile::tempdir().unwrap();
        let store = DataStore::open(tempdir.path().join("db.json"));
        let app = router(store.clone());
        (tempdir, store, app)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn crud_endpoints() {
        let (_dir, _store, app) = test_app();

        let (status, created) = send(
            &app,
            "POST",
            "/api/staff",
            Some(json!({"fullName": "Kuda Worker", "nationalId": "63-1111", "role": "WORKER"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();
        assert!(id.starts_with("staff-"));

        let (status, fetched) = send(&app, "GET", &format!("/api/staff/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["fullName"], json!("Kuda Worker"));

        let (status, updated) = send(
            &app,
            "PUT",
            &format!("/api/staff/{id}"),
            Some(json!({"role": "SUPERVISOR", "id": "someone-else"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["role"], json!("SUPERVISOR"));
        assert_eq!(updated["nationalId"], json!("63-1111"));
        assert_eq!(updated["id"], json!(id));

        let (status, listed) = send(&app, "GET", "/api/staff", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, "DELETE", &format!("/api/staff/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, listed) = send(&app, "GET", "/api/staff", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed, json!([]));
    }

    #[tokio::test]
    async fn missing_records_and_resources_are_404() {
        let (_dir, _store, app) = test_app();

        let (status, body) = send(&app, "GET", "/api/assets/missing-id", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("missing-id"));

        let (status, _) = send(&app, "DELETE", "/api/assets/missing-id", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "PATCH", "/api/assets/missing-id", Some(json!({"x": 1}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "GET", "/api/payroll", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_object_body_is_rejected() {
        let (_dir, store, app) = test_app();
        let (status, _) = send(&app, "POST", "/api/vendors", Some(json!([1, 2]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(store.count("vendors").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn custom_identity_fields_route_by_code() {
        let (_dir, _store, app) = test_app();
        let (status, created) = send(
            &app,
            "POST",
            "/api/budget-items",
            Some(json!({"itemCode": "BOQ-12", "description": "Rebar", "quantity": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["itemCode"], json!("BOQ-12"));
        assert!(created.get("id").is_none());

        let (status, fetched) = send(&app, "GET", "/api/budget-items/BOQ-12", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["description"], json!("Rebar"));

        let (_, activity) = send(&app, "POST", "/api/activities", Some(json!({"name": "Pour slab"}))).await;
        assert!(activity["activityCode"].as_str().unwrap().starts_with("act-"));
    }

    #[tokio::test]
    async fn list_filters_by_query() {
        let (_dir, _store, app) = test_app();
        for (po, status) in [("po-1", "PENDING"), ("po-1", "PAID"), ("po-2", "PENDING")] {
            send(
                &app,
                "POST",
                "/api/invoices",
                Some(json!({"poId": po, "status": status, "amount": 10})),
            )
            .await;
        }

        let (_, by_po) = send(&app, "GET", "/api/invoices?poId=po-1", None).await;
        assert_eq!(by_po.as_array().unwrap().len(), 2);

        let (_, both) = send(&app, "GET", "/api/invoices?poId=po-1&status=PENDING", None).await;
        assert_eq!(both.as_array().unwrap().len(), 1);

        let (_, by_amount) = send(&app, "GET", "/api/invoices?amount=10", None).await;
        assert_eq!(by_amount.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn project_lookups_and_cascade_delete() {
        let (_dir, store, app) = test_app();
        let (_, project) = send(&app, "POST", "/api/projects", Some(json!({"name": "Depot"}))).await;
        let pid = project["id"].as_str().unwrap().to_string();

        for date in ["2024-05-01", "2024-05-02"] {
            send(
                &app,
                "POST",
                "/api/daily-logs",
                Some(json!({"projectId": pid, "date": date, "weather": "Sunny"})),
            )
            .await;
        }
        send(
            &app,
            "POST",
            "/api/daily-logs",
            Some(json!({"projectId": "other", "date": "2024-05-01"})),
        )
        .await;
        send(&app, "POST", "/api/assets", Some(json!({"name": "Grader", "projectId": pid}))).await;

        let (status, logs) = send(&app, "GET", &format!("/api/projects/{pid}/daily-logs"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(logs.as_array().unwrap().len(), 2);
        assert_eq!(logs[0]["weather"], json!("Sunny"));

        let (_, assets) = send(&app, "GET", &format!("/api/projects/{pid}/assets"), None).await;
        assert_eq!(assets[0]["name"], json!("Grader"));

        let (status, _) = send(&app, "DELETE", &format!("/api/projects/{pid}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let remaining = store.list("dailyLogs").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0]["projectId"], json!("other"));
        // assets are not dependents
        assert_eq!(store.count("assets").await.unwrap(), 1);

        let (status, _) = send(&app, "DELETE", &format!("/api/projects/{pid}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn purchase_order_lookups() {
        let (_dir, _store, app) = test_app();
        let (_, po) = send(
            &app,
            "POST",
            "/api/purchase-orders",
            Some(json!({"vendorId": "vendor-1", "lines": [{"description": "Cement", "quantity": 50, "unitPrice": 9.5}]})),
        )
        .await;
        let po_id = po["id"].as_str().unwrap().to_string();
        assert!(po_id.starts_with("po-"));

        send(&app, "POST", "/api/invoices", Some(json!({"poId": po_id, "amount": 475.0}))).await;
        send(
            &app,
            "POST",
            "/api/grns",
            Some(json!({"poId": po_id, "lines": [{"itemCode": "CEM", "quantityReceived": 50}]})),
        )
        .await;

        let (_, invoices) = send(&app, "GET", &format!("/api/purchase-orders/{po_id}/invoices"), None).await;
        assert_eq!(invoices[0]["amount"], json!(475.0));

        let (_, grns) = send(&app, "GET", &format!("/api/purchase-orders/{po_id}/grns"), None).await;
        assert_eq!(grns[0]["lines"][0]["quantityReceived"], json!(50));
        assert_eq!(po["lines"][0]["quantity"], json!(50));
    }

    #[tokio::test]
    async fn lookups_return_records_without_optional_fields() {
        let (_dir, _store, app) = test_app();
        let (status, _) = send(
            &app,
            "POST",
            "/api/daily-logs",
            Some(json!({"projectId": "p-1", "summary": "rain"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        send(
            &app,
            "POST",
            "/api/daily-logs",
            Some(json!({"projectId": "p-1", "date": "2024-05-03", "workersOnSite": "crew of 12"})),
        )
        .await;
        send(&app, "POST", "/api/assets", Some(json!({"projectId": "p-1", "tag": 7}))).await;

        let (status, logs) = send(&app, "GET", "/api/projects/p-1/daily-logs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(logs.as_array().unwrap().len(), 2);
        assert_eq!(logs[0]["summary"], json!("rain"));
        assert!(logs[0].get("date").is_none());
        assert_eq!(logs[1]["workersOnSite"], json!("crew of 12"));

        let (status, assets) = send(&app, "GET", "/api/projects/p-1/assets", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(assets[0]["tag"], json!(7));
    }

    #[tokio::test]
    async fn corrupt_store_is_a_server_error() {
        let (_dir, store, app) = test_app();
        store.init().await.unwrap();
        std::fs::write(store.file().path(), "\"oops\"").unwrap();

        let (status, body) = send(&app, "GET", "/api/projects", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], json!("data store is corrupt"));
    }
}
