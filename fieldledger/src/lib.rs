use axum::{routing::get, Router};
use fieldledger_core::DataStore;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod api;
pub mod config;

/// Full application: API routes, health check, request tracing and CORS for
/// the browser client.
pub fn app(store: DataStore) -> Router {
    Router::new()
        .merge(api::router(store))
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
