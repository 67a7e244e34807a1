use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fieldledger_core::StoreError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    UnknownResource(String),
    NotFound { resource: String, id: String },
    BadRequest(String),
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownResource(_) | ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::UnknownResource(name) => format!("unknown resource `{name}`"),
            ApiError::NotFound { resource, id } => format!("{resource} `{id}` not found"),
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Store(err) if err.is_corruption() => "data store is corrupt".to_string(),
            ApiError::Store(_) => "data store unavailable".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Store(err) = &self {
            tracing::error!(error = %err, "store operation failed");
        }
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}
