use axum::{Json, http::StatusCode, response::IntoResponse};
use entitlements::domain::value_objects::api_errors::{CODE_NOT_FOUND, ErrorResponse};
use serde_json::json;

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(CODE_NOT_FOUND, "Route not found")),
    )
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "success": true, "status": "ok" })))
}
