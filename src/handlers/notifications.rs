use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;

// Downstream of the request gate; only admitted requests get here
pub async fn notifications_handler() -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(json!({ "message": "Notification accepted" })),
    )
}
