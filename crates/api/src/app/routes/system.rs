use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::context::PrincipalContext;

pub async fn health() -> axum::response::Response {
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> axum::response::Response {
    (
        StatusCode::OK,
        Json(json!({
            "user_id": principal.user_id(),
            "roles": principal.roles(),
        })),
    )
        .into_response()
}
