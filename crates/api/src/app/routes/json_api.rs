//! The three JSON helper endpoints backing form autocompletion and the
//! pipeline board: product search, contact duplicate check, pipeline status.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;

use forgecrm_auth::permissions::known;

use crate::app::services::AppServices;
use crate::app::dto;
use crate::context::PrincipalContext;

const SEARCH_LIMIT: usize = 20;
const DUPLICATE_LIMIT: usize = 5;

pub fn router() -> Router {
    Router::new()
        .route("/products/search", get(product_search))
        .route("/contacts/check-duplicate", post(contact_duplicate_check))
        .route("/leads/pipeline-status", get(pipeline_status))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

async fn product_search(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<SearchQuery>,
) -> axum::response::Response {
    let results = services
        .products
        .search(&query.q, SEARCH_LIMIT)
        .iter()
        .map(dto::product_to_search_hit)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "results": results }))).into_response()
}

async fn contact_duplicate_check(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::DuplicateCheckRequest>,
) -> axum::response::Response {
    let duplicates = services
        .contacts
        .find_duplicates(
            body.phone.as_deref().map(str::trim),
            body.email.as_deref().map(str::trim),
            body.exclude_id,
        )
        .into_iter()
        .take(DUPLICATE_LIMIT)
        .map(|c| {
            serde_json::json!({
                "id": c.contact_id,
                "name": c.name,
                "company": c.current_company,
                "phone": c.phone,
                "email": c.email,
            })
        })
        .collect::<Vec<_>>();

    (
        StatusCode::OK,
        Json(serde_json::json!({ "duplicates": duplicates })),
    )
        .into_response()
}

async fn pipeline_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let visibility = principal.visibility(&known::leads_view_all());
    let pipeline = services
        .leads
        .pipeline_status(visibility)
        .iter()
        .map(dto::stage_snapshot_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "pipeline": pipeline }))).into_response()
}
