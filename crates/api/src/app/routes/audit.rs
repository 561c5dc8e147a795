use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;

use forgecrm_auth::permissions::known;

use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz::{CmdAuth, authorize_command};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(recent_entries))
        .route("/:entity_type/:id", get(entity_entries))
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    /// With `to`, switches to a time-range query (inclusive start).
    #[serde(default)]
    from: Option<chrono::DateTime<chrono::Utc>>,
    /// Exclusive end of the time-range query.
    #[serde(default)]
    to: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_limit() -> usize {
    100
}

fn guard(principal: &PrincipalContext) -> Option<axum::response::Response> {
    let cmd = CmdAuth {
        inner: (),
        required: vec![known::audit_view()],
    };
    authorize_command(principal, &cmd)
        .err()
        .map(errors::authz_error_to_response)
}

async fn recent_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<RecentQuery>,
) -> axum::response::Response {
    if let Some(denied) = guard(&principal) {
        return denied;
    }

    let entries = match (query.from, query.to) {
        (Some(from), Some(to)) => services.audit.between(from, to),
        _ => services.audit.recent(query.limit.min(1000)),
    };
    let items = entries
        .iter()
        .map(dto::audit_entry_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

async fn entity_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((entity_type, id)): Path<(String, String)>,
) -> axum::response::Response {
    if let Some(denied) = guard(&principal) {
        return denied;
    }

    let agg = match parse_id(&id, "entity") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    let items = services
        .audit
        .for_entity(&entity_type, agg)
        .iter()
        .map(dto::audit_entry_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
