use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use forgecrm_directory::{Stakeholder, StakeholderCommand, StakeholderId, stakeholder};
use forgecrm_infra::projections::aggregate_types;

use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_stakeholder).get(list_stakeholders))
        .route("/:id", get(get_stakeholder).patch(update_stakeholder).delete(delete_stakeholder))
}

fn make_stakeholder(id: forgecrm_core::AggregateId) -> Stakeholder {
    Stakeholder::empty(StakeholderId::new(id))
}

async fn register_stakeholder(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RegisterStakeholderRequest>,
) -> axum::response::Response {
    // (contact, company, role) uniqueness is cross-aggregate: pre-check the
    // read model here; the projection refuses a racing duplicate as well.
    if services
        .stakeholders
        .triple_exists(body.contact_id, body.company_id, &body.role_type)
    {
        return errors::json_error(
            StatusCode::CONFLICT,
            "duplicate_stakeholder",
            "this contact already holds that role at the company",
        );
    }

    let agg = forgecrm_core::AggregateId::new();
    let cmd = StakeholderCommand::RegisterStakeholder(stakeholder::RegisterStakeholder {
        stakeholder_id: StakeholderId::new(agg),
        contact_id: body.contact_id,
        company_id: body.company_id,
        role_type: body.role_type,
        details: body.details,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Stakeholder>(
        Some(principal.user_id()),
        agg,
        aggregate_types::STAKEHOLDER,
        cmd,
        make_stakeholder,
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": StakeholderId::new(agg) })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn list_stakeholders(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let items = services
        .stakeholders
        .list()
        .iter()
        .map(dto::stakeholder_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

async fn get_stakeholder(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "stakeholder") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    match services.stakeholders.get(&StakeholderId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::stakeholder_to_json(&rm))).into_response(),
        None => errors::not_found(),
    }
}

async fn update_stakeholder(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateStakeholderRequest>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "stakeholder") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };
    let stakeholder_id = StakeholderId::new(agg);

    // A role change can collide with an existing triple; pre-check it too.
    if let Some(new_role) = body.role_type.as_deref()
        && let Some(current) = services.stakeholders.get(&stakeholder_id)
        && !current.role_type.eq_ignore_ascii_case(new_role)
        && services
            .stakeholders
            .triple_exists(current.contact_id, current.company_id, new_role)
    {
        return errors::json_error(
            StatusCode::CONFLICT,
            "duplicate_stakeholder",
            "this contact already holds that role at the company",
        );
    }

    let cmd = StakeholderCommand::UpdateStakeholder(stakeholder::UpdateStakeholder {
        stakeholder_id,
        role_type: body.role_type,
        details: body.details,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Stakeholder>(
        Some(principal.user_id()),
        agg,
        aggregate_types::STAKEHOLDER,
        cmd,
        make_stakeholder,
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn delete_stakeholder(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "stakeholder") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    let cmd = StakeholderCommand::SoftDeleteStakeholder(stakeholder::SoftDeleteStakeholder {
        stakeholder_id: StakeholderId::new(agg),
        deleted_by: Some(principal.user_id()),
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Stakeholder>(
        Some(principal.user_id()),
        agg,
        aggregate_types::STAKEHOLDER,
        cmd,
        make_stakeholder,
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
