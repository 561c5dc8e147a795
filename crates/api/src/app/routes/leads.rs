use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use forgecrm_auth::permissions::known;
use forgecrm_infra::projections::aggregate_types;
use forgecrm_pipeline::{Lead, LeadCommand, LeadId, RateType, lead};

use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz::{CmdAuth, authorize_command};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(open_lead).get(list_leads))
        .route("/:id", get(get_lead).patch(update_lead).delete(delete_lead))
        .route("/:id/restore", post(restore_lead))
        .route("/:id/stage", post(change_stage))
        .route("/:id/approve", post(approve_lead))
        .route("/:id/line-items", post(add_line_item))
        .route(
            "/:id/line-items/:product_id",
            axum::routing::patch(update_line_item).delete(remove_line_item),
        )
}

fn make_lead(id: forgecrm_core::AggregateId) -> Lead {
    Lead::empty(LeadId::new(id))
}

fn dispatch_lead(
    services: &AppServices,
    principal: &PrincipalContext,
    agg: forgecrm_core::AggregateId,
    cmd: LeadCommand,
) -> axum::response::Response {
    match services.dispatch::<Lead>(
        Some(principal.user_id()),
        agg,
        aggregate_types::LEAD,
        cmd,
        make_lead,
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Whether the caller may see this lead at all.
fn visible_lead(
    services: &AppServices,
    principal: &PrincipalContext,
    lead_id: &LeadId,
) -> Option<forgecrm_infra::projections::LeadReadModel> {
    let visibility = principal.visibility(&known::leads_view_all());
    services
        .leads
        .get(lead_id)
        .filter(|rm| visibility.allows(&rm.involved()))
}

/// Mutations are scoped like reads: leads outside the caller's visibility
/// answer 404, exactly as if they did not exist.
fn ensure_visible(
    services: &AppServices,
    principal: &PrincipalContext,
    agg: forgecrm_core::AggregateId,
) -> Option<axum::response::Response> {
    if visible_lead(services, principal, &LeadId::new(agg)).is_none() {
        Some(errors::not_found())
    } else {
        None
    }
}

async fn open_lead(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::OpenLeadRequest>,
) -> axum::response::Response {
    let stage = match &body.stage {
        Some(name) => match services.stage_catalog.by_name(name) {
            Some(stage) => stage.clone(),
            None => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "unknown_stage",
                    format!("unknown pipeline stage: {name}"),
                );
            }
        },
        None => match services.stage_catalog.entry_stage() {
            Some(stage) => stage.clone(),
            None => {
                return errors::json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "empty_catalog",
                    "no pipeline stages configured",
                );
            }
        },
    };

    let now = Utc::now();
    let number = match services.lead_numbers.allocate(now) {
        Ok(number) => number,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let agg = forgecrm_core::AggregateId::new();
    let cmd = LeadCommand::OpenLead(lead::OpenLead {
        lead_id: LeadId::new(agg),
        number,
        title: body.title,
        contact_id: body.contact_id,
        company_id: body.company_id,
        stakeholder_id: body.stakeholder_id,
        source: body.source,
        stage,
        estimated_value_minor: body.estimated_value_minor,
        probability: body.probability,
        expected_close_date: body.expected_close_date,
        owner: body.owner.or(Some(principal.user_id())),
        collaborators: body.collaborators,
        rate_type: body.rate_type.unwrap_or(RateType::Proposed),
        delivery: body.delivery,
        notes: body.notes,
        occurred_at: now,
    });

    match services.dispatch::<Lead>(
        Some(principal.user_id()),
        agg,
        aggregate_types::LEAD,
        cmd,
        make_lead,
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": LeadId::new(agg), "number": number })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn list_leads(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let visibility = principal.visibility(&known::leads_view_all());
    let items = services
        .leads
        .list_visible(visibility)
        .iter()
        .map(dto::lead_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

async fn get_lead(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "lead") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    match visible_lead(&services, &principal, &LeadId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::lead_to_json(&rm))).into_response(),
        None => errors::not_found(),
    }
}

async fn update_lead(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateLeadRequest>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "lead") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };
    if let Some(denied) = ensure_visible(&services, &principal, agg) {
        return denied;
    }

    let cmd = LeadCommand::UpdateLead(lead::UpdateLead {
        lead_id: LeadId::new(agg),
        title: body.title,
        source: body.source,
        estimated_value_minor: body.estimated_value_minor,
        probability: body.probability,
        expected_close_date: body.expected_close_date,
        owner: body.owner,
        collaborators: body.collaborators,
        rate_type: body.rate_type,
        delivery: body.delivery,
        notes: body.notes,
        occurred_at: Utc::now(),
    });
    dispatch_lead(&services, &principal, agg, cmd)
}

async fn change_stage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeStageRequest>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "lead") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };
    if let Some(denied) = ensure_visible(&services, &principal, agg) {
        return denied;
    }

    let Some(stage) = services.stage_catalog.by_name(&body.stage).cloned() else {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "unknown_stage",
            format!("unknown pipeline stage: {}", body.stage),
        );
    };

    let cmd = LeadCommand::ChangeStage(lead::ChangeStage {
        lead_id: LeadId::new(agg),
        stage,
        occurred_at: Utc::now(),
    });
    dispatch_lead(&services, &principal, agg, cmd)
}

async fn approve_lead(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ApproveLeadRequest>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "lead") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };
    if let Some(denied) = ensure_visible(&services, &principal, agg) {
        return denied;
    }

    let cmd = CmdAuth {
        inner: LeadCommand::Approve(lead::Approve {
            lead_id: LeadId::new(agg),
            approved_by: principal.user_id(),
            notes: body.notes,
            occurred_at: Utc::now(),
        }),
        required: vec![known::leads_approve()],
    };
    if let Err(e) = authorize_command(&principal, &cmd) {
        return errors::authz_error_to_response(e);
    }

    dispatch_lead(&services, &principal, agg, cmd.inner)
}

async fn add_line_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddLineItemRequest>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "lead") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };
    if let Some(denied) = ensure_visible(&services, &principal, agg) {
        return denied;
    }

    let cmd = LeadCommand::AddLineItem(lead::AddLineItem {
        lead_id: LeadId::new(agg),
        product_id: body.product_id,
        quantity: body.quantity,
        unit_price_minor: body.unit_price_minor,
        custom_description: body.custom_description,
        notes: body.notes,
        occurred_at: Utc::now(),
    });
    dispatch_lead(&services, &principal, agg, cmd)
}

async fn update_line_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, product_id)): Path<(String, String)>,
    Json(body): Json<dto::UpdateLineItemRequest>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "lead") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };
    if let Some(denied) = ensure_visible(&services, &principal, agg) {
        return denied;
    }
    let product = match parse_id(&product_id, "product") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    let cmd = LeadCommand::UpdateLineItem(lead::UpdateLineItem {
        lead_id: LeadId::new(agg),
        product_id: forgecrm_catalog::ProductId::new(product),
        quantity: body.quantity,
        unit_price_minor: body.unit_price_minor,
        custom_description: body.custom_description,
        notes: body.notes,
        occurred_at: Utc::now(),
    });
    dispatch_lead(&services, &principal, agg, cmd)
}

async fn remove_line_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, product_id)): Path<(String, String)>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "lead") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };
    if let Some(denied) = ensure_visible(&services, &principal, agg) {
        return denied;
    }
    let product = match parse_id(&product_id, "product") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    let cmd = LeadCommand::RemoveLineItem(lead::RemoveLineItem {
        lead_id: LeadId::new(agg),
        product_id: forgecrm_catalog::ProductId::new(product),
        occurred_at: Utc::now(),
    });
    dispatch_lead(&services, &principal, agg, cmd)
}

async fn delete_lead(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "lead") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };
    if let Some(denied) = ensure_visible(&services, &principal, agg) {
        return denied;
    }

    let cmd = LeadCommand::SoftDeleteLead(lead::SoftDeleteLead {
        lead_id: LeadId::new(agg),
        deleted_by: Some(principal.user_id()),
        occurred_at: Utc::now(),
    });
    dispatch_lead(&services, &principal, agg, cmd)
}

async fn restore_lead(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "lead") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };
    if let Some(denied) = ensure_visible(&services, &principal, agg) {
        return denied;
    }

    let cmd = LeadCommand::RestoreLead(lead::RestoreLead {
        lead_id: LeadId::new(agg),
        occurred_at: Utc::now(),
    });
    dispatch_lead(&services, &principal, agg, cmd)
}
