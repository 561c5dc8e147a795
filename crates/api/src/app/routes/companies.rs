use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use forgecrm_directory::{Company, CompanyCommand, CompanyId, company};
use forgecrm_infra::projections::aggregate_types;

use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_company).get(list_companies))
        .route("/:id", get(get_company).patch(update_company).delete(delete_company))
        .route("/:id/restore", post(restore_company))
}

fn make_company(id: forgecrm_core::AggregateId) -> Company {
    Company::empty(CompanyId::new(id))
}

async fn register_company(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RegisterCompanyRequest>,
) -> axum::response::Response {
    let agg = forgecrm_core::AggregateId::new();
    let cmd = CompanyCommand::RegisterCompany(company::RegisterCompany {
        company_id: CompanyId::new(agg),
        name: body.name,
        profile: body.profile,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Company>(
        Some(principal.user_id()),
        agg,
        aggregate_types::COMPANY,
        cmd,
        make_company,
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": CompanyId::new(agg) })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn list_companies(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let items = services
        .companies
        .list()
        .iter()
        .map(dto::company_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

async fn get_company(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "company") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    match services.companies.get(&CompanyId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::company_to_json(&rm))).into_response(),
        None => errors::not_found(),
    }
}

async fn update_company(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateCompanyRequest>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "company") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    let cmd = CompanyCommand::UpdateCompany(company::UpdateCompany {
        company_id: CompanyId::new(agg),
        name: body.name,
        profile: body.profile,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Company>(
        Some(principal.user_id()),
        agg,
        aggregate_types::COMPANY,
        cmd,
        make_company,
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn delete_company(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "company") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    let cmd = CompanyCommand::SoftDeleteCompany(company::SoftDeleteCompany {
        company_id: CompanyId::new(agg),
        deleted_by: Some(principal.user_id()),
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Company>(
        Some(principal.user_id()),
        agg,
        aggregate_types::COMPANY,
        cmd,
        make_company,
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn restore_company(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "company") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    let cmd = CompanyCommand::RestoreCompany(company::RestoreCompany {
        company_id: CompanyId::new(agg),
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Company>(
        Some(principal.user_id()),
        agg,
        aggregate_types::COMPANY,
        cmd,
        make_company,
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
