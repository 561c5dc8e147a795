use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use forgecrm_directory::{Contact, ContactCommand, ContactId, contact};
use forgecrm_infra::projections::aggregate_types;

use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_contact).get(list_contacts))
        .route("/:id", get(get_contact).patch(update_contact).delete(delete_contact))
        .route("/:id/restore", post(restore_contact))
        .route("/:id/employment", post(record_employment))
        .route("/:id/employment/end", post(end_employment))
}

fn make_contact(id: forgecrm_core::AggregateId) -> Contact {
    Contact::empty(ContactId::new(id))
}

fn dispatch_contact(
    services: &AppServices,
    principal: &PrincipalContext,
    agg: forgecrm_core::AggregateId,
    cmd: ContactCommand,
) -> axum::response::Response {
    match services.dispatch::<Contact>(
        Some(principal.user_id()),
        agg,
        aggregate_types::CONTACT,
        cmd,
        make_contact,
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn create_contact(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateContactRequest>,
) -> axum::response::Response {
    let agg = forgecrm_core::AggregateId::new();
    let cmd = ContactCommand::CreateContact(contact::CreateContact {
        contact_id: ContactId::new(agg),
        name: body.name,
        phone: body.phone,
        email: body.email,
        profile: body.profile,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Contact>(
        Some(principal.user_id()),
        agg,
        aggregate_types::CONTACT,
        cmd,
        make_contact,
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": ContactId::new(agg) })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn list_contacts(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let items = services
        .contacts
        .list()
        .iter()
        .map(dto::contact_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

async fn get_contact(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "contact") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    match services.contacts.get(&ContactId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::contact_to_json(&rm))).into_response(),
        None => errors::not_found(),
    }
}

async fn update_contact(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateContactRequest>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "contact") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    let cmd = ContactCommand::UpdateContact(contact::UpdateContact {
        contact_id: ContactId::new(agg),
        name: body.name,
        phone: body.phone,
        email: body.email,
        profile: body.profile,
        occurred_at: Utc::now(),
    });
    dispatch_contact(&services, &principal, agg, cmd)
}

async fn delete_contact(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "contact") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    let cmd = ContactCommand::SoftDeleteContact(contact::SoftDeleteContact {
        contact_id: ContactId::new(agg),
        deleted_by: Some(principal.user_id()),
        occurred_at: Utc::now(),
    });
    dispatch_contact(&services, &principal, agg, cmd)
}

async fn restore_contact(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "contact") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    let cmd = ContactCommand::RestoreContact(contact::RestoreContact {
        contact_id: ContactId::new(agg),
        occurred_at: Utc::now(),
    });
    dispatch_contact(&services, &principal, agg, cmd)
}

async fn record_employment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordEmploymentRequest>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "contact") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    let cmd = ContactCommand::RecordEmployment(contact::RecordEmployment {
        contact_id: ContactId::new(agg),
        company_id: body.company_id,
        designation: body.designation,
        start_date: body.start_date,
        notes: body.notes,
        occurred_at: Utc::now(),
    });
    dispatch_contact(&services, &principal, agg, cmd)
}

async fn end_employment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::EndEmploymentRequest>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "contact") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    let cmd = ContactCommand::EndEmployment(contact::EndEmployment {
        contact_id: ContactId::new(agg),
        end_date: body.end_date,
        occurred_at: Utc::now(),
    });
    dispatch_contact(&services, &principal, agg, cmd)
}
