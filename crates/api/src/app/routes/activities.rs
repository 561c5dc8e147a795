use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use forgecrm_activities::{Activity, ActivityCommand, ActivityId, activity};
use forgecrm_auth::permissions::known;
use forgecrm_infra::projections::aggregate_types;

use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(schedule_activity).get(list_activities))
        .route("/:id", get(get_activity))
        .route("/:id/reschedule", post(reschedule_activity))
        .route("/:id/complete", post(complete_activity))
        .route("/:id/cancel", post(cancel_activity))
}

fn make_activity(id: forgecrm_core::AggregateId) -> Activity {
    Activity::empty(ActivityId::new(id))
}

fn dispatch_activity(
    services: &AppServices,
    principal: &PrincipalContext,
    agg: forgecrm_core::AggregateId,
    cmd: ActivityCommand,
) -> axum::response::Response {
    match services.dispatch::<Activity>(
        Some(principal.user_id()),
        agg,
        aggregate_types::ACTIVITY,
        cmd,
        make_activity,
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Mutations on an activity are scoped to its assignee unless the caller can
/// see every activity.
fn ensure_visible(
    services: &AppServices,
    principal: &PrincipalContext,
    agg: forgecrm_core::AggregateId,
) -> Option<axum::response::Response> {
    let visibility = principal.visibility(&known::activities_view_all());
    match services.activities.get(&ActivityId::new(agg)) {
        Some(rm) if visibility.allows(&[rm.assigned_to, rm.completed_by]) => None,
        _ => Some(errors::not_found()),
    }
}

async fn schedule_activity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::ScheduleActivityRequest>,
) -> axum::response::Response {
    let agg = forgecrm_core::AggregateId::new();
    let cmd = ActivityCommand::ScheduleActivity(activity::ScheduleActivity {
        activity_id: ActivityId::new(agg),
        kind: body.kind,
        subject: body.subject,
        description: body.description,
        contact_id: body.contact_id,
        lead_id: body.lead_id,
        scheduled_at: body.scheduled_at,
        duration_minutes: body.duration_minutes,
        assigned_to: body.assigned_to.or(Some(principal.user_id())),
        priority: body.priority,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Activity>(
        Some(principal.user_id()),
        agg,
        aggregate_types::ACTIVITY,
        cmd,
        make_activity,
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": ActivityId::new(agg) })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn list_activities(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let visibility = principal.visibility(&known::activities_view_all());
    let items = services
        .activities
        .list_visible(visibility)
        .iter()
        .map(dto::activity_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

async fn get_activity(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "activity") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    match services.activities.get(&ActivityId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::activity_to_json(&rm))).into_response(),
        None => errors::not_found(),
    }
}

async fn reschedule_activity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RescheduleActivityRequest>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "activity") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };
    if let Some(denied) = ensure_visible(&services, &principal, agg) {
        return denied;
    }

    let cmd = ActivityCommand::RescheduleActivity(activity::RescheduleActivity {
        activity_id: ActivityId::new(agg),
        scheduled_at: body.scheduled_at,
        duration_minutes: body.duration_minutes,
        occurred_at: Utc::now(),
    });
    dispatch_activity(&services, &principal, agg, cmd)
}

async fn complete_activity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CompleteActivityRequest>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "activity") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };
    if let Some(denied) = ensure_visible(&services, &principal, agg) {
        return denied;
    }

    let cmd = ActivityCommand::CompleteActivity(activity::CompleteActivity {
        activity_id: ActivityId::new(agg),
        completed_by: principal.user_id(),
        outcome: body.outcome,
        next_action: body.next_action,
        occurred_at: Utc::now(),
    });
    dispatch_activity(&services, &principal, agg, cmd)
}

async fn cancel_activity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "activity") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };
    if let Some(denied) = ensure_visible(&services, &principal, agg) {
        return denied;
    }

    let cmd = ActivityCommand::CancelActivity(activity::CancelActivity {
        activity_id: ActivityId::new(agg),
        occurred_at: Utc::now(),
    });
    dispatch_activity(&services, &principal, agg, cmd)
}
