use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{Datelike, Utc};

use forgecrm_catalog::ProductId;
use forgecrm_directory::{CompanyId, ContactId};
use forgecrm_documents::{
    Document, DocumentCommand, DocumentId, DocumentParent, document, sanitize_filename,
    validate_upload,
};
use forgecrm_infra::projections::aggregate_types;
use forgecrm_pipeline::LeadId;

use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(attach_document).get(list_documents))
        .route("/:id", get(get_document).patch(describe_document))
}

fn make_document(id: forgecrm_core::AggregateId) -> Document {
    Document::empty(DocumentId::new(id))
}

fn parse_parent(
    kind: Option<&str>,
    id: Option<&str>,
) -> Result<Option<DocumentParent>, axum::response::Response> {
    let (Some(kind), Some(id)) = (kind, id) else {
        return Ok(None);
    };

    let agg = parse_id(id, "parent")?;
    let parent = match kind {
        "contact" => DocumentParent::Contact(ContactId::new(agg)),
        "company" => DocumentParent::Company(CompanyId::new(agg)),
        "lead" => DocumentParent::Lead(LeadId::new(agg)),
        "product" => DocumentParent::Product(ProductId::new(agg)),
        other => {
            return Err(errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_parent",
                format!("unknown parent kind: {other}"),
            ));
        }
    };
    Ok(Some(parent))
}

/// Where uploads land: `<UPLOAD_DIR>/YYYY/MM/<sanitized name>`.
fn upload_path(file_name: &str) -> PathBuf {
    let base = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string());
    let now = Utc::now();
    PathBuf::from(base)
        .join(format!("{:04}", now.year()))
        .join(format!("{:02}", now.month()))
        .join(file_name)
}

async fn attach_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::AttachDocumentQuery>,
    body: Bytes,
) -> axum::response::Response {
    let parent = match parse_parent(query.parent_kind.as_deref(), query.parent_id.as_deref()) {
        Ok(parent) => parent,
        Err(resp) => return resp,
    };

    // Validate before writing anything to disk.
    let size_bytes = body.len() as u64;
    if let Err(e) = validate_upload(&query.file_name, size_bytes) {
        return errors::domain_error_to_response(e);
    }

    let stored_name = sanitize_filename(&query.file_name);
    let path = upload_path(&stored_name);
    if let Some(dir) = path.parent()
        && let Err(e) = tokio::fs::create_dir_all(dir).await
    {
        return errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "upload_failed",
            e.to_string(),
        );
    }
    if let Err(e) = tokio::fs::write(&path, &body).await {
        return errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "upload_failed",
            e.to_string(),
        );
    }

    let agg = forgecrm_core::AggregateId::new();
    let cmd = DocumentCommand::AttachDocument(document::AttachDocument {
        document_id: DocumentId::new(agg),
        parent,
        file_name: query.file_name,
        size_bytes,
        kind: query.kind,
        description: query.description,
        uploaded_by: Some(principal.user_id()),
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Document>(
        Some(principal.user_id()),
        agg,
        aggregate_types::DOCUMENT,
        cmd,
        make_document,
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": DocumentId::new(agg),
                "stored_as": path,
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn list_documents(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListDocumentsQuery>,
) -> axum::response::Response {
    let items = match parse_parent(query.parent_kind.as_deref(), query.parent_id.as_deref()) {
        Ok(Some(parent)) => services.documents.for_parent(parent),
        Ok(None) => services.documents.list(),
        Err(resp) => return resp,
    };

    let items = items.iter().map(dto::document_to_json).collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

async fn get_document(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "document") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    match services.documents.get(&DocumentId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::document_to_json(&rm))).into_response(),
        None => errors::not_found(),
    }
}

async fn describe_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::DescribeDocumentRequest>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "document") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    let cmd = DocumentCommand::DescribeDocument(document::DescribeDocument {
        document_id: DocumentId::new(agg),
        kind: body.kind,
        description: body.description,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Document>(
        Some(principal.user_id()),
        agg,
        aggregate_types::DOCUMENT,
        cmd,
        make_document,
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
