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
use forgecrm_catalog::{Product, ProductCommand, ProductId, generate_sku, product};
use forgecrm_infra::projections::aggregate_types;
use forgecrm_infra::sync_writer::DispatchingCatalogWriter;
use forgecrm_sync::{InventoryClient, run_sync};

use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz::{CmdAuth, authorize_command};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/:id", get(get_product).patch(update_product).delete(delete_product))
        .route("/:id/restore", post(restore_product))
        .route("/:id/stock", post(set_stock))
        .route("/sync", post(sync_products))
}

fn make_product(id: forgecrm_core::AggregateId) -> Product {
    Product::empty(ProductId::new(id))
}

fn dispatch_product(
    services: &AppServices,
    principal: &PrincipalContext,
    agg: forgecrm_core::AggregateId,
    cmd: ProductCommand,
) -> axum::response::Response {
    let guarded = CmdAuth {
        inner: cmd,
        required: vec![known::products_manage()],
    };
    if let Err(e) = authorize_command(principal, &guarded) {
        return errors::authz_error_to_response(e);
    }

    match services.dispatch::<Product>(
        Some(principal.user_id()),
        agg,
        aggregate_types::PRODUCT,
        guarded.inner,
        make_product,
    ) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateProductRequest>,
) -> axum::response::Response {
    let sku = body.sku.clone().unwrap_or_else(|| {
        generate_sku(
            &body.brand,
            body.details.as_ref().and_then(|d| d.model.as_deref()),
        )
    });

    if services.products.find_by_sku(&sku).is_some() {
        return errors::json_error(
            StatusCode::CONFLICT,
            "duplicate_sku",
            format!("a product with SKU {sku} already exists"),
        );
    }

    let agg = forgecrm_core::AggregateId::new();
    let cmd = CmdAuth {
        inner: ProductCommand::CreateProduct(product::CreateProduct {
            product_id: ProductId::new(agg),
            sku: sku.clone(),
            name: body.name,
            brand: body.brand,
            details: body.details,
            stock_quantity: body.stock_quantity,
            occurred_at: Utc::now(),
        }),
        required: vec![known::products_manage()],
    };
    if let Err(e) = authorize_command(&principal, &cmd) {
        return errors::authz_error_to_response(e);
    }

    match services.dispatch::<Product>(
        Some(principal.user_id()),
        agg,
        aggregate_types::PRODUCT,
        cmd.inner,
        make_product,
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": ProductId::new(agg), "sku": sku })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let items = services
        .products
        .list()
        .iter()
        .map(dto::product_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "product") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    match services.products.get(&ProductId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::product_to_json(&rm))).into_response(),
        None => errors::not_found(),
    }
}

async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateProductRequest>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "product") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    let cmd = ProductCommand::UpdateProduct(product::UpdateProduct {
        product_id: ProductId::new(agg),
        name: body.name,
        brand: body.brand,
        details: body.details,
        stock_quantity: body.stock_quantity,
        active: body.active,
        occurred_at: Utc::now(),
    });
    dispatch_product(&services, &principal, agg, cmd)
}

async fn set_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetStockRequest>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "product") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    let cmd = ProductCommand::SetStock(product::SetStock {
        product_id: ProductId::new(agg),
        quantity: body.quantity,
        occurred_at: Utc::now(),
    });
    dispatch_product(&services, &principal, agg, cmd)
}

async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "product") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    let cmd = ProductCommand::SoftDeleteProduct(product::SoftDeleteProduct {
        product_id: ProductId::new(agg),
        deleted_by: Some(principal.user_id()),
        occurred_at: Utc::now(),
    });
    dispatch_product(&services, &principal, agg, cmd)
}

async fn restore_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_id(&id, "product") {
        Ok(agg) => agg,
        Err(resp) => return resp,
    };

    let cmd = ProductCommand::RestoreProduct(product::RestoreProduct {
        product_id: ProductId::new(agg),
        occurred_at: Utc::now(),
    });
    dispatch_product(&services, &principal, agg, cmd)
}

/// Trigger a full inventory sync against the external feed.
///
/// Configuration comes from `INVENTORY_API_URL` / `INVENTORY_API_KEY`; the
/// resulting product events are attributed to the system actor.
async fn sync_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let guard = CmdAuth {
        inner: (),
        required: vec![known::catalog_sync()],
    };
    if let Err(e) = authorize_command(&principal, &guard) {
        return errors::authz_error_to_response(e);
    }

    let (Ok(base_url), Ok(api_key)) = (
        std::env::var("INVENTORY_API_URL"),
        std::env::var("INVENTORY_API_KEY"),
    ) else {
        return errors::json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "sync_not_configured",
            "INVENTORY_API_URL and INVENTORY_API_KEY must be set",
        );
    };

    let client = match InventoryClient::new(base_url, api_key) {
        Ok(client) => client,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_GATEWAY, "sync_client_error", e.to_string());
        }
    };

    let writer = DispatchingCatalogWriter::new(&services.dispatcher, &services.products);
    match run_sync(&client, &writer).await {
        Ok(report) => (StatusCode::OK, Json(serde_json::json!(report))).into_response(),
        Err(e) => errors::json_error(StatusCode::BAD_GATEWAY, "sync_failed", e.to_string()),
    }
}
