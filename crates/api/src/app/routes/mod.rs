use axum::{Router, routing::get};

pub mod activities;
pub mod audit;
pub mod common;
pub mod companies;
pub mod contacts;
pub mod documents;
pub mod json_api;
pub mod leads;
pub mod products;
pub mod stakeholders;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/companies", companies::router())
        .nest("/contacts", contacts::router())
        .nest("/stakeholders", stakeholders::router())
        .nest("/products", products::router())
        .nest("/leads", leads::router())
        .nest("/activities", activities::router())
        .nest("/documents", documents::router())
        .nest("/audit", audit::router())
        .nest("/api", json_api::router())
}
