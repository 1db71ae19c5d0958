use axum::{Router, routing::get};

pub mod batches;
pub mod boekhouden;
pub mod common;
pub mod dues;
pub mod invoices;
pub mod mandates;
pub mod members;
pub mod memberships;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/members", members::router())
        .nest("/memberships", memberships::router())
        .nest("/dues", dues::router())
        .nest("/invoices", invoices::router())
        .nest("/mandates", mandates::router())
        .nest("/batches", batches::router())
        .nest("/boekhouden", boekhouden::router())
}
