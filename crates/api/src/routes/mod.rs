//! API route definitions

pub mod billing;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(billing::health))
        .route("/webhooks/stripe", post(billing::webhook))
        .route("/companies/:company_id/billing", get(billing::billing_status))
        .route(
            "/companies/:company_id/billing/sync",
            post(billing::sync_company),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
