//! Billing routes: Stripe webhook intake and admin sync actions

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use clubgrid_billing::ReconcileOutcome;
use clubgrid_shared::CompanyBillingRecord;
use serde_json::json;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Handle Stripe webhook events.
///
/// Signature verification runs on the raw body before anything else; a bad
/// signature is the only webhook failure that returns non-200. Handler
/// failures are recorded on the event log and acknowledged, so Stripe's
/// redelivery (not an HTTP error loop) is the retry path.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::BadRequest("Missing Stripe signature".to_string())
        })?;

    let event = state
        .billing
        .webhooks
        .verify_event(&body, signature)
        .map_err(|e| {
            tracing::warn!(error = ?e, "Stripe webhook signature verification failed");
            ApiError::BadRequest("Invalid webhook signature".to_string())
        })?;

    let event_id = event.id.to_string();
    let event_type = event.type_.to_string();

    let outcome = state.billing.webhooks.process_event(event).await?;

    tracing::info!(
        event_id = %event_id,
        event_type = %event_type,
        outcome = outcome.as_str(),
        "Stripe webhook handled"
    );

    Ok(StatusCode::OK)
}

/// Run a reconciliation pass for a company (admin action / triggered sync)
pub async fn sync_company(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> ApiResult<Json<ReconcileOutcome>> {
    let outcome = state.billing.reconciler.sync_company(company_id).await?;
    Ok(Json(outcome))
}

/// Current billing state for a company, including the last sync outcome
pub async fn billing_status(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> ApiResult<Json<CompanyBillingRecord>> {
    let record = state.billing.state.load(company_id).await?;
    Ok(Json(record))
}

/// Readiness probe: verifies database connectivity
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    sqlx::query("SELECT 1").execute(&state.pool).await?;
    Ok(Json(json!({ "status": "ok" })))
}
