//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Resource not found")]
    NotFound,

    #[error("Billing sync failed: {0}")]
    SyncFailed(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::SyncFailed(msg) => (StatusCode::BAD_GATEWAY, "SYNC_FAILED", msg.clone()),
            ApiError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "Database error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            other => ApiError::Database(other.to_string()),
        }
    }
}

impl From<clubgrid_billing::BillingError> for ApiError {
    fn from(err: clubgrid_billing::BillingError) -> Self {
        use clubgrid_billing::BillingError;
        match err {
            BillingError::CompanyNotFound(_) => ApiError::NotFound,
            BillingError::WebhookSignatureInvalid => {
                ApiError::BadRequest("Invalid webhook signature".to_string())
            }
            BillingError::Database(msg) => ApiError::Database(msg),
            other => ApiError::SyncFailed(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
