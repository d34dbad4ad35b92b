//! Billing error types

use thiserror::Error;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Stripe resource not found: {0}")]
    StripeNotFound(String),

    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Company not found: {0}")]
    CompanyNotFound(String),

    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Webhook event type not supported: {0}")]
    WebhookEventNotSupported(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Whether this error means the referenced Stripe resource no longer
    /// exists upstream. Callers use this to self-heal stale references
    /// instead of string-matching provider messages.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BillingError::StripeNotFound(_))
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        // Classify "no such resource" responses once, here. Everything else
        // (auth, rate limit, network, 5xx) stays an opaque API error and
        // propagates to the caller.
        if let stripe::StripeError::Stripe(request_error) = &err {
            let missing = request_error.code == Some(stripe::ErrorCode::ResourceMissing)
                || request_error.http_status == 404;
            if missing {
                let message = request_error
                    .message
                    .clone()
                    .unwrap_or_else(|| "resource_missing".to_string());
                return BillingError::StripeNotFound(message);
            }
        }
        BillingError::StripeApi(err.to_string())
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
