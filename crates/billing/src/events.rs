//! Billing event audit log
//!
//! Append-only record of billing operations, used to answer "why is this
//! company billed this way?" without digging through provider dashboards.
//! Entries are written by the resolvers, the reconciler, and the webhook
//! handlers; a failed write is logged and never fails the caller.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;

/// Types of billing events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingEventType {
    CustomerCreated,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCanceled,
    InvoicePaid,
    InvoiceFailed,
    PaymentMethodUpdated,
    SyncCompleted,
    SyncFailed,
}

impl std::fmt::Display for BillingEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BillingEventType::CustomerCreated => "CUSTOMER_CREATED",
            BillingEventType::SubscriptionCreated => "SUBSCRIPTION_CREATED",
            BillingEventType::SubscriptionUpdated => "SUBSCRIPTION_UPDATED",
            BillingEventType::SubscriptionCanceled => "SUBSCRIPTION_CANCELED",
            BillingEventType::InvoicePaid => "INVOICE_PAID",
            BillingEventType::InvoiceFailed => "INVOICE_FAILED",
            BillingEventType::PaymentMethodUpdated => "PAYMENT_METHOD_UPDATED",
            BillingEventType::SyncCompleted => "SYNC_COMPLETED",
            BillingEventType::SyncFailed => "SYNC_FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Builder for billing event rows
pub struct BillingEventBuilder {
    company_id: Uuid,
    event_type: BillingEventType,
    event_data: serde_json::Value,
    stripe_event_id: Option<String>,
    stripe_subscription_id: Option<String>,
    stripe_customer_id: Option<String>,
}

impl BillingEventBuilder {
    pub fn new(company_id: Uuid, event_type: BillingEventType) -> Self {
        Self {
            company_id,
            event_type,
            event_data: serde_json::json!({}),
            stripe_event_id: None,
            stripe_subscription_id: None,
            stripe_customer_id: None,
        }
    }

    /// Set the event data
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.event_data = data;
        self
    }

    /// Set the originating Stripe event ID
    pub fn stripe_event(mut self, event_id: impl Into<String>) -> Self {
        self.stripe_event_id = Some(event_id.into());
        self
    }

    /// Set the Stripe subscription ID
    pub fn stripe_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.stripe_subscription_id = Some(subscription_id.into());
        self
    }

    /// Set the Stripe customer ID
    pub fn stripe_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.stripe_customer_id = Some(customer_id.into());
        self
    }
}

/// Service for appending billing events
#[derive(Clone)]
pub struct BillingEventLogger {
    pool: PgPool,
}

impl BillingEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a billing event
    pub async fn log_event(&self, builder: BillingEventBuilder) -> BillingResult<Uuid> {
        let event_id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO billing_events (
                company_id,
                event_type,
                event_data,
                stripe_event_id,
                stripe_subscription_id,
                stripe_customer_id
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(builder.company_id)
        .bind(builder.event_type.to_string())
        .bind(&builder.event_data)
        .bind(&builder.stripe_event_id)
        .bind(&builder.stripe_subscription_id)
        .bind(&builder.stripe_customer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(event_id.0)
    }

    /// Append a billing event, logging instead of failing when the write
    /// itself errors. Audit records must never break a billing operation.
    pub async fn log_event_best_effort(&self, builder: BillingEventBuilder) {
        let company_id = builder.company_id;
        let event_type = builder.event_type;
        if let Err(e) = self.log_event(builder).await {
            tracing::warn!(
                company_id = %company_id,
                event_type = %event_type,
                error = %e,
                "Failed to append billing event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billing_event_type_display() {
        assert_eq!(
            BillingEventType::SubscriptionCreated.to_string(),
            "SUBSCRIPTION_CREATED"
        );
        assert_eq!(BillingEventType::SyncCompleted.to_string(), "SYNC_COMPLETED");
        assert_eq!(
            BillingEventType::PaymentMethodUpdated.to_string(),
            "PAYMENT_METHOD_UPDATED"
        );
    }

    #[test]
    fn test_event_builder() {
        let company_id = Uuid::new_v4();
        let builder = BillingEventBuilder::new(company_id, BillingEventType::SubscriptionUpdated)
            .data(serde_json::json!({"status": "active"}))
            .stripe_subscription("sub_123")
            .stripe_event("evt_456");

        assert_eq!(builder.company_id, company_id);
        assert_eq!(builder.event_type, BillingEventType::SubscriptionUpdated);
        assert_eq!(builder.stripe_subscription_id, Some("sub_123".to_string()));
        assert_eq!(builder.stripe_event_id, Some("evt_456".to_string()));
    }
}
