//! Billing state store
//!
//! The single write path for the billing portion of a company row. Every
//! writer (reconciler and webhook handlers) reads the stored record, mutates
//! a [`BillingFields`], and persists through [`BillingStateStore::persist`],
//! which writes only when something actually changed and logs each changed
//! field with its before/after values.
//!
//! There is no version column: concurrent writers are last-write-wins at the
//! field level, with the per-field change log as the audit trail.

use clubgrid_shared::{derive_managed_active, CompanyBillingRecord};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Longest persisted sync message; anything longer is truncated
pub const SYNC_MESSAGE_MAX_LEN: usize = 500;

/// The mutable billing fields of a company row.
///
/// `managed_active` is deliberately absent: it is derived from the
/// subscription id and status on every persist and can never be set directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BillingFields {
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub subscription_status: Option<String>,
    pub current_period_end: Option<OffsetDateTime>,
    pub default_payment_method_id: Option<String>,
    pub has_payment_method_on_file: bool,
    pub last_payment_method_check_at: Option<OffsetDateTime>,
}

impl From<&CompanyBillingRecord> for BillingFields {
    fn from(record: &CompanyBillingRecord) -> Self {
        Self {
            stripe_customer_id: record.stripe_customer_id.clone(),
            stripe_subscription_id: record.stripe_subscription_id.clone(),
            subscription_status: record.subscription_status.clone(),
            current_period_end: record.current_period_end,
            default_payment_method_id: record.default_payment_method_id.clone(),
            has_payment_method_on_file: record.has_payment_method_on_file,
            last_payment_method_check_at: record.last_payment_method_check_at,
        }
    }
}

/// Truncate a sync/error message to the persisted bound
pub fn truncate_message(message: &str) -> String {
    if message.len() <= SYNC_MESSAGE_MAX_LEN {
        return message.to_string();
    }
    message.chars().take(SYNC_MESSAGE_MAX_LEN).collect()
}

/// Store for the billing state persisted on company rows
#[derive(Clone)]
pub struct BillingStateStore {
    pool: PgPool,
}

impl BillingStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load the billing record for a company
    pub async fn load(&self, company_id: Uuid) -> BillingResult<CompanyBillingRecord> {
        let record: Option<CompanyBillingRecord> = sqlx::query_as(
            r#"
            SELECT
                id,
                name,
                stripe_customer_id,
                stripe_subscription_id,
                subscription_status,
                current_period_end,
                managed_active,
                default_payment_method_id,
                has_payment_method_on_file,
                last_payment_method_check_at,
                last_sync_status,
                last_sync_message,
                last_sync_at
            FROM companies
            WHERE id = $1
            "#,
        )
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| BillingError::CompanyNotFound(company_id.to_string()))
    }

    /// Persist billing fields, writing only when at least one differs from
    /// the stored row. Returns whether a write happened.
    pub async fn persist(&self, company_id: Uuid, fields: &BillingFields) -> BillingResult<bool> {
        let stored = self.load(company_id).await?;
        let current = BillingFields::from(&stored);

        let managed_active = derive_managed_active(
            fields.stripe_subscription_id.as_deref(),
            fields.subscription_status.as_deref(),
        );

        let mut changes: Vec<(&str, String, String)> = Vec::new();
        let mut diff = |field: &'static str, before: String, after: String| {
            if before != after {
                changes.push((field, before, after));
            }
        };

        diff(
            "stripe_customer_id",
            format!("{:?}", current.stripe_customer_id),
            format!("{:?}", fields.stripe_customer_id),
        );
        diff(
            "stripe_subscription_id",
            format!("{:?}", current.stripe_subscription_id),
            format!("{:?}", fields.stripe_subscription_id),
        );
        diff(
            "subscription_status",
            format!("{:?}", current.subscription_status),
            format!("{:?}", fields.subscription_status),
        );
        diff(
            "current_period_end",
            format!("{:?}", current.current_period_end),
            format!("{:?}", fields.current_period_end),
        );
        diff(
            "managed_active",
            stored.managed_active.to_string(),
            managed_active.to_string(),
        );
        diff(
            "default_payment_method_id",
            format!("{:?}", current.default_payment_method_id),
            format!("{:?}", fields.default_payment_method_id),
        );
        diff(
            "has_payment_method_on_file",
            current.has_payment_method_on_file.to_string(),
            fields.has_payment_method_on_file.to_string(),
        );
        diff(
            "last_payment_method_check_at",
            format!("{:?}", current.last_payment_method_check_at),
            format!("{:?}", fields.last_payment_method_check_at),
        );

        if changes.is_empty() {
            tracing::debug!(company_id = %company_id, "Billing state unchanged, skipping write");
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE companies SET
                stripe_customer_id = $2,
                stripe_subscription_id = $3,
                subscription_status = $4,
                current_period_end = $5,
                managed_active = $6,
                default_payment_method_id = $7,
                has_payment_method_on_file = $8,
                last_payment_method_check_at = $9,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(company_id)
        .bind(&fields.stripe_customer_id)
        .bind(&fields.stripe_subscription_id)
        .bind(&fields.subscription_status)
        .bind(fields.current_period_end)
        .bind(managed_active)
        .bind(&fields.default_payment_method_id)
        .bind(fields.has_payment_method_on_file)
        .bind(fields.last_payment_method_check_at)
        .execute(&self.pool)
        .await?;

        for (field, before, after) in &changes {
            tracing::info!(
                company_id = %company_id,
                field = field,
                before = %before,
                after = %after,
                "Billing state changed"
            );
        }

        Ok(true)
    }

    /// Persist the stored Stripe customer id for a company
    pub async fn set_customer_id(&self, company_id: Uuid, customer_id: &str) -> BillingResult<()> {
        sqlx::query(
            "UPDATE companies SET stripe_customer_id = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(customer_id)
        .bind(company_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            company_id = %company_id,
            customer_id = %customer_id,
            "Linked Stripe customer"
        );

        Ok(())
    }

    /// Record the default payment method discovered for a company
    pub async fn set_default_payment_method(
        &self,
        company_id: Uuid,
        payment_method_id: &str,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE companies SET
                default_payment_method_id = $1,
                has_payment_method_on_file = TRUE,
                last_payment_method_check_at = NOW(),
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(payment_method_id)
        .bind(company_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record the outcome of a sync attempt so failures are visible to
    /// admins without log access
    pub async fn record_sync_status(
        &self,
        company_id: Uuid,
        status: &str,
        message: Option<&str>,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE companies SET
                last_sync_status = $2,
                last_sync_message = $3,
                last_sync_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(company_id)
        .bind(status)
        .bind(message.map(truncate_message))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_message_short() {
        assert_eq!(truncate_message("all good"), "all good");
    }

    #[test]
    fn test_truncate_message_long() {
        let long = "x".repeat(SYNC_MESSAGE_MAX_LEN + 200);
        let truncated = truncate_message(&long);
        assert_eq!(truncated.chars().count(), SYNC_MESSAGE_MAX_LEN);
    }

    #[test]
    fn test_billing_fields_equality_detects_changes() {
        let a = BillingFields {
            stripe_customer_id: Some("cus_1".to_string()),
            ..Default::default()
        };
        let mut b = a.clone();
        assert_eq!(a, b);

        b.subscription_status = Some("active".to_string());
        assert_ne!(a, b);
    }
}
