//! Common types used across Clubgrid

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Subscription statuses after which a subscription is never reused.
/// A company whose subscription is in one of these states is not managed-active.
pub const TERMINAL_SUBSCRIPTION_STATUSES: &[&str] = &["canceled", "incomplete_expired"];

/// Derive the managed-active flag from the stored subscription identity.
///
/// This is the only way `managed_active` may be computed: a subscription id
/// must exist and its last observed status must not be terminal.
pub fn derive_managed_active(
    subscription_id: Option<&str>,
    subscription_status: Option<&str>,
) -> bool {
    match (subscription_id, subscription_status) {
        (Some(_), Some(status)) => !TERMINAL_SUBSCRIPTION_STATUSES.contains(&status),
        _ => false,
    }
}

/// The billing portion of a company row.
///
/// One record per tenant, created with the company and updated by every
/// reconciliation pass and webhook handler. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CompanyBillingRecord {
    pub id: Uuid,
    pub name: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub subscription_status: Option<String>,
    pub current_period_end: Option<OffsetDateTime>,
    pub managed_active: bool,
    pub default_payment_method_id: Option<String>,
    pub has_payment_method_on_file: bool,
    pub last_payment_method_check_at: Option<OffsetDateTime>,
    pub last_sync_status: Option<String>,
    pub last_sync_message: Option<String>,
    pub last_sync_at: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_active_requires_subscription_id() {
        assert!(!derive_managed_active(None, Some("active")));
        assert!(!derive_managed_active(None, None));
    }

    #[test]
    fn test_managed_active_for_live_statuses() {
        assert!(derive_managed_active(Some("sub_123"), Some("active")));
        assert!(derive_managed_active(Some("sub_123"), Some("trialing")));
        assert!(derive_managed_active(Some("sub_123"), Some("past_due")));
    }

    #[test]
    fn test_managed_active_terminal_statuses() {
        assert!(!derive_managed_active(Some("sub_123"), Some("canceled")));
        assert!(!derive_managed_active(
            Some("sub_123"),
            Some("incomplete_expired")
        ));
        assert!(!derive_managed_active(Some("sub_123"), None));
    }
}
