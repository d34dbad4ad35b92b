//! Default payment method resolution
//!
//! Best-effort selection of a payment instrument to attach when creating or
//! updating a subscription, so invoices are not left without one. Sources
//! are tried in a fixed order and the winning source is recorded for
//! observability. Finding nothing is a valid outcome, not an error.

use serde::Serialize;
use sqlx::PgPool;
use stripe::{
    Customer, CustomerId, ListPaymentMethods, PaymentMethod, PaymentMethodTypeFilter,
};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::state::BillingStateStore;

/// Which source produced the default payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodSource {
    /// The id already stored on the company billing record
    StoredDefault,
    /// The customer's configured default invoice payment method in Stripe
    CustomerDefault,
    /// The most recently added card on file for the customer
    MostRecentCard,
}

impl PaymentMethodSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StoredDefault => "stored_default",
            Self::CustomerDefault => "customer_default",
            Self::MostRecentCard => "most_recent_card",
        }
    }
}

/// A resolved payment method and where it came from
#[derive(Debug, Clone)]
pub struct ResolvedPaymentMethod {
    pub payment_method_id: String,
    pub source: PaymentMethodSource,
}

/// Payment method resolver
pub struct PaymentMethodService {
    stripe: StripeClient,
    state: BillingStateStore,
}

impl PaymentMethodService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            stripe,
            state: BillingStateStore::new(pool),
        }
    }

    /// Resolve the default payment method for a company, trying each source
    /// in order. A hit from a Stripe-side source that differs from the stored
    /// value is persisted opportunistically.
    pub async fn resolve_default(
        &self,
        company_id: Uuid,
        customer_id: Option<&str>,
    ) -> BillingResult<Option<ResolvedPaymentMethod>> {
        let record = self.state.load(company_id).await?;

        if let Some(stored) = record.default_payment_method_id.clone() {
            tracing::debug!(
                company_id = %company_id,
                source = PaymentMethodSource::StoredDefault.as_str(),
                "Resolved default payment method"
            );
            return Ok(Some(ResolvedPaymentMethod {
                payment_method_id: stored,
                source: PaymentMethodSource::StoredDefault,
            }));
        }

        let Some(customer_id) = customer_id else {
            return Ok(None);
        };

        let resolved = match self.customer_default(customer_id).await? {
            Some(payment_method_id) => Some(ResolvedPaymentMethod {
                payment_method_id,
                source: PaymentMethodSource::CustomerDefault,
            }),
            None => self
                .most_recent_card(customer_id)
                .await?
                .map(|payment_method_id| ResolvedPaymentMethod {
                    payment_method_id,
                    source: PaymentMethodSource::MostRecentCard,
                }),
        };

        if let Some(found) = &resolved {
            tracing::info!(
                company_id = %company_id,
                customer_id = %customer_id,
                source = found.source.as_str(),
                "Resolved default payment method"
            );
            if record.default_payment_method_id.as_deref() != Some(&found.payment_method_id) {
                self.state
                    .set_default_payment_method(company_id, &found.payment_method_id)
                    .await?;
            }
        } else {
            tracing::debug!(
                company_id = %company_id,
                customer_id = %customer_id,
                "No payment method on file"
            );
        }

        Ok(resolved)
    }

    /// The customer's configured default invoice payment method, if any
    pub async fn customer_default(&self, customer_id: &str) -> BillingResult<Option<String>> {
        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let customer = Customer::retrieve(self.stripe.inner(), &customer_id, &[]).await?;

        Ok(customer
            .invoice_settings
            .and_then(|settings| settings.default_payment_method)
            .map(|pm| match pm {
                stripe::Expandable::Id(id) => id.to_string(),
                stripe::Expandable::Object(pm) => pm.id.to_string(),
            }))
    }

    /// The most recently added card on file for the customer (fallback
    /// enumeration, first result only)
    pub async fn most_recent_card(&self, customer_id: &str) -> BillingResult<Option<String>> {
        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let mut params = ListPaymentMethods::new();
        params.customer = Some(customer_id);
        params.type_ = Some(PaymentMethodTypeFilter::Card);
        params.limit = Some(1);

        let list = PaymentMethod::list(self.stripe.inner(), &params).await?;

        Ok(list.data.first().map(|pm| pm.id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_names() {
        assert_eq!(PaymentMethodSource::StoredDefault.as_str(), "stored_default");
        assert_eq!(
            PaymentMethodSource::CustomerDefault.as_str(),
            "customer_default"
        );
        assert_eq!(
            PaymentMethodSource::MostRecentCard.as_str(),
            "most_recent_card"
        );
    }
}
