//! Stripe customer resolution
//!
//! Returns a valid Stripe customer for a company, creating one only when
//! necessary. A stored customer id that Stripe reports as missing (deleted
//! or purged upstream) is treated as stale and replaced, so the reference
//! self-heals without manual intervention.

use sqlx::PgPool;
use stripe::{CreateCustomer, Customer, CustomerId};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::state::BillingStateStore;

/// A resolved Stripe customer identity
#[derive(Debug, Clone)]
pub struct ResolvedCustomer {
    pub customer_id: String,
    /// Whether this pass had to create the customer
    pub created: bool,
}

/// Customer service for resolving and creating Stripe customers
pub struct CustomerService {
    stripe: StripeClient,
    pool: PgPool,
    state: BillingStateStore,
    events: BillingEventLogger,
}

impl CustomerService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            stripe,
            state: BillingStateStore::new(pool.clone()),
            events: BillingEventLogger::new(pool.clone()),
            pool,
        }
    }

    /// Resolve a usable Stripe customer for a company, creating one if the
    /// company has none or its stored reference is stale.
    pub async fn resolve_customer(&self, company_id: Uuid) -> BillingResult<ResolvedCustomer> {
        let record = self.state.load(company_id).await?;

        if let Some(stored_id) = &record.stripe_customer_id {
            let customer_id = stored_id
                .parse::<CustomerId>()
                .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

            match Customer::retrieve(self.stripe.inner(), &customer_id, &[]).await {
                Ok(customer) if !customer.deleted => {
                    return Ok(ResolvedCustomer {
                        customer_id: stored_id.clone(),
                        created: false,
                    });
                }
                Ok(_) => {
                    tracing::warn!(
                        company_id = %company_id,
                        customer_id = %stored_id,
                        "Stored Stripe customer is deleted, recreating"
                    );
                }
                Err(e) => {
                    let billing_err = BillingError::from(e);
                    if !billing_err.is_not_found() {
                        // Transient or auth failures must not trigger a
                        // recreate with a dangling duplicate customer.
                        return Err(billing_err);
                    }
                    tracing::warn!(
                        company_id = %company_id,
                        customer_id = %stored_id,
                        "Stored Stripe customer no longer exists, recreating"
                    );
                }
            }
        }

        let customer = self.create_customer(company_id).await?;
        Ok(ResolvedCustomer {
            customer_id: customer.id.to_string(),
            created: true,
        })
    }

    /// Create a new Stripe customer tagged with the company identity
    pub async fn create_customer(&self, company_id: Uuid) -> BillingResult<Customer> {
        let (name, email) = self.company_contact(company_id).await?;

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("company_id".to_string(), company_id.to_string());
        metadata.insert("platform".to_string(), "clubgrid".to_string());

        let params = CreateCustomer {
            email: Some(&email),
            name: Some(&name),
            metadata: Some(metadata),
            ..Default::default()
        };

        let customer = Customer::create(self.stripe.inner(), params).await?;

        self.state
            .set_customer_id(company_id, customer.id.as_str())
            .await?;

        self.events
            .log_event_best_effort(
                BillingEventBuilder::new(company_id, BillingEventType::CustomerCreated)
                    .data(serde_json::json!({ "email": email }))
                    .stripe_customer(customer.id.to_string()),
            )
            .await;

        tracing::info!(
            company_id = %company_id,
            customer_id = %customer.id,
            "Created Stripe customer"
        );

        Ok(customer)
    }

    /// Company name and a billing contact email (the owner's address, with a
    /// synthetic fallback when no owner exists yet)
    async fn company_contact(&self, company_id: Uuid) -> BillingResult<(String, String)> {
        let name: Option<(String,)> = sqlx::query_as("SELECT name FROM companies WHERE id = $1")
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?;

        let (name,) = name.ok_or_else(|| BillingError::CompanyNotFound(company_id.to_string()))?;

        let owner_email: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT email FROM users
            WHERE company_id = $1 AND role = 'owner'
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        let email = owner_email
            .map(|(e,)| e)
            .unwrap_or_else(|| format!("company-{}@clubgrid.com", company_id));

        Ok((name, email))
    }
}
