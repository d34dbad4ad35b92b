// Billing crate clippy configuration
// These are intentional patterns in this crate:
#![allow(clippy::field_reassign_with_default)] // Used for conditional struct field setting
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Clubgrid Billing Module
//!
//! Keeps company billing correct by reconciling what should be billed
//! (active seats, enabled add-ons, per-company policy) against the line
//! items of the company's Stripe subscription, and by consuming Stripe's
//! webhook notifications exactly once despite at-least-once delivery.
//!
//! ## Pieces
//!
//! - **Quantities**: pure policy + usage → desired quantity per SKU
//! - **Customer / payment-method resolution**: stale references self-heal
//! - **Reconciler**: minimal add/set/remove of subscription line items
//! - **State store**: diff-logged persistence onto the company row
//! - **Webhooks**: claim-once processing of inbound Stripe events

pub mod client;
pub mod customer;
pub mod error;
pub mod events;
pub mod payment_method;
pub mod policy;
pub mod quantities;
pub mod reconciler;
pub mod state;
pub mod usage;
pub mod webhooks;

// Client
pub use client::{BillingConfig, SkuPriceIds, StripeClient};

// Customer
pub use customer::{CustomerService, ResolvedCustomer};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{BillingEventBuilder, BillingEventLogger, BillingEventType};

// Payment methods
pub use payment_method::{PaymentMethodService, PaymentMethodSource, ResolvedPaymentMethod};

// Policy & quantities
pub use policy::{load_policy, AddonMode, BillingPolicy, SeatsMode, Sku};
pub use quantities::{
    compute_desired_quantities, DesiredQuantities, UsageSnapshot, SEATS_INCLUDED_IN_BASE,
};

// Reconciler
pub use reconciler::{
    plan_item_changes, ExistingItem, ItemAction, ItemChange, ReconcileOutcome, ReconcileService,
};

// State store
pub use state::{BillingFields, BillingStateStore, SYNC_MESSAGE_MAX_LEN};

// Usage
pub use usage::load_usage_snapshot;

// Webhooks
pub use webhooks::{ClaimOutcome, CompanySource, WebhookOutcome, WebhookProcessor};

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub customer: CustomerService,
    pub payment_methods: PaymentMethodService,
    pub reconciler: ReconcileService,
    pub state: BillingStateStore,
    pub webhooks: WebhookProcessor,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let stripe = StripeClient::from_env()?;
        Ok(Self::new(stripe, pool))
    }

    /// Create a new billing service with an explicit Stripe client
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            customer: CustomerService::new(stripe.clone(), pool.clone()),
            payment_methods: PaymentMethodService::new(stripe.clone(), pool.clone()),
            reconciler: ReconcileService::new(stripe.clone(), pool.clone()),
            state: BillingStateStore::new(pool.clone()),
            webhooks: WebhookProcessor::new(stripe, pool),
        }
    }
}
