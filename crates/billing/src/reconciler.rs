//! Subscription reconciliation
//!
//! One pass computes the desired quantity for every SKU and converges the
//! company's Stripe subscription line items toward them with the minimal set
//! of add / set-quantity / remove operations, applied as a single batched
//! update with proration disabled (quantity changes bill at the next cycle
//! boundary, a business rule rather than an incidental default).
//!
//! Stale customer and subscription references reported missing by Stripe are
//! cleared and recreated in the same pass. Any other provider failure
//! propagates to the caller uncaught.

use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use stripe::generated::billing::subscription::SubscriptionProrationBehavior;
use stripe::{
    CreateSubscription, CreateSubscriptionItems, CustomerId, Subscription, SubscriptionId,
    UpdateSubscription, UpdateSubscriptionItems,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::client::{SkuPriceIds, StripeClient};
use crate::customer::CustomerService;
use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::payment_method::PaymentMethodService;
use crate::policy::{load_policy, Sku};
use crate::quantities::{compute_desired_quantities, DesiredQuantities};
use crate::state::{BillingFields, BillingStateStore};
use crate::usage::load_usage_snapshot;

/// A line item currently on the Stripe subscription
#[derive(Debug, Clone)]
pub struct ExistingItem {
    pub item_id: String,
    pub price_id: String,
    pub quantity: u64,
}

/// What the reconciler did to a line item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemAction {
    Add,
    SetQuantity,
    Remove,
}

/// One queued line-item correction, recorded for audit
#[derive(Debug, Clone, Serialize)]
pub struct ItemChange {
    pub sku: Sku,
    pub old_quantity: Option<u64>,
    pub new_quantity: u64,
    pub action: ItemAction,
    /// Stripe item id for existing lines; internal to the update call
    #[serde(skip)]
    pub stripe_item_id: Option<String>,
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub skipped: bool,
    pub skip_reason: Option<&'static str>,
    pub created_customer: bool,
    pub created_subscription: bool,
    pub updated_items: Vec<ItemChange>,
    pub quantities: DesiredQuantities,
}

impl ReconcileOutcome {
    fn skipped(reason: &'static str, quantities: DesiredQuantities) -> Self {
        Self {
            skipped: true,
            skip_reason: Some(reason),
            created_customer: false,
            created_subscription: false,
            updated_items: Vec::new(),
            quantities,
        }
    }
}

/// Diff existing line items against desired quantities.
///
/// Line items billing prices this system does not manage are left untouched.
/// Running the plan against a subscription that already matches the desired
/// quantities yields no changes.
pub fn plan_item_changes(
    price_ids: &SkuPriceIds,
    existing: &[ExistingItem],
    desired: &DesiredQuantities,
) -> Vec<ItemChange> {
    let mut by_sku: HashMap<Sku, &ExistingItem> = HashMap::new();
    for item in existing {
        if let Some(sku) = price_ids.sku_for_price_id(&item.price_id) {
            by_sku.entry(sku).or_insert(item);
        }
    }

    let mut changes = Vec::new();
    for (sku, desired_quantity) in desired.iter() {
        match by_sku.get(&sku) {
            Some(item) if desired_quantity == 0 => {
                changes.push(ItemChange {
                    sku,
                    old_quantity: Some(item.quantity),
                    new_quantity: 0,
                    action: ItemAction::Remove,
                    stripe_item_id: Some(item.item_id.clone()),
                });
            }
            Some(item) if item.quantity != desired_quantity => {
                changes.push(ItemChange {
                    sku,
                    old_quantity: Some(item.quantity),
                    new_quantity: desired_quantity,
                    action: ItemAction::SetQuantity,
                    stripe_item_id: Some(item.item_id.clone()),
                });
            }
            None if desired_quantity > 0 => {
                changes.push(ItemChange {
                    sku,
                    old_quantity: None,
                    new_quantity: desired_quantity,
                    action: ItemAction::Add,
                    stripe_item_id: None,
                });
            }
            _ => {}
        }
    }

    changes
}

/// Extract the line items of a Stripe subscription for diffing
fn existing_items(subscription: &Subscription) -> Vec<ExistingItem> {
    subscription
        .items
        .data
        .iter()
        .filter_map(|item| {
            item.price.as_ref().map(|price| ExistingItem {
                item_id: item.id.to_string(),
                price_id: price.id.to_string(),
                quantity: item.quantity.unwrap_or(0),
            })
        })
        .collect()
}

/// Service that runs reconciliation passes for companies
pub struct ReconcileService {
    stripe: StripeClient,
    pool: PgPool,
    state: BillingStateStore,
    events: BillingEventLogger,
}

impl ReconcileService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            stripe,
            state: BillingStateStore::new(pool.clone()),
            events: BillingEventLogger::new(pool.clone()),
            pool,
        }
    }

    /// Run one reconciliation pass and record its outcome on the company's
    /// last-sync fields, success or failure. This is the entry point for
    /// admin-triggered and webhook-triggered syncs.
    pub async fn sync_company(&self, company_id: Uuid) -> BillingResult<ReconcileOutcome> {
        match self.reconcile_company(company_id).await {
            Ok(outcome) => {
                let message = if outcome.skipped {
                    outcome.skip_reason.unwrap_or("skipped").to_string()
                } else {
                    format!(
                        "customer_created={} subscription_created={} item_changes={}",
                        outcome.created_customer,
                        outcome.created_subscription,
                        outcome.updated_items.len()
                    )
                };
                self.state
                    .record_sync_status(company_id, "ok", Some(&message))
                    .await?;

                self.events
                    .log_event_best_effort(
                        BillingEventBuilder::new(company_id, BillingEventType::SyncCompleted).data(
                            serde_json::to_value(&outcome)
                                .unwrap_or_else(|_| serde_json::json!({})),
                        ),
                    )
                    .await;

                Ok(outcome)
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(record_err) = self
                    .state
                    .record_sync_status(company_id, "error", Some(&message))
                    .await
                {
                    tracing::error!(
                        company_id = %company_id,
                        error = %record_err,
                        "Failed to record sync failure status"
                    );
                }

                self.events
                    .log_event_best_effort(
                        BillingEventBuilder::new(company_id, BillingEventType::SyncFailed)
                            .data(serde_json::json!({ "error": message })),
                    )
                    .await;

                Err(e)
            }
        }
    }

    /// Make the company's Stripe subscription match its desired quantities
    pub async fn reconcile_company(&self, company_id: Uuid) -> BillingResult<ReconcileOutcome> {
        let policy = load_policy(&self.pool, company_id).await?;
        let usage = load_usage_snapshot(&self.pool, company_id).await?;
        let quantities = compute_desired_quantities(&policy, &usage);

        // Nothing billable: do not touch Stripe at all. A company in this
        // state never gets a customer or subscription created for it.
        if !quantities.should_use_external_billing() {
            tracing::info!(
                company_id = %company_id,
                "Nothing billable, skipping Stripe reconciliation"
            );
            return Ok(ReconcileOutcome::skipped("nothing billable", quantities));
        }

        let customer_service = CustomerService::new(self.stripe.clone(), self.pool.clone());
        let customer = customer_service.resolve_customer(company_id).await?;

        let payment_method_service =
            PaymentMethodService::new(self.stripe.clone(), self.pool.clone());
        let payment_method = payment_method_service
            .resolve_default(company_id, Some(&customer.customer_id))
            .await?;
        let payment_method_id = payment_method
            .as_ref()
            .map(|pm| pm.payment_method_id.clone());

        let existing_subscription = self.fetch_usable_subscription(company_id).await?;

        let (subscription, created_subscription, updated_items) = match existing_subscription {
            Some(subscription) => {
                let changes = plan_item_changes(
                    self.stripe.price_ids(),
                    &existing_items(&subscription),
                    &quantities,
                );
                let subscription = if changes.is_empty() {
                    subscription
                } else {
                    self.apply_item_changes(&subscription, &changes, payment_method_id.as_deref())
                        .await?
                };
                (subscription, false, changes)
            }
            None => {
                let subscription = self
                    .create_subscription(
                        company_id,
                        &customer.customer_id,
                        &quantities,
                        payment_method_id.as_deref(),
                    )
                    .await?;
                (subscription, true, Vec::new())
            }
        };

        // Persist everything this pass learned. Only actual deltas are
        // written; losing a successful Stripe change here would desync state,
        // so persistence failures propagate.
        let record = self.state.load(company_id).await?;
        let mut fields = BillingFields::from(&record);
        fields.stripe_customer_id = Some(customer.customer_id.clone());
        fields.stripe_subscription_id = Some(subscription.id.to_string());
        fields.subscription_status = Some(subscription.status.as_str().to_string());
        fields.current_period_end =
            OffsetDateTime::from_unix_timestamp(subscription.current_period_end).ok();
        if let Some(pm_id) = &payment_method_id {
            fields.default_payment_method_id = Some(pm_id.clone());
            fields.has_payment_method_on_file = true;
        }
        self.state.persist(company_id, &fields).await?;

        tracing::info!(
            company_id = %company_id,
            subscription_id = %subscription.id,
            created_customer = customer.created,
            created_subscription = created_subscription,
            item_changes = updated_items.len(),
            "Reconciliation pass complete"
        );

        Ok(ReconcileOutcome {
            skipped: false,
            skip_reason: None,
            created_customer: customer.created,
            created_subscription,
            updated_items,
            quantities,
        })
    }

    /// Fetch the stored subscription if it still exists and is not terminal.
    ///
    /// A stored id Stripe no longer knows about is cleared from the company
    /// row (self-heal); a terminated subscription is never reused, so both
    /// cases return None and the caller creates a fresh one.
    async fn fetch_usable_subscription(
        &self,
        company_id: Uuid,
    ) -> BillingResult<Option<Subscription>> {
        let record = self.state.load(company_id).await?;

        let Some(stored_id) = record.stripe_subscription_id.clone() else {
            return Ok(None);
        };

        let subscription_id = stored_id
            .parse::<SubscriptionId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid subscription ID: {}", e)))?;

        let subscription =
            match Subscription::retrieve(self.stripe.inner(), &subscription_id, &[]).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    let billing_err = BillingError::from(e);
                    if !billing_err.is_not_found() {
                        return Err(billing_err);
                    }
                    tracing::warn!(
                        company_id = %company_id,
                        subscription_id = %stored_id,
                        "Stored subscription no longer exists, clearing stale reference"
                    );
                    let mut fields = BillingFields::from(&record);
                    fields.stripe_subscription_id = None;
                    fields.subscription_status = None;
                    fields.current_period_end = None;
                    self.state.persist(company_id, &fields).await?;
                    return Ok(None);
                }
            };

        if matches!(
            subscription.status,
            stripe::SubscriptionStatus::Canceled | stripe::SubscriptionStatus::IncompleteExpired
        ) {
            tracing::info!(
                company_id = %company_id,
                subscription_id = %stored_id,
                status = subscription.status.as_str(),
                "Stored subscription is terminal, a fresh one will be created"
            );
            return Ok(None);
        }

        Ok(Some(subscription))
    }

    /// Create a subscription carrying every SKU with a desired quantity > 0
    async fn create_subscription(
        &self,
        company_id: Uuid,
        customer_id: &str,
        quantities: &DesiredQuantities,
        payment_method_id: Option<&str>,
    ) -> BillingResult<Subscription> {
        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let items: Vec<CreateSubscriptionItems> = quantities
            .iter()
            .filter(|(_, quantity)| *quantity > 0)
            .map(|(sku, quantity)| CreateSubscriptionItems {
                price: Some(self.stripe.price_ids().for_sku(sku).to_string()),
                quantity: Some(quantity),
                ..Default::default()
            })
            .collect();

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("company_id".to_string(), company_id.to_string());

        let mut params = CreateSubscription::new(customer_id);
        params.items = Some(items);
        params.metadata = Some(metadata);
        params.default_payment_method = payment_method_id;

        let subscription = Subscription::create(self.stripe.inner(), params).await?;

        self.events
            .log_event_best_effort(
                BillingEventBuilder::new(company_id, BillingEventType::SubscriptionCreated)
                    .data(serde_json::json!({
                        "quantities": quantities,
                        "status": subscription.status.as_str(),
                    }))
                    .stripe_subscription(subscription.id.to_string()),
            )
            .await;

        tracing::info!(
            company_id = %company_id,
            subscription_id = %subscription.id,
            "Created subscription"
        );

        Ok(subscription)
    }

    /// Apply all queued corrections in one batched update with no proration.
    /// A missing subscription default payment method is attached in the same
    /// call when one was resolved.
    async fn apply_item_changes(
        &self,
        subscription: &Subscription,
        changes: &[ItemChange],
        payment_method_id: Option<&str>,
    ) -> BillingResult<Subscription> {
        let mut items = Vec::with_capacity(changes.len());
        for change in changes {
            let item = match change.action {
                ItemAction::Add => UpdateSubscriptionItems {
                    price: Some(self.stripe.price_ids().for_sku(change.sku).to_string()),
                    quantity: Some(change.new_quantity),
                    ..Default::default()
                },
                ItemAction::SetQuantity => UpdateSubscriptionItems {
                    id: change.stripe_item_id.clone(),
                    quantity: Some(change.new_quantity),
                    ..Default::default()
                },
                ItemAction::Remove => UpdateSubscriptionItems {
                    id: change.stripe_item_id.clone(),
                    deleted: Some(true),
                    ..Default::default()
                },
            };
            items.push(item);

            tracing::info!(
                subscription_id = %subscription.id,
                sku = %change.sku,
                action = ?change.action,
                old_quantity = ?change.old_quantity,
                new_quantity = change.new_quantity,
                "Queued subscription item change"
            );
        }

        let needs_payment_method = subscription.default_payment_method.is_none();

        let params = UpdateSubscription {
            items: Some(items),
            // Quantity corrections bill at the next cycle, never mid-cycle.
            proration_behavior: Some(SubscriptionProrationBehavior::None),
            default_payment_method: if needs_payment_method {
                payment_method_id
            } else {
                None
            },
            ..Default::default()
        };

        let updated = Subscription::update(self.stripe.inner(), &subscription.id, params).await?;

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SkuPriceIds;

    fn price_ids() -> SkuPriceIds {
        SkuPriceIds {
            seat_base: "price_base".to_string(),
            seat_overage: "price_overage".to_string(),
            website: "price_website".to_string(),
            community: "price_community".to_string(),
        }
    }

    fn item(item_id: &str, price_id: &str, quantity: u64) -> ExistingItem {
        ExistingItem {
            item_id: item_id.to_string(),
            price_id: price_id.to_string(),
            quantity,
        }
    }

    #[test]
    fn test_plan_adds_missing_lines() {
        let desired = DesiredQuantities {
            seat_base: 1,
            seat_overage: 3,
            website: 0,
            community: 0,
        };

        let changes = plan_item_changes(&price_ids(), &[], &desired);
        assert_eq!(changes.len(), 2);
        assert!(changes
            .iter()
            .all(|change| change.action == ItemAction::Add));
        assert!(changes.iter().all(|change| change.old_quantity.is_none()));
    }

    #[test]
    fn test_plan_mixed_operations() {
        let existing = vec![
            item("si_1", "price_base", 1),
            item("si_2", "price_overage", 4),
            item("si_3", "price_website", 1),
        ];
        let desired = DesiredQuantities {
            seat_base: 1,
            seat_overage: 7,
            website: 0,
            community: 2,
        };

        let changes = plan_item_changes(&price_ids(), &existing, &desired);
        assert_eq!(changes.len(), 3);

        let overage = changes
            .iter()
            .find(|c| c.sku == Sku::SeatOverage)
            .expect("overage change");
        assert_eq!(overage.action, ItemAction::SetQuantity);
        assert_eq!(overage.old_quantity, Some(4));
        assert_eq!(overage.new_quantity, 7);
        assert_eq!(overage.stripe_item_id.as_deref(), Some("si_2"));

        let website = changes
            .iter()
            .find(|c| c.sku == Sku::Website)
            .expect("website change");
        assert_eq!(website.action, ItemAction::Remove);
        assert_eq!(website.old_quantity, Some(1));

        let community = changes
            .iter()
            .find(|c| c.sku == Sku::Community)
            .expect("community change");
        assert_eq!(community.action, ItemAction::Add);
        assert_eq!(community.new_quantity, 2);
    }

    #[test]
    fn test_plan_is_empty_when_converged() {
        let existing = vec![
            item("si_1", "price_base", 1),
            item("si_2", "price_overage", 2),
            item("si_3", "price_community", 4),
        ];
        let desired = DesiredQuantities {
            seat_base: 1,
            seat_overage: 2,
            website: 0,
            community: 4,
        };

        let changes = plan_item_changes(&price_ids(), &existing, &desired);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_plan_leaves_unmanaged_prices_alone() {
        // A line item from another product on the same subscription
        let existing = vec![
            item("si_1", "price_base", 1),
            item("si_2", "price_legacy_concierge", 1),
        ];
        let desired = DesiredQuantities {
            seat_base: 1,
            ..Default::default()
        };

        let changes = plan_item_changes(&price_ids(), &existing, &desired);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_plan_no_removal_for_absent_zero_lines() {
        let desired = DesiredQuantities::default();
        let changes = plan_item_changes(&price_ids(), &[], &desired);
        assert!(changes.is_empty());
    }
}
