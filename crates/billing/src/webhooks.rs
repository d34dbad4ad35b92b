//! Stripe webhook processing
//!
//! The idempotency gate in front of all inbound Stripe notifications.
//! Every event is claimed by its provider-assigned id before any handler
//! runs; the claim is backed by a unique index on the event log, so duplicate
//! or concurrent deliveries of the same event never double-apply a change,
//! even across process instances.
//!
//! Event lifecycle: `processing` → `processed` on handler success, or
//! `processing` → `failed` on handler error. A `failed` entry is re-claimed
//! exactly once per redelivery, with `attempts` incremented and the previous
//! error cleared. Rows are never deleted.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use std::collections::HashMap;
use stripe::{
    CheckoutSession, CheckoutSessionMode, Event, EventObject, EventType, Invoice, SetupIntent,
    Subscription, UpdateCustomer, Webhook,
};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::payment_method::PaymentMethodService;
use crate::reconciler::ReconcileService;
use crate::state::{truncate_message, BillingFields, BillingStateStore};

type HmacSha256 = Hmac<Sha256>;

/// Seconds of clock skew tolerated when verifying signed payloads
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// What processing an inbound event amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// This delivery owned the event and its handler succeeded
    Processed,
    /// The event was already handled (or is being handled) by another delivery
    Duplicate,
    /// No handler exists for this event type; acknowledged without claiming
    Ignored,
    /// This delivery owned the event but its handler failed; the failure is
    /// recorded on the event log and Stripe's redelivery is the retry path
    Failed,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Duplicate => "duplicate",
            Self::Ignored => "ignored",
            Self::Failed => "failed",
        }
    }
}

/// Which resolver strategy found the company for an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanySource {
    /// `company_id` metadata on the event object; authoritative when present
    EventMetadata,
    /// Lookup by the Stripe customer id stored on a company row
    CustomerId,
    /// Lookup by the Stripe subscription id stored on a company row
    SubscriptionId,
}

impl CompanySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventMetadata => "event_metadata",
            Self::CustomerId => "customer_id",
            Self::SubscriptionId => "subscription_id",
        }
    }
}

/// Parse a Stripe signature header (`t=...,v1=...`) into its timestamp and
/// v1 signature
fn parse_signature_header(signature: &str) -> Option<(i64, String)> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<String> = None;

    for part in signature.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0] {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1_signature = Some(kv[1].to_string()),
                _ => {}
            }
        }
    }

    match (timestamp, v1_signature) {
        (Some(t), Some(v1)) => Some((t, v1)),
        _ => None,
    }
}

/// Result of attempting to take ownership of an event id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller owns the event and must finalize it
    Claimed,
    /// Another delivery already handled (or is handling) the event
    Duplicate,
}

/// Processor for inbound Stripe webhook events
pub struct WebhookProcessor {
    stripe: StripeClient,
    pool: PgPool,
    state: BillingStateStore,
    events: BillingEventLogger,
}

impl WebhookProcessor {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            stripe,
            state: BillingStateStore::new(pool.clone()),
            events: BillingEventLogger::new(pool.clone()),
            pool,
        }
    }

    /// Verify and parse a Stripe webhook event from the raw request body.
    ///
    /// Uses the library verification first and falls back to manual
    /// signature verification, which tolerates Stripe API versions newer
    /// than the ones the library pins.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<Event> {
        let webhook_secret = &self.stripe.config().webhook_secret;

        match Webhook::construct_event(payload, signature, webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::debug!(
                    stripe_error = %e,
                    "Library webhook parsing failed, trying manual verification"
                );
            }
        }

        let (timestamp, v1_signature) =
            parse_signature_header(signature).ok_or(BillingError::WebhookSignatureInvalid)?;

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|_| BillingError::WebhookSignatureInvalid)?
            .as_secs() as i64;

        if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            tracing::warn!(
                timestamp = timestamp,
                skew_secs = (now - timestamp).abs(),
                "Webhook timestamp outside tolerance"
            );
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let secret_key = webhook_secret
            .strip_prefix("whsec_")
            .unwrap_or(webhook_secret);
        let signed_payload = format!("{}.{}", timestamp, payload);

        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
            .map_err(|_| BillingError::WebhookSignatureInvalid)?;
        mac.update(signed_payload.as_bytes());
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed != v1_signature {
            tracing::warn!("Webhook signature mismatch");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let event: Event = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse verified webhook payload");
            BillingError::WebhookSignatureInvalid
        })?;

        Ok(event)
    }

    /// Whether a handler exists for this event type
    fn handles(event_type: &EventType) -> bool {
        matches!(
            event_type,
            EventType::CheckoutSessionCompleted
                | EventType::CustomerSubscriptionCreated
                | EventType::CustomerSubscriptionUpdated
                | EventType::CustomerSubscriptionDeleted
                | EventType::InvoicePaid
                | EventType::InvoicePaymentFailed
        )
    }

    /// Claim, dispatch, and finalize one verified event
    pub async fn process_event(&self, event: Event) -> BillingResult<WebhookOutcome> {
        let event_id = event.id.to_string();
        let event_type = event.type_.to_string();

        if !Self::handles(&event.type_) {
            tracing::info!(
                event_id = %event_id,
                event_type = %event_type,
                "No handler for event type, acknowledging as ignored"
            );
            return Ok(WebhookOutcome::Ignored);
        }

        match self.claim_event(&event_id, &event_type).await? {
            ClaimOutcome::Duplicate => {
                tracing::info!(
                    event_id = %event_id,
                    event_type = %event_type,
                    "Duplicate webhook delivery, skipping"
                );
                return Ok(WebhookOutcome::Duplicate);
            }
            ClaimOutcome::Claimed => {}
        }

        tracing::info!(
            event_id = %event_id,
            event_type = %event_type,
            "Claimed webhook event for processing"
        );

        match self.dispatch(event).await {
            Ok(company_id) => {
                self.mark_processed(&event_id, company_id).await?;
                Ok(WebhookOutcome::Processed)
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event_id,
                    event_type = %event_type,
                    error = %e,
                    "Webhook handler failed, awaiting provider redelivery"
                );
                self.mark_failed(&event_id, &e.to_string()).await?;
                Ok(WebhookOutcome::Failed)
            }
        }
    }

    /// Take exclusive ownership of an event id.
    ///
    /// The insert races on the unique index, so exactly one concurrent
    /// delivery wins. A prior `failed` entry is re-claimed atomically; the
    /// status guard in the UPDATE makes a concurrent second re-claim lose.
    pub async fn claim_event(
        &self,
        event_id: &str,
        event_type: &str,
    ) -> BillingResult<ClaimOutcome> {
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO stripe_webhook_events (stripe_event_id, event_type, status, attempts)
            VALUES ($1, $2, 'processing', 1)
            ON CONFLICT (stripe_event_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .fetch_optional(&self.pool)
        .await?;

        if inserted.is_some() {
            return Ok(ClaimOutcome::Claimed);
        }

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT status FROM stripe_webhook_events WHERE stripe_event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;

        match existing.as_ref().map(|(status,)| status.as_str()) {
            Some("failed") => {
                // Retry delivery after a recorded failure: re-claim once.
                let reclaimed: Option<(Uuid,)> = sqlx::query_as(
                    r#"
                    UPDATE stripe_webhook_events
                    SET status = 'processing', attempts = attempts + 1,
                        last_error = NULL, updated_at = NOW()
                    WHERE stripe_event_id = $1 AND status = 'failed'
                    RETURNING id
                    "#,
                )
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;

                if reclaimed.is_some() {
                    Ok(ClaimOutcome::Claimed)
                } else {
                    Ok(ClaimOutcome::Duplicate)
                }
            }
            Some(_) => Ok(ClaimOutcome::Duplicate),
            None => {
                // Insert conflicted but the row is gone; entries are never
                // deleted, so this should not happen.
                Err(BillingError::Internal(format!(
                    "Webhook event {} vanished between claim attempts",
                    event_id
                )))
            }
        }
    }

    /// Finalize a claimed event as successfully handled
    pub async fn mark_processed(
        &self,
        event_id: &str,
        company_id: Option<Uuid>,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE stripe_webhook_events
            SET status = 'processed', processed_at = NOW(),
                company_id = COALESCE($2, company_id), updated_at = NOW()
            WHERE stripe_event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(company_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Finalize a claimed event as failed, recording a truncated error.
    /// The row stays eligible for one re-claim per provider redelivery.
    pub async fn mark_failed(&self, event_id: &str, error: &str) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE stripe_webhook_events
            SET status = 'failed', last_error = $2, updated_at = NOW()
            WHERE stripe_event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(truncate_message(error))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Route a claimed event to its handler. Returns the company the event
    /// was resolved to, when one was found.
    async fn dispatch(&self, event: Event) -> BillingResult<Option<Uuid>> {
        let event_id = event.id.to_string();

        match event.type_ {
            EventType::CheckoutSessionCompleted => {
                let session = match event.data.object {
                    EventObject::CheckoutSession(session) => session,
                    _ => {
                        return Err(BillingError::WebhookEventNotSupported(
                            "Expected CheckoutSession".to_string(),
                        ))
                    }
                };
                self.handle_checkout_completed(&event_id, session).await
            }
            EventType::CustomerSubscriptionCreated
            | EventType::CustomerSubscriptionUpdated
            | EventType::CustomerSubscriptionDeleted => {
                let audit_type = match event.type_ {
                    EventType::CustomerSubscriptionCreated => BillingEventType::SubscriptionCreated,
                    EventType::CustomerSubscriptionDeleted => {
                        BillingEventType::SubscriptionCanceled
                    }
                    _ => BillingEventType::SubscriptionUpdated,
                };
                let subscription = match event.data.object {
                    EventObject::Subscription(subscription) => subscription,
                    _ => {
                        return Err(BillingError::WebhookEventNotSupported(
                            "Expected Subscription".to_string(),
                        ))
                    }
                };
                self.handle_subscription_lifecycle(&event_id, subscription, audit_type)
                    .await
            }
            EventType::InvoicePaid => {
                let invoice = self.extract_invoice(event)?;
                self.handle_invoice_status(&event_id, invoice, "active", BillingEventType::InvoicePaid)
                    .await
            }
            EventType::InvoicePaymentFailed => {
                let invoice = self.extract_invoice(event)?;
                self.handle_invoice_status(
                    &event_id,
                    invoice,
                    "past_due",
                    BillingEventType::InvoiceFailed,
                )
                .await
            }
            _ => Err(BillingError::WebhookEventNotSupported(
                event.type_.to_string(),
            )),
        }
    }

    fn extract_invoice(&self, event: Event) -> BillingResult<Invoice> {
        match event.data.object {
            EventObject::Invoice(invoice) => Ok(invoice),
            _ => Err(BillingError::WebhookEventNotSupported(
                "Expected Invoice".to_string(),
            )),
        }
    }

    /// Resolve the company an event belongs to.
    ///
    /// Strategies run in a fixed order: explicit metadata is authoritative
    /// when present (it covers objects whose customer/subscription link has
    /// not been persisted yet), and the stored-id lookups are the recovery
    /// path for lifecycle events that carry no metadata.
    async fn resolve_company(
        &self,
        metadata: Option<&HashMap<String, String>>,
        customer_id: Option<&str>,
        subscription_id: Option<&str>,
    ) -> BillingResult<Option<(Uuid, CompanySource)>> {
        if let Some(company_id) = metadata
            .and_then(|m| m.get("company_id"))
            .and_then(|raw| Uuid::parse_str(raw).ok())
        {
            return Ok(Some((company_id, CompanySource::EventMetadata)));
        }

        if let Some(customer_id) = customer_id {
            let row: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM companies WHERE stripe_customer_id = $1")
                    .bind(customer_id)
                    .fetch_optional(&self.pool)
                    .await?;
            if let Some((company_id,)) = row {
                return Ok(Some((company_id, CompanySource::CustomerId)));
            }
        }

        if let Some(subscription_id) = subscription_id {
            let row: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM companies WHERE stripe_subscription_id = $1")
                    .bind(subscription_id)
                    .fetch_optional(&self.pool)
                    .await?;
            if let Some((company_id,)) = row {
                return Ok(Some((company_id, CompanySource::SubscriptionId)));
            }
        }

        Ok(None)
    }

    /// Checkout session completed: a setup session only captures a payment
    /// method; a subscription session links the new subscription and runs a
    /// reconciliation pass to pick up any immediate quantity drift.
    async fn handle_checkout_completed(
        &self,
        event_id: &str,
        session: CheckoutSession,
    ) -> BillingResult<Option<Uuid>> {
        let customer_id = session.customer.as_ref().map(|c| match c {
            stripe::Expandable::Id(id) => id.to_string(),
            stripe::Expandable::Object(customer) => customer.id.to_string(),
        });
        let subscription_id = session.subscription.as_ref().map(|s| match s {
            stripe::Expandable::Id(id) => id.to_string(),
            stripe::Expandable::Object(subscription) => subscription.id.to_string(),
        });

        let resolved = self
            .resolve_company(
                session.metadata.as_ref(),
                customer_id.as_deref(),
                subscription_id.as_deref(),
            )
            .await?;

        let Some((company_id, source)) = resolved else {
            tracing::warn!(
                event_id = %event_id,
                session_id = %session.id,
                "Checkout session has no resolvable company, nothing to do"
            );
            return Ok(None);
        };

        tracing::info!(
            event_id = %event_id,
            company_id = %company_id,
            company_source = source.as_str(),
            mode = ?session.mode,
            "Processing checkout session"
        );

        match session.mode {
            CheckoutSessionMode::Setup => {
                self.capture_setup_payment_method(company_id, &session, customer_id.as_deref())
                    .await?;
            }
            CheckoutSessionMode::Subscription => {
                if let Some(subscription_id) = &subscription_id {
                    let parsed = subscription_id.parse().map_err(|e| {
                        BillingError::StripeApi(format!("Invalid subscription ID: {}", e))
                    })?;
                    let subscription =
                        Subscription::retrieve(self.stripe.inner(), &parsed, &[]).await?;

                    let record = self.state.load(company_id).await?;
                    let mut fields = BillingFields::from(&record);
                    if let Some(customer_id) = &customer_id {
                        fields.stripe_customer_id = Some(customer_id.clone());
                    }
                    fields.stripe_subscription_id = Some(subscription.id.to_string());
                    fields.subscription_status = Some(subscription.status.as_str().to_string());
                    fields.current_period_end = time::OffsetDateTime::from_unix_timestamp(
                        subscription.current_period_end,
                    )
                    .ok();
                    self.state.persist(company_id, &fields).await?;
                }

                // Converge line items right away instead of waiting for the
                // next scheduled sync.
                let reconciler = ReconcileService::new(self.stripe.clone(), self.pool.clone());
                reconciler.sync_company(company_id).await?;
            }
            _ => {
                tracing::info!(
                    event_id = %event_id,
                    session_id = %session.id,
                    "Ignoring non-billing checkout session mode"
                );
            }
        }

        Ok(Some(company_id))
    }

    /// Pick the payment method produced by a setup session and make it the
    /// default everywhere: freshly submitted setup result first, then the
    /// customer's configured default, then the newest card on file.
    async fn capture_setup_payment_method(
        &self,
        company_id: Uuid,
        session: &CheckoutSession,
        customer_id: Option<&str>,
    ) -> BillingResult<()> {
        let payment_methods = PaymentMethodService::new(self.stripe.clone(), self.pool.clone());

        let mut chosen: Option<String> = None;

        if let Some(setup_intent) = &session.setup_intent {
            let setup_intent = match setup_intent {
                stripe::Expandable::Object(setup_intent) => *setup_intent.clone(),
                stripe::Expandable::Id(id) => {
                    SetupIntent::retrieve(self.stripe.inner(), id, &[]).await?
                }
            };
            chosen = setup_intent.payment_method.map(|pm| match pm {
                stripe::Expandable::Id(id) => id.to_string(),
                stripe::Expandable::Object(pm) => pm.id.to_string(),
            });
        }

        let customer_default = match customer_id {
            Some(customer_id) => payment_methods.customer_default(customer_id).await?,
            None => None,
        };

        if chosen.is_none() {
            chosen = customer_default.clone();
        }
        if chosen.is_none() {
            if let Some(customer_id) = customer_id {
                chosen = payment_methods.most_recent_card(customer_id).await?;
            }
        }

        let Some(payment_method_id) = chosen else {
            tracing::warn!(
                company_id = %company_id,
                session_id = %session.id,
                "Setup session completed without a discoverable payment method"
            );
            return Ok(());
        };

        // Push the chosen method back onto the customer so future invoices
        // use it, unless it already is their default.
        if let Some(customer_id) = customer_id {
            if customer_default.as_deref() != Some(&payment_method_id) {
                let parsed = customer_id.parse().map_err(|e| {
                    BillingError::StripeApi(format!("Invalid customer ID: {}", e))
                })?;
                let mut params = UpdateCustomer::default();
                params.invoice_settings = Some(stripe::CustomerInvoiceSettings {
                    default_payment_method: Some(payment_method_id.clone()),
                    ..Default::default()
                });
                stripe::Customer::update(self.stripe.inner(), &parsed, params).await?;
            }
        }

        self.state
            .set_default_payment_method(company_id, &payment_method_id)
            .await?;

        self.events
            .log_event_best_effort(
                BillingEventBuilder::new(company_id, BillingEventType::PaymentMethodUpdated)
                    .data(serde_json::json!({ "payment_method_id": payment_method_id }))
                    .stripe_event(session.id.to_string()),
            )
            .await;

        tracing::info!(
            company_id = %company_id,
            payment_method_id = %payment_method_id,
            "Captured default payment method from setup session"
        );

        Ok(())
    }

    /// Subscription created / updated / deleted: persist the observed
    /// identity and status; the managed-active flag is rederived on write.
    async fn handle_subscription_lifecycle(
        &self,
        event_id: &str,
        subscription: Subscription,
        audit_type: BillingEventType,
    ) -> BillingResult<Option<Uuid>> {
        let customer_id = match &subscription.customer {
            stripe::Expandable::Id(id) => id.to_string(),
            stripe::Expandable::Object(customer) => customer.id.to_string(),
        };
        let subscription_id = subscription.id.to_string();

        let resolved = self
            .resolve_company(
                Some(&subscription.metadata),
                Some(&customer_id),
                Some(&subscription_id),
            )
            .await?;

        let Some((company_id, source)) = resolved else {
            tracing::warn!(
                event_id = %event_id,
                subscription_id = %subscription_id,
                "Subscription event has no resolvable company, nothing to do"
            );
            return Ok(None);
        };

        let status = subscription.status.as_str().to_string();

        let record = self.state.load(company_id).await?;
        let mut fields = BillingFields::from(&record);
        fields.stripe_customer_id = Some(customer_id);
        fields.stripe_subscription_id = Some(subscription_id.clone());
        fields.subscription_status = Some(status.clone());
        fields.current_period_end =
            time::OffsetDateTime::from_unix_timestamp(subscription.current_period_end).ok();
        self.state.persist(company_id, &fields).await?;

        self.events
            .log_event_best_effort(
                BillingEventBuilder::new(company_id, audit_type)
                    .data(serde_json::json!({ "status": status }))
                    .stripe_event(event_id)
                    .stripe_subscription(&subscription_id),
            )
            .await;

        tracing::info!(
            event_id = %event_id,
            company_id = %company_id,
            company_source = source.as_str(),
            subscription_id = %subscription_id,
            status = %status,
            "Synced subscription lifecycle event"
        );

        Ok(Some(company_id))
    }

    /// Invoice paid / payment failed: move the observed subscription status
    async fn handle_invoice_status(
        &self,
        event_id: &str,
        invoice: Invoice,
        new_status: &str,
        audit_type: BillingEventType,
    ) -> BillingResult<Option<Uuid>> {
        let customer_id = invoice.customer.as_ref().map(|c| match c {
            stripe::Expandable::Id(id) => id.to_string(),
            stripe::Expandable::Object(customer) => customer.id.to_string(),
        });
        let subscription_id = invoice.subscription.as_ref().map(|s| match s {
            stripe::Expandable::Id(id) => id.to_string(),
            stripe::Expandable::Object(subscription) => subscription.id.to_string(),
        });

        let resolved = self
            .resolve_company(
                invoice.metadata.as_ref(),
                customer_id.as_deref(),
                subscription_id.as_deref(),
            )
            .await?;

        let Some((company_id, source)) = resolved else {
            tracing::warn!(
                event_id = %event_id,
                invoice_id = %invoice.id,
                "Invoice event has no resolvable company, nothing to do"
            );
            return Ok(None);
        };

        let record = self.state.load(company_id).await?;
        let mut fields = BillingFields::from(&record);
        fields.subscription_status = Some(new_status.to_string());
        self.state.persist(company_id, &fields).await?;

        self.events
            .log_event_best_effort(
                BillingEventBuilder::new(company_id, audit_type)
                    .data(serde_json::json!({
                        "invoice_id": invoice.id.to_string(),
                        "amount_due_cents": invoice.amount_due,
                        "amount_paid_cents": invoice.amount_paid,
                    }))
                    .stripe_event(event_id),
            )
            .await;

        tracing::info!(
            event_id = %event_id,
            company_id = %company_id,
            company_source = source.as_str(),
            invoice_id = %invoice.id,
            new_status = new_status,
            "Applied invoice event"
        );

        Ok(Some(company_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signature_header() {
        let (timestamp, v1) =
            parse_signature_header("t=1712000000,v1=deadbeef,v0=ignored").expect("parses");
        assert_eq!(timestamp, 1712000000);
        assert_eq!(v1, "deadbeef");
    }

    #[test]
    fn test_parse_signature_header_missing_parts() {
        assert!(parse_signature_header("t=1712000000").is_none());
        assert!(parse_signature_header("v1=deadbeef").is_none());
        assert!(parse_signature_header("garbage").is_none());
    }

    #[test]
    fn test_handled_event_types() {
        assert!(WebhookProcessor::handles(&EventType::CheckoutSessionCompleted));
        assert!(WebhookProcessor::handles(&EventType::CustomerSubscriptionUpdated));
        assert!(WebhookProcessor::handles(&EventType::InvoicePaid));
        assert!(WebhookProcessor::handles(&EventType::InvoicePaymentFailed));
        assert!(!WebhookProcessor::handles(&EventType::CustomerCreated));
        assert!(!WebhookProcessor::handles(&EventType::ChargeRefunded));
    }

    #[test]
    fn test_outcome_and_source_names() {
        assert_eq!(WebhookOutcome::Processed.as_str(), "processed");
        assert_eq!(WebhookOutcome::Duplicate.as_str(), "duplicate");
        assert_eq!(WebhookOutcome::Ignored.as_str(), "ignored");
        assert_eq!(WebhookOutcome::Failed.as_str(), "failed");

        assert_eq!(CompanySource::EventMetadata.as_str(), "event_metadata");
        assert_eq!(CompanySource::CustomerId.as_str(), "customer_id");
        assert_eq!(CompanySource::SubscriptionId.as_str(), "subscription_id");
    }
}
