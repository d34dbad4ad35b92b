//! Integration tests for webhook event claiming
//!
//! These verify the idempotency gate against a real PostgreSQL database:
//! exactly one claim wins per event id, duplicates are observed as such, and
//! failed events are re-claimable exactly once per redelivery.
//!
//! ## Running
//! ```bash
//! export DATABASE_URL="postgres://..."
//! cargo test -p clubgrid-billing -- --ignored
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use clubgrid_billing::webhooks::ClaimOutcome;
use clubgrid_billing::{BillingConfig, SkuPriceIds, StripeClient, WebhookProcessor};
use sqlx::PgPool;
use uuid::Uuid;

/// Claim tests never reach the Stripe API, so a placeholder config is fine
fn test_stripe_client() -> StripeClient {
    StripeClient::new(BillingConfig {
        secret_key: "sk_test_placeholder".to_string(),
        webhook_secret: "whsec_placeholder".to_string(),
        price_ids: SkuPriceIds {
            seat_base: "price_test_seat_base".to_string(),
            seat_overage: "price_test_seat_overage".to_string(),
            website: "price_test_website".to_string(),
            community: "price_test_community".to_string(),
        },
    })
}

async fn setup() -> (WebhookProcessor, PgPool) {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    let pool = clubgrid_shared::create_pool(&database_url)
        .await
        .expect("Failed to connect to test database");
    clubgrid_shared::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    (WebhookProcessor::new(test_stripe_client(), pool.clone()), pool)
}

fn unique_event_id() -> String {
    format!("evt_test_{}", Uuid::new_v4().simple())
}

async fn event_row(pool: &PgPool, event_id: &str) -> (String, i32, Option<String>) {
    sqlx::query_as(
        "SELECT status, attempts, last_error FROM stripe_webhook_events WHERE stripe_event_id = $1",
    )
    .bind(event_id)
    .fetch_one(pool)
    .await
    .expect("event row should exist")
}

async fn row_count(pool: &PgPool, event_id: &str) -> i64 {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM stripe_webhook_events WHERE stripe_event_id = $1",
    )
    .bind(event_id)
    .fetch_one(pool)
    .await
    .unwrap();
    count
}

#[tokio::test]
#[ignore] // Requires database
async fn test_first_claim_wins_second_observes_duplicate() {
    let (processor, pool) = setup().await;
    let event_id = unique_event_id();

    let first = processor
        .claim_event(&event_id, "invoice.paid")
        .await
        .unwrap();
    assert_eq!(first, ClaimOutcome::Claimed);

    let second = processor
        .claim_event(&event_id, "invoice.paid")
        .await
        .unwrap();
    assert_eq!(second, ClaimOutcome::Duplicate);

    assert_eq!(row_count(&pool, &event_id).await, 1);

    let (status, attempts, _) = event_row(&pool, &event_id).await;
    assert_eq!(status, "processing");
    assert_eq!(attempts, 1);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_concurrent_claims_have_exactly_one_winner() {
    let (processor, pool) = setup().await;
    let event_id = unique_event_id();

    let (a, b) = tokio::join!(
        processor.claim_event(&event_id, "invoice.paid"),
        processor.claim_event(&event_id, "invoice.paid"),
    );

    let outcomes = [a.unwrap(), b.unwrap()];
    let winners = outcomes
        .iter()
        .filter(|o| **o == ClaimOutcome::Claimed)
        .count();
    assert_eq!(winners, 1, "exactly one concurrent claim may win");
    assert_eq!(row_count(&pool, &event_id).await, 1);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_processed_event_stays_duplicate() {
    let (processor, pool) = setup().await;
    let event_id = unique_event_id();

    assert_eq!(
        processor
            .claim_event(&event_id, "customer.subscription.updated")
            .await
            .unwrap(),
        ClaimOutcome::Claimed
    );
    processor.mark_processed(&event_id, None).await.unwrap();

    assert_eq!(
        processor
            .claim_event(&event_id, "customer.subscription.updated")
            .await
            .unwrap(),
        ClaimOutcome::Duplicate
    );

    let (status, attempts, _) = event_row(&pool, &event_id).await;
    assert_eq!(status, "processed");
    assert_eq!(attempts, 1);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_failed_event_is_reclaimable_once_per_delivery() {
    let (processor, pool) = setup().await;
    let event_id = unique_event_id();

    assert_eq!(
        processor
            .claim_event(&event_id, "invoice.payment_failed")
            .await
            .unwrap(),
        ClaimOutcome::Claimed
    );
    processor
        .mark_failed(&event_id, "stripe timeout while loading invoice")
        .await
        .unwrap();

    let (status, attempts, last_error) = event_row(&pool, &event_id).await;
    assert_eq!(status, "failed");
    assert_eq!(attempts, 1);
    assert!(last_error.is_some());

    // Redelivery: re-claim succeeds, attempts increase, error clears
    assert_eq!(
        processor
            .claim_event(&event_id, "invoice.payment_failed")
            .await
            .unwrap(),
        ClaimOutcome::Claimed
    );

    let (status, attempts, last_error) = event_row(&pool, &event_id).await;
    assert_eq!(status, "processing");
    assert_eq!(attempts, 2);
    assert!(last_error.is_none());

    // While re-claimed, another delivery is a duplicate
    assert_eq!(
        processor
            .claim_event(&event_id, "invoice.payment_failed")
            .await
            .unwrap(),
        ClaimOutcome::Duplicate
    );

    assert_eq!(row_count(&pool, &event_id).await, 1);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_failure_message_is_truncated() {
    let (processor, pool) = setup().await;
    let event_id = unique_event_id();

    processor
        .claim_event(&event_id, "invoice.paid")
        .await
        .unwrap();
    let long_error = "x".repeat(clubgrid_billing::SYNC_MESSAGE_MAX_LEN * 3);
    processor.mark_failed(&event_id, &long_error).await.unwrap();

    let (_, _, last_error) = event_row(&pool, &event_id).await;
    let stored = last_error.unwrap();
    assert_eq!(stored.chars().count(), clubgrid_billing::SYNC_MESSAGE_MAX_LEN);
}
