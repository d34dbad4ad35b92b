//! Integration tests for the billing state store
//!
//! Verify the diff-only write path and the derived managed-active flag
//! against a real PostgreSQL database.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use clubgrid_billing::{BillingFields, BillingStateStore};
use sqlx::PgPool;
use uuid::Uuid;

async fn setup() -> (BillingStateStore, PgPool) {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    let pool = clubgrid_shared::create_pool(&database_url)
        .await
        .expect("Failed to connect to test database");
    clubgrid_shared::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    (BillingStateStore::new(pool.clone()), pool)
}

async fn create_company(pool: &PgPool) -> Uuid {
    let company_id = Uuid::new_v4();
    sqlx::query("INSERT INTO companies (id, name) VALUES ($1, $2)")
        .bind(company_id)
        .bind(format!("Test Company {}", company_id))
        .execute(pool)
        .await
        .expect("Failed to create test company");
    company_id
}

#[tokio::test]
#[ignore] // Requires database
async fn test_persist_writes_only_on_change() {
    let (store, pool) = setup().await;
    let company_id = create_company(&pool).await;

    let fields = BillingFields {
        stripe_customer_id: Some("cus_test_1".to_string()),
        stripe_subscription_id: Some("sub_test_1".to_string()),
        subscription_status: Some("active".to_string()),
        ..Default::default()
    };

    let wrote = store.persist(company_id, &fields).await.unwrap();
    assert!(wrote, "first persist must write");

    let wrote_again = store.persist(company_id, &fields).await.unwrap();
    assert!(!wrote_again, "identical persist must not write");

    let record = store.load(company_id).await.unwrap();
    assert_eq!(record.stripe_customer_id.as_deref(), Some("cus_test_1"));
    assert_eq!(record.subscription_status.as_deref(), Some("active"));
}

#[tokio::test]
#[ignore] // Requires database
async fn test_managed_active_is_always_derived() {
    let (store, pool) = setup().await;
    let company_id = create_company(&pool).await;

    let mut fields = BillingFields {
        stripe_subscription_id: Some("sub_test_2".to_string()),
        subscription_status: Some("active".to_string()),
        ..Default::default()
    };
    store.persist(company_id, &fields).await.unwrap();
    assert!(store.load(company_id).await.unwrap().managed_active);

    // A terminal status flips the derived flag off on the same write path
    fields.subscription_status = Some("canceled".to_string());
    store.persist(company_id, &fields).await.unwrap();
    assert!(!store.load(company_id).await.unwrap().managed_active);

    // Clearing the subscription id does too, whatever the status says
    fields.subscription_status = Some("active".to_string());
    fields.stripe_subscription_id = None;
    store.persist(company_id, &fields).await.unwrap();
    assert!(!store.load(company_id).await.unwrap().managed_active);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_sync_status_is_recorded_and_truncated() {
    let (store, pool) = setup().await;
    let company_id = create_company(&pool).await;

    store
        .record_sync_status(company_id, "error", Some(&"e".repeat(2000)))
        .await
        .unwrap();

    let record = store.load(company_id).await.unwrap();
    assert_eq!(record.last_sync_status.as_deref(), Some("error"));
    assert!(record.last_sync_at.is_some());
    assert_eq!(
        record.last_sync_message.unwrap().chars().count(),
        clubgrid_billing::SYNC_MESSAGE_MAX_LEN
    );
}
