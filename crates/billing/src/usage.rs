//! Usage snapshot loading
//!
//! Reads the authoritative counts owned by other subsystems (user directory,
//! feature flags, communities) into a [`UsageSnapshot`]. Read-only.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::quantities::UsageSnapshot;

/// Load the live usage counts for a company
pub async fn load_usage_snapshot(pool: &PgPool, company_id: Uuid) -> BillingResult<UsageSnapshot> {
    let row: Option<(i64, bool, i64)> = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users u
             WHERE u.company_id = c.id AND u.status = 'active') AS active_users,
            c.website_enabled,
            (SELECT COUNT(*) FROM communities m
             WHERE m.company_id = c.id AND m.enabled) AS active_communities
        FROM companies c
        WHERE c.id = $1
        "#,
    )
    .bind(company_id)
    .fetch_optional(pool)
    .await?;

    let (active_users, website_enabled, active_communities) =
        row.ok_or_else(|| BillingError::CompanyNotFound(company_id.to_string()))?;

    Ok(UsageSnapshot {
        active_users,
        website_enabled,
        active_communities,
    })
}
