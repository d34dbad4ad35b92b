//! Billing policy and billable SKUs
//!
//! The billing policy is per company and admin-edited elsewhere; this module
//! only reads it. Policy modes can make seats or individual add-ons
//! non-billable regardless of actual usage.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;

/// A billable line item kind, one per SKU on the subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sku {
    /// Flat base line, present whenever any seats are billed
    SeatBase,
    /// Per-seat overage beyond the seats covered by the base line
    SeatOverage,
    /// Public website feature (on/off)
    Website,
    /// One unit per enabled community
    Community,
}

impl Sku {
    /// All SKUs, in the order they are reconciled
    pub fn all() -> [Self; 4] {
        [Self::SeatBase, Self::SeatOverage, Self::Website, Self::Community]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SeatBase => "seat_base",
            Self::SeatOverage => "seat_overage",
            Self::Website => "website",
            Self::Community => "community",
        }
    }
}

impl std::fmt::Display for Sku {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How seats are billed for a company
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatsMode {
    /// Seats billed from usage
    #[default]
    Normal,
    /// Seats waived by an admin; nothing seat-related is billed
    Waived,
    /// Internal account (staff, demos); nothing seat-related is billed
    Internal,
}

impl SeatsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Waived => "waived",
            Self::Internal => "internal",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Self::Normal),
            "waived" => Some(Self::Waived),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

/// How an individual add-on is billed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddonMode {
    /// Billed when active
    #[default]
    Normal,
    /// Never billed, even while active
    Comped,
}

impl AddonMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Comped => "comped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Self::Normal),
            "comped" => Some(Self::Comped),
            _ => None,
        }
    }
}

/// Per-company billing policy, read-only to the reconciler
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BillingPolicy {
    pub seats_mode: SeatsMode,
    pub website_mode: AddonMode,
    pub community_mode: AddonMode,
    /// Bill at least this many seats regardless of active users
    pub minimum_seats: Option<i64>,
}

impl BillingPolicy {
    /// Non-normal seat modes block self-serve billing entirely
    pub fn self_serve_blocked(&self) -> bool {
        self.seats_mode != SeatsMode::Normal
    }
}

/// Load the billing policy for a company. A missing row means all defaults.
pub async fn load_policy(pool: &PgPool, company_id: Uuid) -> BillingResult<BillingPolicy> {
    let row: Option<(String, String, String, Option<i64>)> = sqlx::query_as(
        r#"
        SELECT seats_mode, website_mode, community_mode, minimum_seats
        FROM billing_policies
        WHERE company_id = $1
        "#,
    )
    .bind(company_id)
    .fetch_optional(pool)
    .await?;

    let Some((seats_mode, website_mode, community_mode, minimum_seats)) = row else {
        return Ok(BillingPolicy::default());
    };

    // Unknown stored modes fall back to the billable default rather than
    // silently comping an account.
    Ok(BillingPolicy {
        seats_mode: SeatsMode::from_str(&seats_mode).unwrap_or_default(),
        website_mode: AddonMode::from_str(&website_mode).unwrap_or_default(),
        community_mode: AddonMode::from_str(&community_mode).unwrap_or_default(),
        minimum_seats: minimum_seats.map(|m| m.max(0)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sku_as_str() {
        assert_eq!(Sku::SeatBase.as_str(), "seat_base");
        assert_eq!(Sku::SeatOverage.as_str(), "seat_overage");
        assert_eq!(Sku::Website.as_str(), "website");
        assert_eq!(Sku::Community.as_str(), "community");
    }

    #[test]
    fn test_seats_mode_round_trip() {
        for mode in [SeatsMode::Normal, SeatsMode::Waived, SeatsMode::Internal] {
            assert_eq!(SeatsMode::from_str(mode.as_str()), Some(mode));
        }
        assert_eq!(SeatsMode::from_str("nonsense"), None);
    }

    #[test]
    fn test_self_serve_blocked() {
        assert!(!BillingPolicy::default().self_serve_blocked());

        let waived = BillingPolicy {
            seats_mode: SeatsMode::Waived,
            ..Default::default()
        };
        assert!(waived.self_serve_blocked());
    }
}
