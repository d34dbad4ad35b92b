//! Desired billable quantities
//!
//! Pure computation: policy + usage in, one non-negative quantity per SKU
//! out. No I/O and no side effects, so the same inputs always produce the
//! same quantities.

use serde::{Deserialize, Serialize};

use crate::policy::{AddonMode, BillingPolicy, SeatsMode, Sku};

/// Seats covered by the seat-base line before overage billing starts
pub const SEATS_INCLUDED_IN_BASE: i64 = 5;

/// Live usage counts for a company at reconciliation time.
/// Derived from counts owned by other subsystems; never persisted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub active_users: i64,
    pub website_enabled: bool,
    pub active_communities: i64,
}

/// Desired quantity per SKU, where 0 means "this line should not exist"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredQuantities {
    pub seat_base: u64,
    pub seat_overage: u64,
    pub website: u64,
    pub community: u64,
}

impl DesiredQuantities {
    pub fn get(&self, sku: Sku) -> u64 {
        match sku {
            Sku::SeatBase => self.seat_base,
            Sku::SeatOverage => self.seat_overage,
            Sku::Website => self.website,
            Sku::Community => self.community,
        }
    }

    /// Iterate SKUs with their desired quantities, in reconciliation order
    pub fn iter(&self) -> impl Iterator<Item = (Sku, u64)> + '_ {
        Sku::all().into_iter().map(move |sku| (sku, self.get(sku)))
    }

    /// True when at least one SKU is billable. Gates whether customer and
    /// subscription resolution run at all: a company with nothing billable
    /// never gets a Stripe customer created for it.
    pub fn should_use_external_billing(&self) -> bool {
        self.iter().any(|(_, quantity)| quantity > 0)
    }
}

/// Compute the desired quantity for every SKU from policy and usage
pub fn compute_desired_quantities(
    policy: &BillingPolicy,
    usage: &UsageSnapshot,
) -> DesiredQuantities {
    let (seat_base, seat_overage) = if policy.seats_mode == SeatsMode::Normal {
        let minimum = policy.minimum_seats.unwrap_or(0).max(0);
        let billed_seats = usage.active_users.max(minimum).max(0);
        let base = u64::from(billed_seats > 0);
        let overage = (billed_seats - SEATS_INCLUDED_IN_BASE).max(0) as u64;
        (base, overage)
    } else {
        // Waived and internal accounts bill no seats at all.
        (0, 0)
    };

    let website = u64::from(usage.website_enabled && policy.website_mode != AddonMode::Comped);

    let community = if policy.community_mode == AddonMode::Comped {
        0
    } else {
        usage.active_communities.max(0) as u64
    };

    DesiredQuantities {
        seat_base,
        seat_overage,
        website,
        community,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_seats_with_addons() {
        // 5 active users, website comped but active, communities normal
        let policy = BillingPolicy {
            website_mode: AddonMode::Comped,
            ..Default::default()
        };
        let usage = UsageSnapshot {
            active_users: 5,
            website_enabled: true,
            active_communities: 1,
        };

        let quantities = compute_desired_quantities(&policy, &usage);
        assert_eq!(quantities.seat_base, 1);
        assert_eq!(
            quantities.seat_overage,
            (5 - SEATS_INCLUDED_IN_BASE).max(0) as u64
        );
        assert_eq!(quantities.website, 0);
        assert_eq!(quantities.community, 1);
        assert!(quantities.should_use_external_billing());
    }

    #[test]
    fn test_waived_seats_bill_nothing_seat_related() {
        let policy = BillingPolicy {
            seats_mode: SeatsMode::Waived,
            ..Default::default()
        };
        let usage = UsageSnapshot {
            active_users: 40,
            website_enabled: false,
            active_communities: 0,
        };

        let quantities = compute_desired_quantities(&policy, &usage);
        assert_eq!(quantities.seat_base, 0);
        assert_eq!(quantities.seat_overage, 0);
        assert!(!quantities.should_use_external_billing());
    }

    #[test]
    fn test_seat_overage_above_included_block() {
        let usage = UsageSnapshot {
            active_users: 12,
            ..Default::default()
        };

        let quantities = compute_desired_quantities(&BillingPolicy::default(), &usage);
        assert_eq!(quantities.seat_base, 1);
        assert_eq!(quantities.seat_overage, 7);
    }

    #[test]
    fn test_minimum_seats_override() {
        let policy = BillingPolicy {
            minimum_seats: Some(10),
            ..Default::default()
        };
        let usage = UsageSnapshot {
            active_users: 3,
            ..Default::default()
        };

        let quantities = compute_desired_quantities(&policy, &usage);
        assert_eq!(quantities.seat_base, 1);
        assert_eq!(quantities.seat_overage, 5);
    }

    #[test]
    fn test_zero_usage_bills_nothing() {
        let quantities =
            compute_desired_quantities(&BillingPolicy::default(), &UsageSnapshot::default());
        for (_, quantity) in quantities.iter() {
            assert_eq!(quantity, 0);
        }
        assert!(!quantities.should_use_external_billing());
    }

    #[test]
    fn test_quantities_never_negative() {
        // Counts can never be negative, but defend against bad upstream data
        let policy = BillingPolicy {
            minimum_seats: Some(0),
            ..Default::default()
        };
        let usage = UsageSnapshot {
            active_users: -3,
            website_enabled: false,
            active_communities: -7,
        };

        let quantities = compute_desired_quantities(&policy, &usage);
        for (_, quantity) in quantities.iter() {
            assert_eq!(quantity, 0);
        }
    }

    #[test]
    fn test_comped_communities() {
        let policy = BillingPolicy {
            community_mode: AddonMode::Comped,
            ..Default::default()
        };
        let usage = UsageSnapshot {
            active_communities: 9,
            ..Default::default()
        };

        let quantities = compute_desired_quantities(&policy, &usage);
        assert_eq!(quantities.community, 0);
    }
}
