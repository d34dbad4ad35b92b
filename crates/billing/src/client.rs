//! Stripe client configuration

use stripe::Client;

use crate::error::{BillingError, BillingResult};
use crate::policy::Sku;

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Stripe webhook signing secret
    pub webhook_secret: String,
    /// Price IDs for each billable SKU
    pub price_ids: SkuPriceIds,
}

/// Stripe price IDs for the billable SKUs.
///
/// Every SKU must resolve to exactly one price ID. All of these are required:
/// a missing or malformed value is a startup failure, never a runtime one.
#[derive(Debug, Clone)]
pub struct SkuPriceIds {
    /// Flat seat-base line (covers the first block of seats)
    pub seat_base: String,
    /// Per-seat overage beyond the seats covered by the base line
    pub seat_overage: String,
    /// Public website feature (flat, on/off)
    pub website: String,
    /// Per-enabled-community line
    pub community: String,
}

impl SkuPriceIds {
    /// Get the price ID for a SKU
    pub fn for_sku(&self, sku: Sku) -> &str {
        match sku {
            Sku::SeatBase => &self.seat_base,
            Sku::SeatOverage => &self.seat_overage,
            Sku::Website => &self.website,
            Sku::Community => &self.community,
        }
    }

    /// Map a Stripe price ID back to the SKU it bills.
    /// Returns None for line items this system does not manage.
    pub fn sku_for_price_id(&self, price_id: &str) -> Option<Sku> {
        if price_id == self.seat_base {
            Some(Sku::SeatBase)
        } else if price_id == self.seat_overage {
            Some(Sku::SeatOverage)
        } else if price_id == self.website {
            Some(Sku::Website)
        } else if price_id == self.community {
            Some(Sku::Community)
        } else {
            None
        }
    }
}

/// Read a required Stripe price ID from the environment
fn require_price_id(var: &str) -> BillingResult<String> {
    let value =
        std::env::var(var).map_err(|_| BillingError::Config(format!("{} not set", var)))?;
    if !value.starts_with("price_") {
        return Err(BillingError::Config(format!(
            "{} is not a Stripe price ID: {}",
            var, value
        )));
    }
    Ok(value)
}

impl BillingConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?,
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?,
            price_ids: SkuPriceIds {
                seat_base: require_price_id("STRIPE_PRICE_SEAT_BASE")?,
                seat_overage: require_price_id("STRIPE_PRICE_SEAT_OVERAGE")?,
                website: require_price_id("STRIPE_PRICE_WEBSITE")?,
                community: require_price_id("STRIPE_PRICE_COMMUNITY")?,
            },
        })
    }
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: BillingConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: BillingConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = BillingConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the config
    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    /// Get the configured price IDs
    pub fn price_ids(&self) -> &SkuPriceIds {
        &self.config.price_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_price_ids() -> SkuPriceIds {
        SkuPriceIds {
            seat_base: "price_base".to_string(),
            seat_overage: "price_overage".to_string(),
            website: "price_website".to_string(),
            community: "price_community".to_string(),
        }
    }

    #[test]
    fn test_price_id_round_trip() {
        let ids = test_price_ids();
        for sku in Sku::all() {
            assert_eq!(ids.sku_for_price_id(ids.for_sku(sku)), Some(sku));
        }
    }

    #[test]
    fn test_unmanaged_price_id() {
        let ids = test_price_ids();
        assert_eq!(ids.sku_for_price_id("price_someone_elses"), None);
    }
}
