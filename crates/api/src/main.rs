//! Clubgrid API Server
//!
//! Serves the billing boundary: Stripe webhook intake and admin billing
//! actions.

mod config;
mod error;
mod routes;
mod state;

use std::sync::Arc;

use clubgrid_billing::BillingService;
use clubgrid_shared::{create_pool, run_migrations};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{config::Config, routes::create_router, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,clubgrid_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Clubgrid API Server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection established");

    run_migrations(&pool).await?;
    tracing::info!("Migrations up to date");

    // Billing config is validated up front: a missing Stripe key or price ID
    // must fail startup, not the first reconciliation.
    let billing = BillingService::from_env(pool.clone())?;

    let state = AppState {
        pool,
        billing: Arc::new(billing),
    };

    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!(bind_address = %config.bind_address, "Listening");

    axum::serve(listener, router).await?;

    Ok(())
}
