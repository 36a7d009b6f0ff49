//! Marketplace Ledger - Main Application Entry Point
//!
//! REST API server for the marketplace wallet ledger: balances, checkout
//! settlement with partner and product referral commissions, withdrawals
//! and subscription tariffs.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx, accessed through `PgStore`
//! - **Authentication**: API key with SHA-256 hashing
//! - **Background work**: tariff billing sweep on a tokio interval
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Start the billing scheduler
//! 5. Build HTTP router with routes and middleware
//! 6. Start server on configured port

use std::{sync::Arc, time::Duration};

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post},
};
use marketplace_ledger::{
    config::Config,
    db,
    handlers::{self, AppState},
    middleware,
    services::billing_service::BillingScheduler,
    store::PgStore,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG, defaults to "info"
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let store = PgStore::new(pool, config.default_currency.clone());

    BillingScheduler::new(
        store.clone(),
        config.tariff_prices(),
        Duration::from_secs(config.billing_interval_secs),
    )
    .spawn();

    let addr = format!("0.0.0.0:{}", config.server_port);
    let state = AppState {
        store,
        config: Arc::new(config),
    };

    let authenticated_routes = Router::new()
        // Wallet
        .route("/api/v1/wallet", get(handlers::wallets::get_wallet))
        .route(
            "/api/v1/wallet/transactions",
            get(handlers::wallets::list_transactions),
        )
        .route("/api/v1/wallet/transfer", post(handlers::wallets::transfer))
        // Orders
        .route("/api/v1/orders", post(handlers::orders::create_order))
        .route("/api/v1/orders/{id}", get(handlers::orders::get_order))
        .route(
            "/api/v1/orders/{id}/status",
            patch(handlers::orders::update_order_status),
        )
        // Withdrawals
        .route(
            "/api/v1/withdrawals",
            post(handlers::withdrawals::request_withdrawal)
                .get(handlers::withdrawals::list_withdrawals),
        )
        // Tariffs
        .route("/api/v1/tariffs", post(handlers::tariffs::purchase_tariff))
        // Admin (handlers check the admin flag)
        .route(
            "/api/v1/admin/wallets/{user_id}/topup",
            post(handlers::wallets::topup),
        )
        .route(
            "/api/v1/admin/withdrawals/{id}/approve",
            post(handlers::withdrawals::approve_withdrawal),
        )
        .route(
            "/api/v1/admin/withdrawals/{id}/reject",
            post(handlers::withdrawals::reject_withdrawal),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(authenticated_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
