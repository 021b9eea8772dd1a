//! # DCA Engine
//!
//! Recurring token-purchase automation on Solana. Strategies live in
//! Postgres; a scheduler sweeps the due set every tick and buys through
//! either the token's bonding curve or the Jupiter aggregator, whichever
//! route the mint is on.
//!
//! ## Architecture
//! - `config`: environment variable configuration management
//! - `database`: connection pool, migrations, and the strategy store
//! - `math`: fixed-point unit conversion and bonding-curve formulas
//! - `services`: quoting, execution, scheduling, wallets, analytics
//! - `server` / `routes`: operational HTTP surface (`/ping`, `/health`)
//!
//! ## Environment Setup
//! ```bash
//! cp .env.example .env
//! # Edit .env with your database URL and RPC endpoint
//! ```
//!
//! ## Running
//! ```bash
//! cargo run
//! ```
//!
//! The health surface starts on `http://127.0.0.1:3000` by default.

mod config;
mod database;
mod error;
mod math;
mod routes;
mod server;
mod services;

use std::sync::Arc;

use anyhow::Context;
use solana_client::nonblocking::rpc_client::RpcClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::CONFIG;
use crate::database::connection::{DatabaseConfig, DatabaseConnection};
use crate::database::store::PostgresStore;
use crate::server::AppState;
use crate::services::{
    DcaScheduler, JupiterClient, RouteQuoter, RpcCurveProgram, RpcWalletProvider, TradeExecutor,
};

/// Application entry point.
///
/// Wires the pool, the trading services, and the scheduler together, then
/// serves the health surface until the process is terminated.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .compact(),
        )
        .init();

    tracing::info!(
        "🏁 Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let db_config = DatabaseConfig::from_url(&CONFIG.database.url)
        .context("Invalid DATABASE_URL")?
        .with_max_size(CONFIG.database.max_connections as usize);
    let db = Arc::new(
        DatabaseConnection::new(db_config)
            .await
            .context("Failed to connect to database")?,
    );
    db.migrate().await.context("Migrations failed")?;

    let store = Arc::new(PostgresStore::new(db.pool().clone()));
    let rpc = Arc::new(RpcClient::new(CONFIG.chain.rpc_url.clone()));

    let curve = Arc::new(RpcCurveProgram::new(rpc.clone())?);
    let aggregator = Arc::new(JupiterClient::new(rpc.clone())?);
    let quoter = Arc::new(RouteQuoter::new(curve.clone(), aggregator.clone()));
    let executor = Arc::new(TradeExecutor::new(quoter, curve, aggregator));
    let wallets = Arc::new(RpcWalletProvider::new(db.pool().clone(), rpc));

    let scheduler = Arc::new(DcaScheduler::new(store, executor, wallets));
    let ticker = scheduler.clone();
    tokio::spawn(async move { ticker.start().await });

    server::start(AppState { db, scheduler }).await
}
