//! Database Migrations
//!
//! Migration utilities using refinery for tokio-postgres. Migration files
//! live in `migrations/` at the crate root and are embedded at compile time.

use anyhow::{Context, Result};
use deadpool_postgres::Pool;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Run all pending migrations
pub async fn run(pool: &Pool) -> Result<()> {
    let mut client = pool
        .get()
        .await
        .context("Failed to get connection for migrations")?;

    let report = embedded::migrations::runner()
        .run_async(&mut **client)
        .await
        .context("Failed to apply migrations")?;

    for migration in report.applied_migrations() {
        tracing::info!("📦 Applied migration {}", migration);
    }
    Ok(())
}
