//! # Sample Lifecycle Migrator
//!
//! Loads configuration for the current environment, connects to Postgres and applies
//! outstanding schema migrations.
//!
//! Usage: `sample-lifecycle-migrate [MIGRATIONS_DIR]` (default `migrations`).

use std::path::PathBuf;

use anyhow::Context;
use sample_lifecycle::config::ConfigManager;
use sample_lifecycle::database::{DatabaseConnection, DatabaseMigrations};
use sample_lifecycle::logging::init_structured_logging;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let migrations_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("migrations"));

    let manager = ConfigManager::load().context("loading configuration")?;
    info!(environment = %manager.environment(), "Configuration loaded");

    let db = DatabaseConnection::connect(&manager.config().database)
        .await
        .context("connecting to the database")?;
    if !db.health_check().await.context("database health check")? {
        anyhow::bail!("database health check returned an unexpected value");
    }

    let applied = DatabaseMigrations::run_all(db.pool(), &migrations_dir)
        .await
        .with_context(|| format!("applying migrations from {}", migrations_dir.display()))?;

    if applied.is_empty() {
        info!("Schema is up to date");
    } else {
        info!(versions = ?applied, "Migrations applied");
    }
    db.close().await;
    Ok(())
}
