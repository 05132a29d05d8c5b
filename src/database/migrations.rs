//! # Schema Migrations
//!
//! Applies `migrations/<version>_<name>.sql` files in version order, recording each in
//! `sample_lifecycle_schema_migrations` so reruns only apply what is outstanding.
//!
//! A session-level advisory lock serialises concurrent runners (several service replicas
//! starting together); the loser waits on the lock and then finds nothing left to apply.

use sqlx::{PgPool, Row};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MIGRATION_TABLE: &str = "sample_lifecycle_schema_migrations";

/// Advisory lock key shared by every migration runner
const LOCK_KEY: i64 = 7_340_112_905_118_233;

/// Represents a single database migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Leading digits of the file name
    pub version: String,
    /// Human-readable migration name
    pub name: String,
    pub path: PathBuf,
}

pub struct DatabaseMigrations;

impl DatabaseMigrations {
    /// Apply every outstanding migration under `dir`; returns the versions applied
    pub async fn run_all(pool: &PgPool, dir: &Path) -> Result<Vec<String>, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(LOCK_KEY)
            .execute(&mut *conn)
            .await?;

        let result = Self::run_outstanding(pool, dir).await;

        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(LOCK_KEY)
            .execute(&mut *conn)
            .await?;
        result
    }

    async fn run_outstanding(pool: &PgPool, dir: &Path) -> Result<Vec<String>, sqlx::Error> {
        Self::ensure_migration_table(pool).await?;
        let migrations = Self::discover_migrations(dir)?;
        let applied = Self::get_applied_migrations(pool).await?;

        let mut newly_applied = Vec::new();
        for migration in migrations.values() {
            if applied.contains(&migration.version) {
                debug!(version = %migration.version, "Migration already applied");
                continue;
            }
            info!(version = %migration.version, name = %migration.name, "Applying migration");
            let sql = fs::read_to_string(&migration.path).map_err(sqlx::Error::Io)?;

            let mut tx = pool.begin().await?;
            sqlx::raw_sql(&sql).execute(&mut *tx).await?;
            sqlx::query(&format!(
                "INSERT INTO {MIGRATION_TABLE} (version, name) VALUES ($1, $2)"
            ))
            .bind(&migration.version)
            .bind(&migration.name)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            newly_applied.push(migration.version.clone());
        }
        Ok(newly_applied)
    }

    /// Migration files in `dir` keyed by version; a missing directory yields none
    pub fn discover_migrations(dir: &Path) -> Result<BTreeMap<String, Migration>, sqlx::Error> {
        if !dir.exists() {
            return Ok(BTreeMap::new());
        }

        let mut migrations = BTreeMap::new();
        for entry in fs::read_dir(dir).map_err(sqlx::Error::Io)? {
            let path = entry.map_err(sqlx::Error::Io)?.path();
            if !path.is_file() || !path.extension().map(|s| s == "sql").unwrap_or(false) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some((version, name)) = Self::parse_migration_filename(stem) {
                migrations.insert(
                    version.clone(),
                    Migration {
                        version,
                        name,
                        path,
                    },
                );
            }
        }
        Ok(migrations)
    }

    /// `0002_test_sample_mapping` -> `("0002", "test sample mapping")`
    fn parse_migration_filename(filename: &str) -> Option<(String, String)> {
        let (version, name) = filename.split_once('_')?;
        if version.is_empty() || !version.chars().all(|c| c.is_ascii_digit()) || name.is_empty() {
            return None;
        }
        Some((version.to_string(), name.replace('_', " ")))
    }

    async fn ensure_migration_table(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {MIGRATION_TABLE} (
                version VARCHAR(32) PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#
        ))
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn get_applied_migrations(pool: &PgPool) -> Result<HashSet<String>, sqlx::Error> {
        let rows = sqlx::query(&format!("SELECT version FROM {MIGRATION_TABLE}"))
            .fetch_all(pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>("version"))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_migration_filename() {
        assert_eq!(
            DatabaseMigrations::parse_migration_filename("0002_test_sample_mapping"),
            Some(("0002".to_string(), "test sample mapping".to_string()))
        );
        assert_eq!(DatabaseMigrations::parse_migration_filename("readme"), None);
        assert_eq!(DatabaseMigrations::parse_migration_filename("v1_samples"), None);
        assert_eq!(DatabaseMigrations::parse_migration_filename("0001_"), None);
    }

    #[test]
    fn test_discovery_orders_by_version_and_skips_other_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("0002_mappings.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("0001_samples.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let found = DatabaseMigrations::discover_migrations(dir.path()).unwrap();
        let versions: Vec<_> = found.keys().cloned().collect();
        assert_eq!(versions, vec!["0001", "0002"]);
        assert_eq!(found["0001"].name, "samples");
    }

    #[test]
    fn test_missing_directory_has_no_migrations() {
        let dir = TempDir::new().unwrap();
        let found = DatabaseMigrations::discover_migrations(&dir.path().join("absent")).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_shipped_migrations_are_discoverable() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        let found = DatabaseMigrations::discover_migrations(&dir).unwrap();
        assert!(found.len() >= 2);
    }
}
