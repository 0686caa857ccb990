//! Database connection and pool management for the connector registry.
//!
//! This module initializes the SeaORM connection pool (Postgres in production,
//! SQLite for local runs and tests) and applies schema migrations.

use anyhow::{Context, Result};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::AppConfig;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {source}")]
    ConnectionFailed {
        #[from]
        source: sea_orm::DbErr,
    },
    #[error("Database connection timeout after {timeout_ms}ms")]
    ConnectionTimeout { timeout_ms: u64 },
    #[error("Invalid database configuration: {message}")]
    InvalidConfiguration { message: String },
}

/// Direction for [`run_migrations`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    Up,
    Down,
}

/// Initializes a database connection pool with the given configuration.
///
/// Transient connection failures are retried with exponential backoff.
///
/// ```no_run
/// use connector_registry::{config::AppConfig, db::init_pool};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = AppConfig::default();
///     let db = init_pool(&config).await?;
///     Ok(())
/// }
/// ```
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection> {
    if cfg.database_url.is_empty() {
        return Err(DatabaseError::InvalidConfiguration {
            message: "Database URL cannot be empty".to_string(),
        }
        .into());
    }

    let mut opt = ConnectOptions::new(&cfg.database_url);
    opt.max_connections(cfg.db_max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let max_retries = 5;
    let mut retry_delay = Duration::from_millis(100);

    for attempt in 1..=max_retries {
        match Database::connect(opt.clone()).await {
            Ok(conn) => {
                tracing::info!(attempt, "Connected to database");
                return Ok(conn);
            }
            Err(e) => {
                if attempt == max_retries {
                    tracing::error!(
                        "Failed to connect to database after {} attempts: {}",
                        max_retries,
                        e
                    );
                    return Err(DatabaseError::ConnectionFailed { source: e }.into());
                }

                tracing::warn!(
                    "Database connection attempt {} failed: {}, retrying in {:?}",
                    attempt,
                    e,
                    retry_delay
                );

                sleep(retry_delay).await;
                retry_delay *= 2;
            }
        }
    }

    Err(DatabaseError::ConnectionTimeout {
        timeout_ms: cfg.db_acquire_timeout_ms,
    }
    .into())
}

/// Verifies the connection is alive. A disconnected handle reports an error.
pub async fn health_check(db: &DatabaseConnection) -> Result<()> {
    db.ping().await.context("Database health check failed")?;

    Ok(())
}

/// Applies (or reverts) every migration.
pub async fn run_migrations(db: &DatabaseConnection, direction: MigrationDirection) -> Result<()> {
    match direction {
        MigrationDirection::Up => Migrator::up(db, None)
            .await
            .context("Failed to apply migrations")?,
        MigrationDirection::Down => Migrator::down(db, None)
            .await
            .context("Failed to revert migrations")?,
    }

    tracing::info!(?direction, "Migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_invalid_database_url() {
        let mut config = AppConfig::default();
        config.database_url = "".to_string();

        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(init_pool(&config));

        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err().downcast::<DatabaseError>(),
            Ok(DatabaseError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn test_health_check_on_sqlite() {
        let db = init_pool(&sqlite_config()).await.unwrap();
        health_check(&db).await.unwrap();
    }

    #[tokio::test]
    async fn test_health_check_fails_when_disconnected() {
        let db = DatabaseConnection::default();
        assert!(health_check(&db).await.is_err());
    }

    #[tokio::test]
    async fn test_migrations_up_and_down() {
        let db = init_pool(&sqlite_config()).await.unwrap();

        run_migrations(&db, MigrationDirection::Up).await.unwrap();
        let applied = Migrator::get_applied_migrations(&db).await.unwrap();
        assert_eq!(applied.len(), 1);

        run_migrations(&db, MigrationDirection::Down).await.unwrap();
        let applied = Migrator::get_applied_migrations(&db).await.unwrap();
        assert!(applied.is_empty());
    }
}
