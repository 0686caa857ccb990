//! Test utilities for database testing.
//!
//! This module provides utilities for setting up SQLite databases with
//! migrations for testing purposes: a single-connection in-memory database and
//! a file-backed one shared by several pooled connections.

use anyhow::Result;
use connector_registry::repositories::{ConnectorRepository, CreateConnector};
use connector_registry::models::connector::Model as ConnectorModel;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde_json::json;
use tempfile::TempDir;

/// Sets up an in-memory SQLite database with all migrations applied.
///
/// The pool is pinned to one connection: every connection to `sqlite::memory:`
/// opens its own private database.
#[allow(dead_code)]
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await?;

    Migrator::up(&db, None).await?;

    Ok(db)
}

/// Sets up a file-backed SQLite database behind a pool of `max_connections`,
/// so concurrent tasks really do race on separate connections.
///
/// The returned directory owns the database file and must outlive the pool.
#[allow(dead_code)]
pub async fn setup_pooled_test_db(max_connections: u32) -> Result<(TempDir, DatabaseConnection)> {
    let dir = TempDir::new()?;
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("registry.db").display()
    );

    let mut options = ConnectOptions::new(url);
    options.max_connections(max_connections).sqlx_logging(false);
    let db = Database::connect(options).await?;

    Migrator::up(&db, None).await?;

    Ok((dir, db))
}

/// Creates a connector with placeholder source/target values.
#[allow(dead_code)]
pub async fn create_test_connector(db: &DatabaseConnection, name: &str) -> Result<ConnectorModel> {
    let connector = ConnectorRepository::new(db)
        .create(CreateConnector {
            name: name.to_string(),
            source: "tap-github".to_string(),
            target: "target-postgres".to_string(),
            configuration: Some(json!({ "repository": "org/repo" })),
        })
        .await?;

    Ok(connector)
}
