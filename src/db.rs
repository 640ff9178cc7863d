//! SQLite connection setup.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;

use crate::config::Config;
use crate::engine::{Engine, EngineParams};
use crate::store::SqliteStore;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.engine.tree_concurrency.max(1) as u32 + 1)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Connects to the configured database and wraps it in an [`Engine`].
pub async fn open_engine(config: &Config) -> Result<Engine> {
    let pool = connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool));
    Ok(Engine::new(store, EngineParams::from_config(config)))
}
