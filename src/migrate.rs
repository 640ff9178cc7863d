use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Canonical taxonomy
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS makes (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS models (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            make_id INTEGER NOT NULL,
            FOREIGN KEY (make_id) REFERENCES makes(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS part_types (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Structured inventory; FKs stay NULL until the link pass fills them
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inventory (
            id INTEGER PRIMARY KEY,
            make_id INTEGER,
            model_id INTEGER,
            part_type_id INTEGER,
            make_text TEXT NOT NULL DEFAULT '',
            model_text TEXT NOT NULL DEFAULT '',
            part_text TEXT NOT NULL DEFAULT '',
            year_start INTEGER NOT NULL,
            year_end INTEGER NOT NULL,
            interchange_number TEXT NOT NULL,
            options_json TEXT NOT NULL DEFAULT '[]',
            FOREIGN KEY (make_id) REFERENCES makes(id),
            FOREIGN KEY (model_id) REFERENCES models(id),
            FOREIGN KEY (part_type_id) REFERENCES part_types(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Legacy catalog; joined to cross-references by string key only
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            legacy_ref_key TEXT NOT NULL,
            part_code TEXT NOT NULL,
            manufacturer_code TEXT NOT NULL DEFAULT '',
            year_start INTEGER NOT NULL,
            year_end INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_cross_references (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ref_id TEXT NOT NULL,
            legacy_make_code TEXT NOT NULL DEFAULT '',
            legacy_make_name TEXT NOT NULL DEFAULT '',
            legacy_model_name TEXT NOT NULL,
            canonical_make_hint TEXT NOT NULL DEFAULT '',
            canonical_model_hint TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS part_code_references (
            part_code TEXT PRIMARY KEY,
            canonical_part_name_hint TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Batch bookkeeping
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS batch_locks (
            name TEXT PRIMARY KEY,
            holder TEXT NOT NULL,
            acquired_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snapshot_loads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            digest TEXT NOT NULL,
            source_path TEXT NOT NULL,
            loaded_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS link_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            holder TEXT NOT NULL,
            updated INTEGER NOT NULL,
            finished_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_models_make_id ON models(make_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_inventory_vehicle ON inventory(make_id, model_id)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_catalog_ref_key ON catalog_entries(legacy_ref_key)",
    )
    .execute(&pool)
    .await?;

    pool.close().await;
    Ok(())
}
