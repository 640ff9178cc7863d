//! SQLite-backed [`ReferenceStore`] implementation.
//!
//! Maps each trait method onto the schema created by
//! [`migrate::run_migrations`](crate::migrate::run_migrations). Name
//! matching stays in Rust: SQLite's `lower()` and `trim()` are ASCII-only
//! and never collapse internal whitespace, so SQL filters only on ids and
//! NULLs, never on text.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::matching::{match_kind, normalize};
use crate::models::{
    CatalogEntry, InventoryRecord, Make, Model, ModelCrossReference, PartCodeReference, PartType,
};

use super::{belongs_to, DataVersion, LinkUpdate, ReferenceStore};

/// SQLite implementation of the [`ReferenceStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const INVENTORY_COLUMNS: &str = "id, make_id, model_id, part_type_id, make_text, model_text, \
     part_text, year_start, year_end, interchange_number, options_json";

const CATALOG_COLUMNS: &str = "legacy_ref_key, part_code, manufacturer_code, year_start, year_end";

fn inventory_from_row(row: &SqliteRow) -> Result<InventoryRecord> {
    let id: i64 = row.get("id");
    let options_json: String = row.get("options_json");
    let options: Vec<String> = serde_json::from_str(&options_json)
        .with_context(|| format!("Corrupt options_json on inventory row {}", id))?;
    Ok(InventoryRecord {
        id: row.get("id"),
        make_id: row.get("make_id"),
        model_id: row.get("model_id"),
        part_type_id: row.get("part_type_id"),
        make_text: row.get("make_text"),
        model_text: row.get("model_text"),
        part_text: row.get("part_text"),
        year_start: row.get("year_start"),
        year_end: row.get("year_end"),
        interchange_number: row.get("interchange_number"),
        options,
    })
}

fn inventory_from_rows(rows: &[SqliteRow]) -> Result<Vec<InventoryRecord>> {
    rows.iter().map(inventory_from_row).collect()
}

fn catalog_from_row(row: &SqliteRow) -> CatalogEntry {
    CatalogEntry {
        legacy_ref_key: row.get("legacy_ref_key"),
        part_code: row.get("part_code"),
        manufacturer_code: row.get("manufacturer_code"),
        year_start: row.get("year_start"),
        year_end: row.get("year_end"),
    }
}

fn model_from_row(row: &SqliteRow) -> Model {
    Model {
        id: row.get("id"),
        name: row.get("name"),
        make_id: row.get("make_id"),
    }
}

#[async_trait]
impl ReferenceStore for SqliteStore {
    async fn list_makes(&self) -> Result<Vec<Make>> {
        let rows = sqlx::query("SELECT id, name FROM makes ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| Make {
                id: r.get("id"),
                name: r.get("name"),
            })
            .collect())
    }

    async fn get_make(&self, id: i64) -> Result<Option<Make>> {
        let row = sqlx::query("SELECT id, name FROM makes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Make {
            id: r.get("id"),
            name: r.get("name"),
        }))
    }

    async fn list_models(&self, make_id: i64) -> Result<Vec<Model>> {
        let rows =
            sqlx::query("SELECT id, name, make_id FROM models WHERE make_id = ? ORDER BY name, id")
                .bind(make_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.iter().map(model_from_row).collect())
    }

    async fn get_model(&self, id: i64) -> Result<Option<Model>> {
        let row = sqlx::query("SELECT id, name, make_id FROM models WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(model_from_row))
    }

    async fn list_part_types(&self) -> Result<Vec<PartType>> {
        let rows = sqlx::query("SELECT id, name FROM part_types ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| PartType {
                id: r.get("id"),
                name: r.get("name"),
            })
            .collect())
    }

    async fn inventory_for_vehicle(
        &self,
        make: &Make,
        model: &Model,
    ) -> Result<Vec<InventoryRecord>> {
        let sql = format!(
            r#"
            SELECT {INVENTORY_COLUMNS}
            FROM inventory
            WHERE (make_id = ?1 OR make_id IS NULL)
              AND (model_id = ?2 OR model_id IS NULL)
            ORDER BY id
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(make.id)
            .bind(model.id)
            .fetch_all(&self.pool)
            .await?;

        Ok(inventory_from_rows(&rows)?
            .into_iter()
            .filter(|r| belongs_to(r, make, model))
            .collect())
    }

    async fn models_with_inventory(&self, make: &Make) -> Result<BTreeSet<i64>> {
        let models = self.list_models(make.id).await?;
        let sql = format!(
            r#"
            SELECT {INVENTORY_COLUMNS}
            FROM inventory
            WHERE make_id = ?1 OR make_id IS NULL
            ORDER BY id
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(make.id)
            .fetch_all(&self.pool)
            .await?;
        let rows = inventory_from_rows(&rows)?;

        Ok(models
            .iter()
            .filter(|m| rows.iter().any(|r| belongs_to(r, make, m)))
            .map(|m| m.id)
            .collect())
    }

    async fn cross_reference_candidates(
        &self,
        model_name: &str,
    ) -> Result<Vec<ModelCrossReference>> {
        let needle = normalize(model_name);
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT ref_id, legacy_make_code, legacy_make_name, legacy_model_name,
                   canonical_make_hint, canonical_model_hint
            FROM model_cross_references
            ORDER BY ref_id, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| ModelCrossReference {
                ref_id: r.get("ref_id"),
                legacy_make_code: r.get("legacy_make_code"),
                legacy_make_name: r.get("legacy_make_name"),
                legacy_model_name: r.get("legacy_model_name"),
                canonical_make_hint: r.get("canonical_make_hint"),
                canonical_model_hint: r.get("canonical_model_hint"),
            })
            .filter(|x| match_kind(&needle, &normalize(&x.legacy_model_name)).is_some())
            .collect())
    }

    async fn catalog_entries(&self, ref_key: &str) -> Result<Vec<CatalogEntry>> {
        let sql = format!(
            "SELECT {CATALOG_COLUMNS} FROM catalog_entries WHERE legacy_ref_key = ? ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(ref_key)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(catalog_from_row).collect())
    }

    async fn catalog_entries_with_key_token(&self, token: &str) -> Result<Vec<CatalogEntry>> {
        if token.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {CATALOG_COLUMNS} FROM catalog_entries WHERE instr(legacy_ref_key, ?) > 0 ORDER BY id"
        );
        let rows = sqlx::query(&sql).bind(token).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(catalog_from_row).collect())
    }

    async fn part_code_reference(&self, part_code: &str) -> Result<Option<PartCodeReference>> {
        let row = sqlx::query(
            "SELECT part_code, canonical_part_name_hint FROM part_code_references WHERE part_code = ?",
        )
        .bind(part_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| PartCodeReference {
            part_code: r.get("part_code"),
            canonical_part_name_hint: r.get("canonical_part_name_hint"),
        }))
    }

    async fn unlinked_inventory(&self) -> Result<Vec<InventoryRecord>> {
        let sql = format!(
            r#"
            SELECT {INVENTORY_COLUMNS}
            FROM inventory
            WHERE make_id IS NULL OR model_id IS NULL OR part_type_id IS NULL
            ORDER BY id
            "#
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        inventory_from_rows(&rows)
    }

    async fn fill_inventory_links(&self, record_id: i64, update: LinkUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(false);
        }
        let result = sqlx::query(
            r#"
            UPDATE inventory SET
                make_id = COALESCE(make_id, ?2),
                model_id = COALESCE(model_id, ?3),
                part_type_id = COALESCE(part_type_id, ?4)
            WHERE id = ?1
              AND ((make_id IS NULL AND ?2 IS NOT NULL)
                   OR (model_id IS NULL AND ?3 IS NOT NULL)
                   OR (part_type_id IS NULL AND ?4 IS NOT NULL))
            "#,
        )
        .bind(record_id)
        .bind(update.make_id)
        .bind(update.model_id)
        .bind(update.part_type_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn acquire_batch_lock(
        &self,
        name: &str,
        holder: &str,
        stale_after: Duration,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let cutoff = now - stale_after.as_secs() as i64;
        let result = sqlx::query(
            r#"
            INSERT INTO batch_locks (name, holder, acquired_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = excluded.acquired_at
            WHERE batch_locks.acquired_at <= ?4
            "#,
        )
        .bind(name)
        .bind(holder)
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_batch_lock(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM batch_locks WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_link_run(&self, holder: &str, updated: usize) -> Result<()> {
        sqlx::query("INSERT INTO link_runs (holder, updated, finished_at) VALUES (?, ?, ?)")
            .bind(holder)
            .bind(updated as i64)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn data_version(&self) -> Result<DataVersion> {
        let row = sqlx::query(
            r#"
            SELECT (SELECT COALESCE(MAX(id), 0) FROM snapshot_loads) AS snapshot,
                   (SELECT COALESCE(MAX(id), 0) FROM link_runs) AS link
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(DataVersion {
            snapshot: row.get("snapshot"),
            link: row.get("link"),
        })
    }
}
