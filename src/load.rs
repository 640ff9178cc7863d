//! Reference-data snapshot import.
//!
//! A snapshot is one JSON document carrying every reference table. Loading
//! replaces the previous contents in a single transaction, so readers see
//! either the old snapshot or the new one. Each load records the SHA-256
//! of the file; re-loading an identical file is a no-op unless forced.
//!
//! ```json
//! {
//!   "makes": [{ "id": 6, "name": "Ford" }],
//!   "models": [{ "id": 60, "name": "Taurus", "make_id": 6 }],
//!   "part_types": [{ "id": 1, "name": "Engine" }],
//!   "inventory": [{ "id": 1, "make_text": "Ford", "model_text": "Taurus",
//!                   "part_text": "Engine", "year_start": 2010, "year_end": 2015,
//!                   "interchange_number": "20011", "options": ["V6 3.5L"] }],
//!   "catalog": [],
//!   "model_cross_references": [],
//!   "part_code_references": []
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::models::{
    CatalogEntry, InventoryRecord, Make, Model, ModelCrossReference, PartCodeReference, PartType,
    MAX_OPTIONS,
};

/// Every reference table, as exported by the upstream extract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceSnapshot {
    #[serde(default)]
    pub makes: Vec<Make>,
    #[serde(default)]
    pub models: Vec<Model>,
    #[serde(default)]
    pub part_types: Vec<PartType>,
    #[serde(default)]
    pub inventory: Vec<InventoryRecord>,
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,
    #[serde(default)]
    pub model_cross_references: Vec<ModelCrossReference>,
    #[serde(default)]
    pub part_code_references: Vec<PartCodeReference>,
}

impl ReferenceSnapshot {
    pub fn from_json(content: &str) -> Result<Self> {
        let snapshot: ReferenceSnapshot =
            serde_json::from_str(content).with_context(|| "Failed to parse snapshot JSON")?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Structural checks. Data-quality problems the engine tolerates (bad
    /// year ranges, missing cross-references) are left alone.
    pub fn validate(&self) -> Result<()> {
        let make_ids = unique_ids("makes", self.makes.iter().map(|m| m.id))?;
        let model_ids = unique_ids("models", self.models.iter().map(|m| m.id))?;
        let part_ids = unique_ids("part_types", self.part_types.iter().map(|p| p.id))?;
        unique_ids("inventory", self.inventory.iter().map(|r| r.id))?;

        for model in &self.models {
            if !make_ids.contains(&model.make_id) {
                bail!(
                    "model {} ('{}') references unknown make {}",
                    model.id,
                    model.name,
                    model.make_id
                );
            }
        }

        for rec in &self.inventory {
            if rec.options.len() > MAX_OPTIONS {
                bail!(
                    "inventory {} has {} options (max {})",
                    rec.id,
                    rec.options.len(),
                    MAX_OPTIONS
                );
            }
            let dangling = rec.make_id.is_some_and(|id| !make_ids.contains(&id))
                || rec.model_id.is_some_and(|id| !model_ids.contains(&id))
                || rec.part_type_id.is_some_and(|id| !part_ids.contains(&id));
            if dangling {
                bail!("inventory {} references an unknown make, model, or part type", rec.id);
            }
        }

        let mut codes = HashSet::new();
        for pref in &self.part_code_references {
            if !codes.insert(pref.part_code.as_str()) {
                bail!("duplicate part code reference: {}", pref.part_code);
            }
        }

        Ok(())
    }
}

fn unique_ids(table: &str, ids: impl Iterator<Item = i64>) -> Result<HashSet<i64>> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            bail!("duplicate id {} in {}", id, table);
        }
    }
    Ok(seen)
}

/// What a load did.
#[derive(Debug, Clone, Serialize)]
pub struct LoadStats {
    pub digest: String,
    pub skipped: bool,
    pub makes: usize,
    pub models: usize,
    pub part_types: usize,
    pub inventory: usize,
    pub catalog: usize,
    pub model_cross_references: usize,
    pub part_code_references: usize,
}

/// Loads a snapshot file into the configured database.
pub async fn load_snapshot(config: &Config, path: &Path, force: bool) -> Result<LoadStats> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    let digest = hex::encode(Sha256::digest(content.as_bytes()));
    let snapshot = ReferenceSnapshot::from_json(&content)?;

    let pool = db::connect(config).await?;

    let mut stats = LoadStats {
        digest: digest.clone(),
        skipped: false,
        makes: snapshot.makes.len(),
        models: snapshot.models.len(),
        part_types: snapshot.part_types.len(),
        inventory: snapshot.inventory.len(),
        catalog: snapshot.catalog.len(),
        model_cross_references: snapshot.model_cross_references.len(),
        part_code_references: snapshot.part_code_references.len(),
    };

    let last: Option<String> =
        sqlx::query_scalar("SELECT digest FROM snapshot_loads ORDER BY id DESC LIMIT 1")
            .fetch_optional(&pool)
            .await?;
    if !force && last.as_deref() == Some(digest.as_str()) {
        tracing::info!(%digest, "snapshot already loaded, skipping");
        stats.skipped = true;
        pool.close().await;
        return Ok(stats);
    }

    replace_reference_data(&pool, &snapshot, &digest, path).await?;
    tracing::info!(
        %digest,
        makes = stats.makes,
        models = stats.models,
        inventory = stats.inventory,
        catalog = stats.catalog,
        "snapshot loaded"
    );

    pool.close().await;
    Ok(stats)
}

async fn replace_reference_data(
    pool: &SqlitePool,
    snapshot: &ReferenceSnapshot,
    digest: &str,
    path: &Path,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    for table in [
        "inventory",
        "models",
        "makes",
        "part_types",
        "catalog_entries",
        "model_cross_references",
        "part_code_references",
    ] {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *tx)
            .await?;
    }

    for make in &snapshot.makes {
        sqlx::query("INSERT INTO makes (id, name) VALUES (?, ?)")
            .bind(make.id)
            .bind(&make.name)
            .execute(&mut *tx)
            .await?;
    }

    for model in &snapshot.models {
        sqlx::query("INSERT INTO models (id, name, make_id) VALUES (?, ?, ?)")
            .bind(model.id)
            .bind(&model.name)
            .bind(model.make_id)
            .execute(&mut *tx)
            .await?;
    }

    for pt in &snapshot.part_types {
        sqlx::query("INSERT INTO part_types (id, name) VALUES (?, ?)")
            .bind(pt.id)
            .bind(&pt.name)
            .execute(&mut *tx)
            .await?;
    }

    for rec in &snapshot.inventory {
        let options_json = serde_json::to_string(&rec.options)?;
        sqlx::query(
            r#"
            INSERT INTO inventory (id, make_id, model_id, part_type_id, make_text, model_text,
                                   part_text, year_start, year_end, interchange_number, options_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(rec.id)
        .bind(rec.make_id)
        .bind(rec.model_id)
        .bind(rec.part_type_id)
        .bind(&rec.make_text)
        .bind(&rec.model_text)
        .bind(&rec.part_text)
        .bind(rec.year_start)
        .bind(rec.year_end)
        .bind(&rec.interchange_number)
        .bind(&options_json)
        .execute(&mut *tx)
        .await?;
    }

    for entry in &snapshot.catalog {
        sqlx::query(
            r#"
            INSERT INTO catalog_entries (legacy_ref_key, part_code, manufacturer_code,
                                         year_start, year_end)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.legacy_ref_key)
        .bind(&entry.part_code)
        .bind(&entry.manufacturer_code)
        .bind(entry.year_start)
        .bind(entry.year_end)
        .execute(&mut *tx)
        .await?;
    }

    for xref in &snapshot.model_cross_references {
        sqlx::query(
            r#"
            INSERT INTO model_cross_references (ref_id, legacy_make_code, legacy_make_name,
                                                legacy_model_name, canonical_make_hint,
                                                canonical_model_hint)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&xref.ref_id)
        .bind(&xref.legacy_make_code)
        .bind(&xref.legacy_make_name)
        .bind(&xref.legacy_model_name)
        .bind(&xref.canonical_make_hint)
        .bind(&xref.canonical_model_hint)
        .execute(&mut *tx)
        .await?;
    }

    for pref in &snapshot.part_code_references {
        sqlx::query(
            "INSERT INTO part_code_references (part_code, canonical_part_name_hint) VALUES (?, ?)",
        )
        .bind(&pref.part_code)
        .bind(&pref.canonical_part_name_hint)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("INSERT INTO snapshot_loads (digest, source_path, loaded_at) VALUES (?, ?, ?)")
        .bind(digest)
        .bind(path.display().to_string())
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// CLI entry point for `ixr load`.
pub async fn run_load(config: &Config, path: &Path, force: bool) -> Result<()> {
    let stats = load_snapshot(config, path, force).await?;

    if stats.skipped {
        println!("load {} (unchanged)", path.display());
        println!("  digest: {}", stats.digest);
        println!("ok");
        return Ok(());
    }

    println!("load {}", path.display());
    println!("  makes: {}", stats.makes);
    println!("  models: {}", stats.models);
    println!("  part types: {}", stats.part_types);
    println!("  inventory records: {}", stats.inventory);
    println!("  catalog entries: {}", stats.catalog);
    println!("  model cross-references: {}", stats.model_cross_references);
    println!("  part code references: {}", stats.part_code_references);
    println!("  digest: {}", stats.digest);
    println!("ok");
    Ok(())
}
