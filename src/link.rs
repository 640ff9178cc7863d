//! Offline linking of structured inventory rows to canonical ids.
//!
//! Inventory rows arrive with raw `make_text` / `model_text` / `part_text`
//! and NULL foreign keys. The link pass walks every row with a NULL key and
//! proposes ids using [`link_text`]: exact name, then case-insensitive name,
//! then best token overlap. Only NULL columns are written; an existing link
//! is never replaced.
//!
//! The pass holds the `inventory_link` batch lock for its whole run so two
//! passes never interleave writes. The lock is released whether or not the
//! pass succeeds. A lock left behind by a crashed pass is taken over once it
//! is older than [`LinkOptions::lock_ttl`], or at once with `--break-lock`.
//! Every finished pass is recorded so a running server knows to drop its
//! caches.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use anyhow::{bail, Result};
use serde::Serialize;

use crate::config::Config;
use crate::db;
use crate::matching::{link_text, LinkMethod};
use crate::models::{Model, PartType};
use crate::store::{LinkUpdate, ReferenceStore, SqliteStore};

/// Name of the single-writer lock held by the pass.
pub const LINK_LOCK: &str = "inventory_link";

/// How a link pass treats an existing batch lock.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub lock_ttl: Duration,
    /// Remove any existing lock before acquiring.
    pub break_lock: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(3_600),
            break_lock: false,
        }
    }
}

impl LinkOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            lock_ttl: Duration::from_secs(config.link.lock_ttl_secs),
            break_lock: false,
        }
    }
}

/// Outcome of one link pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkStats {
    /// Rows that had at least one NULL foreign key.
    pub scanned: usize,
    /// Rows where at least one column was filled.
    pub updated: usize,
    pub makes_linked: usize,
    pub models_linked: usize,
    pub part_types_linked: usize,
    /// Rows still carrying a NULL foreign key afterwards.
    pub unresolved: usize,
    /// Links made, by method.
    pub by_method: BTreeMap<&'static str, usize>,
}

impl LinkStats {
    fn record(&mut self, method: LinkMethod) {
        *self.by_method.entry(method.as_str()).or_default() += 1;
    }
}

/// Runs one link pass over `store` under the batch lock.
pub async fn run_link_pass(store: &dyn ReferenceStore, options: &LinkOptions) -> Result<LinkStats> {
    let holder = format!("ixr-{}", std::process::id());
    if options.break_lock {
        tracing::warn!(lock = LINK_LOCK, "breaking batch lock on request");
        store.release_batch_lock(LINK_LOCK).await?;
    }
    if !store
        .acquire_batch_lock(LINK_LOCK, &holder, options.lock_ttl)
        .await?
    {
        bail!(
            "Another link pass holds the '{}' lock. Wait for it to finish, or pass --break-lock if it crashed.",
            LINK_LOCK
        );
    }
    tracing::info!(lock = LINK_LOCK, %holder, "link pass started");

    let mut outcome = link_rows(store).await;
    if let Ok(stats) = &outcome {
        if let Err(e) = store.record_link_run(&holder, stats.updated).await {
            outcome = Err(e);
        }
    }
    let released = store.release_batch_lock(LINK_LOCK).await;

    let stats = outcome?;
    released?;
    tracing::info!(
        scanned = stats.scanned,
        updated = stats.updated,
        unresolved = stats.unresolved,
        "link pass finished"
    );
    Ok(stats)
}

async fn link_rows(store: &dyn ReferenceStore) -> Result<LinkStats> {
    let makes = store.list_makes().await?;
    let part_types: Vec<PartType> = store.list_part_types().await?;
    let rows = store.unlinked_inventory().await?;

    let mut models_by_make: HashMap<i64, Vec<Model>> = HashMap::new();
    let mut stats = LinkStats {
        scanned: rows.len(),
        ..LinkStats::default()
    };

    for row in &rows {
        let mut update = LinkUpdate::default();

        let make_id = match row.make_id {
            Some(id) => Some(id),
            None => {
                let found = link_text(&row.make_text, makes.iter().map(|m| (m.id, m.name.as_str())));
                if let Some((id, method)) = found {
                    update.make_id = Some(id);
                    stats.makes_linked += 1;
                    stats.record(method);
                }
                update.make_id
            }
        };

        if row.model_id.is_none() {
            if let Some(make_id) = make_id {
                if !models_by_make.contains_key(&make_id) {
                    let models = store.list_models(make_id).await?;
                    models_by_make.insert(make_id, models);
                }
                let models = models_by_make.get(&make_id).map(Vec::as_slice).unwrap_or(&[]);
                let found =
                    link_text(&row.model_text, models.iter().map(|m| (m.id, m.name.as_str())));
                if let Some((id, method)) = found {
                    update.model_id = Some(id);
                    stats.models_linked += 1;
                    stats.record(method);
                }
            }
        }

        if row.part_type_id.is_none() {
            let found =
                link_text(&row.part_text, part_types.iter().map(|p| (p.id, p.name.as_str())));
            if let Some((id, method)) = found {
                update.part_type_id = Some(id);
                stats.part_types_linked += 1;
                stats.record(method);
            }
        }

        if !update.is_empty() && store.fill_inventory_links(row.id, update).await? {
            stats.updated += 1;
        }

        let still_null = (row.make_id.is_none() && update.make_id.is_none())
            || (row.model_id.is_none() && update.model_id.is_none())
            || (row.part_type_id.is_none() && update.part_type_id.is_none());
        if still_null {
            tracing::debug!(
                record = row.id,
                make_text = %row.make_text,
                model_text = %row.model_text,
                part_text = %row.part_text,
                "row left partially unlinked"
            );
            stats.unresolved += 1;
        }
    }

    Ok(stats)
}

/// CLI entry point for `ixr link`.
pub async fn run_link(config: &Config, break_lock: bool, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let options = LinkOptions {
        break_lock,
        ..LinkOptions::from_config(config)
    };
    let stats = run_link_pass(&store, &options).await;
    pool.close().await;
    let stats = stats?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("link inventory");
    println!("  scanned: {}", stats.scanned);
    println!("  updated: {}", stats.updated);
    println!("  makes linked: {}", stats.makes_linked);
    println!("  models linked: {}", stats.models_linked);
    println!("  part types linked: {}", stats.part_types_linked);
    for (method, count) in &stats.by_method {
        println!("    {}: {}", method, count);
    }
    println!("  unresolved: {}", stats.unresolved);
    println!("ok");
    Ok(())
}
