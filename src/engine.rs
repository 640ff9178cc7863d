//! Interchange resolution engine.
//!
//! The engine answers the four questions a cascading Make → Model → Year →
//! Part picker asks, plus the bulk tree used to pre-fetch a whole make.
//! Every answer is built from two sources consulted in a fixed order:
//!
//! 1. the **structured inventory**, keyed by canonical ids (or raw text
//!    while unlinked), which carries interchange numbers and options;
//! 2. the **legacy catalog**, reached by resolving the model to a legacy
//!    reference key and the legacy part codes back to canonical part types.
//!
//! "Nothing found" is always [`Lookup::NoData`], never an error and never a
//! widened fallback list. Only store failures, timeouts, and cancellation
//! surface as [`EngineError`].
//!
//! The engine holds no request state. Clones share the store and caches, so
//! an `Engine` can be handed to each request or spawned task.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::matching::{self, clamp_range, range_contains};
use crate::models::{
    AvailablePart, CatalogEntry, InterchangeResult, InventoryRecord, Lookup, Make, Model,
    ModelSummary, ModelTree, PartType, ResolvedReference, Source, VehicleTree, YearParts,
    CATALOG_ONLY_MESSAGE,
};
use crate::observability::lookup_span;
use crate::store::{DataVersion, ReferenceStore};

/// Engine tuning, decoupled from the TOML config.
#[derive(Debug, Clone)]
pub struct EngineParams {
    pub year_min: i32,
    pub year_max: i32,
    pub parts_limit: usize,
    pub tree_years: usize,
    pub tree_concurrency: usize,
    pub tree_model_timeout: Duration,
    pub store_timeout: Duration,
    pub numeric_token_fallback: bool,
    pub cache_enabled: bool,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self::from_config(&Config::minimal())
    }
}

impl EngineParams {
    pub fn from_config(config: &Config) -> Self {
        let e = &config.engine;
        Self {
            year_min: e.year_min,
            year_max: e.year_max,
            parts_limit: e.parts_limit,
            tree_years: e.tree_years,
            tree_concurrency: e.tree_concurrency,
            tree_model_timeout: Duration::from_millis(e.tree_model_timeout_ms),
            store_timeout: Duration::from_millis(e.store_timeout_ms),
            numeric_token_fallback: e.numeric_token_fallback,
            cache_enabled: config.cache.enabled,
        }
    }

    fn year_in_bounds(&self, year: i32) -> bool {
        (self.year_min..=self.year_max).contains(&year)
    }
}

type VehicleKey = (i64, i64);
type PartsKey = (i64, i64, i32);
type ResolveKey = (i32, i64, i64, i64);

/// Memoized answers. Valid until the reference data is reloaded or relinked.
#[derive(Default)]
struct Caches {
    part_types: RwLock<Option<Arc<Vec<PartType>>>>,
    references: RwLock<HashMap<i64, Option<ResolvedReference>>>,
    part_codes: RwLock<HashMap<String, Option<PartType>>>,
    years: RwLock<HashMap<VehicleKey, Vec<i32>>>,
    parts: RwLock<HashMap<PartsKey, Vec<AvailablePart>>>,
    resolves: RwLock<HashMap<ResolveKey, Vec<InterchangeResult>>>,
}

impl Caches {
    fn clear(&self) {
        *write(&self.part_types) = None;
        write(&self.references).clear();
        write(&self.part_codes).clear();
        write(&self.years).clear();
        write(&self.parts).clear();
        write(&self.resolves).clear();
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn cached<K: Eq + Hash, V: Clone>(enabled: bool, map: &RwLock<HashMap<K, V>>, key: &K) -> Option<V> {
    if enabled {
        read(map).get(key).cloned()
    } else {
        None
    }
}

fn remember<K: Eq + Hash, V>(enabled: bool, map: &RwLock<HashMap<K, V>>, key: K, value: V) {
    if enabled {
        write(map).insert(key, value);
    }
}

/// Parses a year supplied as text. Anything that isn't a plain integer is
/// treated as "no such year" by callers.
pub fn parse_year(raw: &str) -> Option<i32> {
    raw.trim().parse().ok()
}

/// The resolution engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn ReferenceStore>,
    params: EngineParams,
    caches: Arc<Caches>,
    /// Data version the caches were filled against.
    seen_version: Arc<Mutex<Option<DataVersion>>>,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(store: Arc<dyn ReferenceStore>, params: EngineParams) -> Self {
        Self {
            store,
            params,
            caches: Arc::new(Caches::default()),
            seen_version: Arc::new(Mutex::new(None)),
            cancel: CancellationToken::new(),
        }
    }

    /// A handle whose store calls abort once `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..self.clone()
        }
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn store(&self) -> &Arc<dyn ReferenceStore> {
        &self.store
    }

    /// Drops every memoized answer. Call after a reference-data reload.
    pub fn clear_caches(&self) {
        self.caches.clear();
    }

    /// Clears the caches if a snapshot load or link pass finished since the
    /// last check. The first call only records the current version.
    ///
    /// Returns `true` when the caches were cleared.
    pub async fn refresh_if_stale(&self) -> Result<bool> {
        let current = self.call("data_version", self.store.data_version()).await?;
        let mut seen = self.seen_version.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = matches!(*seen, Some(prev) if prev != current);
        *seen = Some(current);
        drop(seen);
        if changed {
            self.clear_caches();
            tracing::info!(
                snapshot = current.snapshot,
                link = current.link,
                "reference data changed, caches cleared"
            );
        }
        Ok(changed)
    }

    /// Runs one store call under the per-call timeout and the request's
    /// cancellation token.
    async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let budget = self.params.store_timeout;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled { operation }),
            res = tokio::time::timeout(budget, fut) => match res {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(source)) => Err(EngineError::Store { operation, source }),
                Err(_) => Err(EngineError::Timeout {
                    operation: operation.to_string(),
                    after_ms: budget.as_millis() as u64,
                }),
            },
        }
    }

    // ============ Enumeration ============

    pub async fn list_makes(&self) -> Result<Vec<Make>> {
        self.call("list_makes", self.store.list_makes()).await
    }

    /// Every canonical model of a make, with or without data.
    pub async fn all_models(&self, make_id: i64) -> Result<Vec<Model>> {
        self.call("list_models", self.store.list_models(make_id)).await
    }

    /// The part taxonomy, ordered by id.
    pub async fn list_part_types(&self) -> Result<Arc<Vec<PartType>>> {
        if self.params.cache_enabled {
            let hit = read(&self.caches.part_types).clone();
            if let Some(parts) = hit {
                return Ok(parts);
            }
        }
        let parts = Arc::new(self.call("list_part_types", self.store.list_part_types()).await?);
        if self.params.cache_enabled {
            *write(&self.caches.part_types) = Some(parts.clone());
        }
        Ok(parts)
    }

    /// Models of a make that have structured rows or a resolvable
    /// cross-reference.
    pub async fn list_models_for_make(&self, make_id: i64) -> Result<Lookup<ModelSummary>> {
        async move {
            let Some(make) = self.call("get_make", self.store.get_make(make_id)).await? else {
                tracing::debug!("unknown make");
                return Ok(Lookup::NoData);
            };
            let models = self.call("list_models", self.store.list_models(make_id)).await?;
            let with_inventory = self
                .call("models_with_inventory", self.store.models_with_inventory(&make))
                .await?;

            let mut out = Vec::new();
            for model in &models {
                if with_inventory.contains(&model.id)
                    || self.resolve_reference(&make, model).await?.is_some()
                {
                    out.push(ModelSummary::from(model));
                }
            }
            if out.is_empty() {
                tracing::debug!(models = models.len(), "no model of this make has data");
            }
            Ok(Lookup::from_vec(out))
        }
        .instrument(lookup_span("list_models_for_make", make_id, None, None))
        .await
    }

    /// Fetches a make and model, checking the model belongs to the make.
    async fn vehicle(&self, make_id: i64, model_id: i64) -> Result<Option<(Make, Model)>> {
        let Some(make) = self.call("get_make", self.store.get_make(make_id)).await? else {
            tracing::debug!(make_id, "unknown make");
            return Ok(None);
        };
        let Some(model) = self.call("get_model", self.store.get_model(model_id)).await? else {
            tracing::debug!(model_id, "unknown model");
            return Ok(None);
        };
        if model.make_id != make.id {
            tracing::debug!(make_id, model_id, "model does not belong to make");
            return Ok(None);
        }
        Ok(Some((make, model)))
    }

    // ============ Cross-reference resolution ============

    /// Resolves a canonical model to its legacy catalog key.
    pub async fn resolve_reference(
        &self,
        make: &Make,
        model: &Model,
    ) -> Result<Option<ResolvedReference>> {
        let enabled = self.params.cache_enabled;
        if let Some(hit) = cached(enabled, &self.caches.references, &model.id) {
            return Ok(hit);
        }

        let candidates = self
            .call(
                "cross_reference_candidates",
                self.store.cross_reference_candidates(&model.name),
            )
            .await?;
        let resolved = matching::match_cross_reference(&model.name, &make.name, &candidates).map(
            |xref| ResolvedReference {
                model_id: model.id,
                legacy_ref_id: xref.ref_id.clone(),
            },
        );
        if candidates.len() > 1 {
            if let Some(r) = &resolved {
                tracing::debug!(
                    model = %model.name,
                    candidates = candidates.len(),
                    chosen = %r.legacy_ref_id,
                    "ambiguous cross-reference resolved by tie-break"
                );
            }
        }

        remember(enabled, &self.caches.references, model.id, resolved.clone());
        Ok(resolved)
    }

    /// Resolves a legacy part code to a canonical part type.
    pub async fn resolve_part_code(
        &self,
        part_code: &str,
        part_types: &[PartType],
    ) -> Result<Option<PartType>> {
        let enabled = self.params.cache_enabled;
        let key = part_code.to_string();
        if let Some(hit) = cached(enabled, &self.caches.part_codes, &key) {
            return Ok(hit);
        }

        let hint = self
            .call("part_code_reference", self.store.part_code_reference(part_code))
            .await?;
        let resolved = hint.and_then(|h| {
            matching::match_part_type(&h.canonical_part_name_hint, part_types).cloned()
        });

        remember(enabled, &self.caches.part_codes, key, resolved.clone());
        Ok(resolved)
    }

    /// Catalog rows for a model, via its resolved reference.
    async fn catalog_for(&self, make: &Make, model: &Model) -> Result<Vec<CatalogEntry>> {
        match self.resolve_reference(make, model).await? {
            Some(reference) => {
                self.call(
                    "catalog_entries",
                    self.store.catalog_entries(&reference.legacy_ref_id),
                )
                .await
            }
            None => Ok(Vec::new()),
        }
    }

    // ============ Years ============

    /// Years with data for a model, most recent first.
    pub async fn available_years(&self, make_id: i64, model_id: i64) -> Result<Lookup<i32>> {
        async move {
            let enabled = self.params.cache_enabled;
            let key = (make_id, model_id);
            if let Some(hit) = cached(enabled, &self.caches.years, &key) {
                return Ok(Lookup::from_vec(hit));
            }
            let Some((make, model)) = self.vehicle(make_id, model_id).await? else {
                return Ok(Lookup::NoData);
            };

            let (min, max) = (self.params.year_min, self.params.year_max);
            let mut years = BTreeSet::new();
            let expand = |years: &mut BTreeSet<i32>, start: i32, end: i32| {
                if let Some((lo, hi)) = clamp_range(start, end, min, max) {
                    years.extend(lo..=hi);
                }
            };

            let rows = self
                .call(
                    "inventory_for_vehicle",
                    self.store.inventory_for_vehicle(&make, &model),
                )
                .await?;
            for row in &rows {
                expand(&mut years, row.year_start, row.year_end);
            }

            for entry in &self.catalog_for(&make, &model).await? {
                expand(&mut years, entry.year_start, entry.year_end);
            }

            if years.is_empty() && self.params.numeric_token_fallback {
                if let Some(token) = matching::numeric_token(&model.name) {
                    let entries = self
                        .call(
                            "catalog_entries_with_key_token",
                            self.store.catalog_entries_with_key_token(&token),
                        )
                        .await?;
                    tracing::debug!(%token, entries = entries.len(), "numeric token fallback");
                    for entry in &entries {
                        expand(&mut years, entry.year_start, entry.year_end);
                    }
                }
            }

            let out: Vec<i32> = years.into_iter().rev().collect();
            if out.is_empty() {
                tracing::debug!(model = %model.name, "no years");
            }
            remember(enabled, &self.caches.years, key, out.clone());
            Ok(Lookup::from_vec(out))
        }
        .instrument(lookup_span("available_years", make_id, Some(model_id), None))
        .await
    }

    // ============ Parts ============

    /// Canonical part type of a structured row: its FK when linked,
    /// otherwise its raw part text matched against the taxonomy.
    fn part_for_record<'a>(
        record: &InventoryRecord,
        part_types: &'a [PartType],
    ) -> Option<&'a PartType> {
        match record.part_type_id {
            Some(id) => part_types.iter().find(|p| p.id == id),
            None => matching::match_part_type(&record.part_text, part_types),
        }
    }

    /// Parts selectable for a model and year, deduplicated by part type.
    pub async fn available_parts(
        &self,
        make_id: i64,
        model_id: i64,
        year: i32,
    ) -> Result<Lookup<AvailablePart>> {
        async move {
            if !self.params.year_in_bounds(year) {
                tracing::debug!("year out of bounds");
                return Ok(Lookup::NoData);
            }
            let enabled = self.params.cache_enabled;
            let key = (make_id, model_id, year);
            if let Some(hit) = cached(enabled, &self.caches.parts, &key) {
                return Ok(Lookup::from_vec(hit));
            }
            let Some((make, model)) = self.vehicle(make_id, model_id).await? else {
                return Ok(Lookup::NoData);
            };
            let part_types = self.list_part_types().await?;
            let (min, max) = (self.params.year_min, self.params.year_max);

            let mut by_part: BTreeMap<i64, AvailablePart> = BTreeMap::new();

            let mut rows = self
                .call(
                    "inventory_for_vehicle",
                    self.store.inventory_for_vehicle(&make, &model),
                )
                .await?;
            rows.retain(|r| range_contains(r.year_start, r.year_end, year, min, max));
            rows.sort_by(|a, b| {
                a.interchange_number
                    .cmp(&b.interchange_number)
                    .then(a.id.cmp(&b.id))
            });
            for row in &rows {
                let Some(part) = Self::part_for_record(row, &part_types) else {
                    tracing::debug!(record = row.id, part_text = %row.part_text, "unmatched part text");
                    continue;
                };
                by_part.entry(part.id).or_insert_with(|| AvailablePart {
                    part_id: part.id,
                    part_name: part.name.clone(),
                    interchange_number: row.interchange_number.clone(),
                    options: row.option_string(),
                    source: Source::Inventory,
                });
            }

            let mut entries = self.catalog_for(&make, &model).await?;
            entries.retain(|e| range_contains(e.year_start, e.year_end, year, min, max));
            entries.sort_by_key(|e| e.interchange_number());
            let mut seen_codes = BTreeSet::new();
            for entry in &entries {
                if !seen_codes.insert(entry.part_code.clone()) {
                    continue;
                }
                let Some(part) = self.resolve_part_code(&entry.part_code, &part_types).await?
                else {
                    continue;
                };
                by_part.entry(part.id).or_insert_with(|| AvailablePart {
                    part_id: part.id,
                    part_name: part.name.clone(),
                    interchange_number: entry.interchange_number(),
                    options: String::new(),
                    source: Source::Catalog,
                });
            }

            let mut out: Vec<AvailablePart> = by_part.into_values().collect();
            out.sort_by(|a, b| a.part_name.cmp(&b.part_name).then(a.part_id.cmp(&b.part_id)));
            out.truncate(self.params.parts_limit);
            if out.is_empty() {
                tracing::debug!(model = %model.name, "dead end: no parts for year");
            }
            remember(enabled, &self.caches.parts, key, out.clone());
            Ok(Lookup::from_vec(out))
        }
        .instrument(lookup_span("available_parts", make_id, Some(model_id), Some(year)))
        .await
    }

    // ============ Final resolution ============

    /// Interchange numbers for one (year, make, model, part).
    ///
    /// Structured rows win outright; the catalog is consulted only when no
    /// structured row matches.
    pub async fn resolve(
        &self,
        year: i32,
        make_id: i64,
        model_id: i64,
        part_type_id: i64,
    ) -> Result<Lookup<InterchangeResult>> {
        async move {
            if !self.params.year_in_bounds(year) {
                tracing::debug!(year, "year out of bounds");
                return Ok(Lookup::NoData);
            }
            let enabled = self.params.cache_enabled;
            let key = (year, make_id, model_id, part_type_id);
            if let Some(hit) = cached(enabled, &self.caches.resolves, &key) {
                return Ok(Lookup::from_vec(hit));
            }
            let Some((make, model)) = self.vehicle(make_id, model_id).await? else {
                return Ok(Lookup::NoData);
            };
            let part_types = self.list_part_types().await?;
            if !part_types.iter().any(|p| p.id == part_type_id) {
                tracing::debug!(part_type_id, "unknown part type");
                return Ok(Lookup::NoData);
            }

            let mut out = self
                .resolve_from_inventory(&make, &model, year, part_type_id, &part_types)
                .await?;
            if out.is_empty() {
                out = self
                    .resolve_from_catalog(&make, &model, year, part_type_id, &part_types)
                    .await?;
            }
            if out.is_empty() {
                tracing::debug!(year, part_type_id, "no interchange");
            }

            remember(enabled, &self.caches.resolves, key, out.clone());
            Ok(Lookup::from_vec(out))
        }
        .instrument(lookup_span("resolve", make_id, Some(model_id), Some(year)))
        .await
    }

    async fn resolve_from_inventory(
        &self,
        make: &Make,
        model: &Model,
        year: i32,
        part_type_id: i64,
        part_types: &[PartType],
    ) -> Result<Vec<InterchangeResult>> {
        let (min, max) = (self.params.year_min, self.params.year_max);
        let rows = self
            .call(
                "inventory_for_vehicle",
                self.store.inventory_for_vehicle(make, model),
            )
            .await?;

        let mut out: Vec<InterchangeResult> = rows
            .iter()
            .filter(|r| {
                Self::part_for_record(r, part_types).is_some_and(|p| p.id == part_type_id)
            })
            .filter_map(|r| {
                let (lo, hi) = clamp_range(r.year_start, r.year_end, min, max)?;
                (lo..=hi).contains(&year).then(|| InterchangeResult {
                    interchange_number: r.interchange_number.clone(),
                    options: r
                        .options
                        .iter()
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect(),
                    source: Source::Inventory,
                    year_start: lo,
                    year_end: hi,
                    message: None,
                })
            })
            .collect();
        sort_and_dedup(&mut out);
        Ok(out)
    }

    async fn resolve_from_catalog(
        &self,
        make: &Make,
        model: &Model,
        year: i32,
        part_type_id: i64,
        part_types: &[PartType],
    ) -> Result<Vec<InterchangeResult>> {
        let (min, max) = (self.params.year_min, self.params.year_max);
        let entries = self.catalog_for(make, model).await?;

        let mut out = Vec::new();
        for entry in &entries {
            let Some((lo, hi)) = clamp_range(entry.year_start, entry.year_end, min, max) else {
                continue;
            };
            if !(lo..=hi).contains(&year) {
                continue;
            }
            let resolved = self.resolve_part_code(&entry.part_code, part_types).await?;
            if resolved.is_some_and(|p| p.id == part_type_id) {
                out.push(InterchangeResult {
                    interchange_number: entry.interchange_number(),
                    options: Vec::new(),
                    source: Source::Catalog,
                    year_start: lo,
                    year_end: hi,
                    message: Some(CATALOG_ONLY_MESSAGE.to_string()),
                });
            }
        }
        sort_and_dedup(&mut out);
        Ok(out)
    }

    // ============ Bulk tree ============

    /// Years and parts for every model of a make, fanned out over a bounded
    /// worker pool.
    ///
    /// A model whose lookup fails or exceeds `tree_model_timeout` gets an
    /// empty sub-tree carrying the failure; the rest of the tree is kept.
    pub async fn vehicle_tree(&self, make_id: i64) -> Result<Option<VehicleTree>> {
        let Some(make) = self.call("get_make", self.store.get_make(make_id)).await? else {
            tracing::debug!(make_id, "unknown make");
            return Ok(None);
        };
        let models = self.call("list_models", self.store.list_models(make_id)).await?;

        let semaphore = Arc::new(Semaphore::new(self.params.tree_concurrency.max(1)));
        let budget = self.params.tree_model_timeout;
        let mut tasks = JoinSet::new();

        for (idx, model) in models.iter().cloned().enumerate() {
            let token = self.cancel.child_token();
            let engine = self.with_cancellation(token.clone());
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let summary = ModelSummary::from(&model);
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (idx, ModelTree::empty(summary, Some("worker pool closed".into())));
                };
                let tree = match tokio::time::timeout(budget, engine.model_tree(make_id, &model))
                    .await
                {
                    Ok(Ok(tree)) => tree,
                    Ok(Err(e)) => {
                        tracing::warn!(model = %model.name, error = %e, "model sub-tree failed");
                        ModelTree::empty(summary, Some(e.to_string()))
                    }
                    Err(_) => {
                        token.cancel();
                        let e = EngineError::Timeout {
                            operation: format!("model tree for '{}'", model.name),
                            after_ms: budget.as_millis() as u64,
                        };
                        tracing::warn!(model = %model.name, error = %e, "model sub-tree timed out");
                        ModelTree::empty(summary, Some(e.to_string()))
                    }
                };
                (idx, tree)
            });
        }

        let mut slots: Vec<Option<ModelTree>> = vec![None; models.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, tree)) => slots[idx] = Some(tree),
                Err(e) => tracing::warn!(error = %e, "model sub-tree task aborted"),
            }
        }

        let trees = slots
            .into_iter()
            .zip(models.iter())
            .map(|(slot, model)| {
                slot.unwrap_or_else(|| {
                    ModelTree::empty(ModelSummary::from(model), Some("task aborted".into()))
                })
            })
            .collect();

        Ok(Some(VehicleTree {
            make,
            models: trees,
        }))
    }

    async fn model_tree(&self, make_id: i64, model: &Model) -> Result<ModelTree> {
        let mut years = self.available_years(make_id, model.id).await?.into_vec();
        years.truncate(self.params.tree_years);
        let mut parts_by_year = Vec::new();
        for &year in &years {
            let parts = self.available_parts(make_id, model.id, year).await?.into_vec();
            parts_by_year.push(YearParts { year, parts });
        }
        Ok(ModelTree {
            model: ModelSummary::from(model),
            years,
            parts_by_year,
            error: None,
        })
    }
}

fn sort_and_dedup(results: &mut Vec<InterchangeResult>) {
    results.sort_by(|a, b| {
        a.interchange_number
            .cmp(&b.interchange_number)
            .then(a.year_start.cmp(&b.year_start))
            .then(a.year_end.cmp(&b.year_end))
            .then(a.options.cmp(&b.options))
    });
    results.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelCrossReference, PartCodeReference};
    use crate::store::InMemoryStore;

    fn record(id: i64, model_text: &str, part_text: &str, years: (i32, i32), number: &str) -> InventoryRecord {
        InventoryRecord {
            id,
            make_id: None,
            model_id: None,
            part_type_id: None,
            make_text: "Ford".into(),
            model_text: model_text.into(),
            part_text: part_text.into(),
            year_start: years.0,
            year_end: years.1,
            interchange_number: number.into(),
            options: vec![],
        }
    }

    fn fixture() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert_make(Make { id: 6, name: "Ford".into() });
        store.insert_model(Model { id: 60, name: "Taurus".into(), make_id: 6 });
        store.insert_model(Model { id: 61, name: "F-150".into(), make_id: 6 });
        store.insert_model(Model { id: 62, name: "Ranger".into(), make_id: 6 });
        store.insert_part_type(PartType { id: 1, name: "Engine".into() });
        store.insert_part_type(PartType { id: 2, name: "Alternator".into() });
        store.insert_part_type(PartType { id: 3, name: "Engine Control Module".into() });
        store
    }

    fn engine(store: InMemoryStore) -> Engine {
        Engine::new(Arc::new(store), EngineParams::default())
    }

    #[tokio::test]
    async fn test_unlinked_record_reachable_by_raw_text() {
        let store = fixture();
        store.insert_inventory(record(1, "taurus ", "Engine Assembly", (2010, 2012), "20011"));
        let engine = engine(store);

        let years = engine.available_years(6, 60).await.unwrap().into_vec();
        assert_eq!(years, vec![2012, 2011, 2010]);

        let res = engine.resolve(2011, 6, 60, 1).await.unwrap().into_vec();
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].interchange_number, "20011");
        assert_eq!(res[0].source, Source::Inventory);
    }

    #[tokio::test]
    async fn test_inverted_range_is_skipped() {
        let store = fixture();
        store.insert_inventory(record(1, "Taurus", "Engine", (2015, 2010), "1"));
        let engine = engine(store);

        assert!(engine.available_years(6, 60).await.unwrap().is_no_data());
        assert!(engine.resolve(2012, 6, 60, 1).await.unwrap().is_no_data());
    }

    #[tokio::test]
    async fn test_years_are_clamped() {
        let store = fixture();
        store.insert_inventory(record(1, "Taurus", "Engine", (1940, 1952), "1"));
        store.insert_inventory(record(2, "Taurus", "Engine", (2029, 2040), "2"));
        let engine = engine(store);

        let years = engine.available_years(6, 60).await.unwrap().into_vec();
        assert_eq!(years, vec![2030, 2029, 1952, 1951, 1950]);
    }

    #[tokio::test]
    async fn test_model_from_other_make_is_no_data() {
        let store = fixture();
        store.insert_make(Make { id: 7, name: "BMW".into() });
        store.insert_inventory(record(1, "Taurus", "Engine", (2010, 2012), "1"));
        let engine = engine(store);

        assert!(engine.available_years(7, 60).await.unwrap().is_no_data());
        assert!(engine.resolve(2011, 7, 60, 1).await.unwrap().is_no_data());
    }

    #[tokio::test]
    async fn test_out_of_bounds_year_is_no_data() {
        let store = fixture();
        store.insert_inventory(record(1, "Taurus", "Engine", (1900, 2100), "1"));
        let engine = engine(store);

        assert!(engine.resolve(1949, 6, 60, 1).await.unwrap().is_no_data());
        assert!(engine.available_parts(6, 60, 2031).await.unwrap().is_no_data());
        assert!(!engine.resolve(1950, 6, 60, 1).await.unwrap().is_no_data());
    }

    #[tokio::test]
    async fn test_structured_part_merges_with_catalog_part() {
        let store = fixture();
        let mut rec = record(1, "Ranger", "Engine", (1995, 1998), "30022");
        rec.options = vec!["4.0L".into(), "".into()];
        store.insert_inventory(rec);
        store.insert_model_cross_reference(ModelCrossReference {
            ref_id: "R-RANGER".into(),
            legacy_make_code: String::new(),
            legacy_make_name: "FORD".into(),
            legacy_model_name: "RANGER PICKUP".into(),
            canonical_make_hint: String::new(),
            canonical_model_hint: String::new(),
        });
        store.insert_part_code_reference(PartCodeReference {
            part_code: "100".into(),
            canonical_part_name_hint: "Engine Assembly".into(),
        });
        store.insert_part_code_reference(PartCodeReference {
            part_code: "601".into(),
            canonical_part_name_hint: "Alternator".into(),
        });
        for code in ["100", "601"] {
            store.insert_catalog_entry(CatalogEntry {
                legacy_ref_key: "R-RANGER".into(),
                part_code: code.into(),
                manufacturer_code: "00123".into(),
                year_start: 1993,
                year_end: 1997,
            });
        }
        let engine = engine(store);

        let parts = engine.available_parts(6, 62, 1996).await.unwrap().into_vec();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].part_name, "Alternator");
        assert_eq!(parts[0].source, Source::Catalog);
        assert_eq!(parts[0].interchange_number, "601-00123");
        assert_eq!(parts[1].part_name, "Engine");
        assert_eq!(parts[1].source, Source::Inventory);
        assert_eq!(parts[1].interchange_number, "30022");
        assert_eq!(parts[1].options, "4.0L");

        // Catalog only covers up to 1997; 1998 comes from inventory alone.
        let parts = engine.available_parts(6, 62, 1998).await.unwrap().into_vec();
        assert_eq!(parts.len(), 1);
    }

    #[tokio::test]
    async fn test_parts_capped_by_limit() {
        let store = fixture();
        for id in 10..20 {
            store.insert_part_type(PartType { id, name: format!("Part {:02}", id) });
            let mut rec = record(id, "Taurus", "", (2000, 2001), &format!("N{}", id));
            rec.part_type_id = Some(id);
            store.insert_inventory(rec);
        }
        let mut params = EngineParams::default();
        params.parts_limit = 4;
        let engine = Engine::new(Arc::new(store), params);

        let parts = engine.available_parts(6, 60, 2000).await.unwrap().into_vec();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].part_name, "Part 10");
    }

    #[tokio::test]
    async fn test_numeric_token_fallback_is_gated() {
        let store = fixture();
        store.insert_catalog_entry(CatalogEntry {
            legacy_ref_key: "FD150XL".into(),
            part_code: "100".into(),
            manufacturer_code: "1".into(),
            year_start: 1997,
            year_end: 1999,
        });
        let store = Arc::new(store);

        let off = Engine::new(store.clone(), EngineParams::default());
        assert!(off.available_years(6, 61).await.unwrap().is_no_data());

        let mut params = EngineParams::default();
        params.numeric_token_fallback = true;
        let on = Engine::new(store, params);
        assert_eq!(
            on.available_years(6, 61).await.unwrap().into_vec(),
            vec![1999, 1998, 1997]
        );
    }

    #[tokio::test]
    async fn test_list_models_filters_to_models_with_data() {
        let store = fixture();
        store.insert_inventory(record(1, "Taurus", "Engine", (2010, 2012), "1"));
        store.insert_model_cross_reference(ModelCrossReference {
            ref_id: "9".into(),
            legacy_make_code: String::new(),
            legacy_make_name: "FORD".into(),
            legacy_model_name: "RANGER".into(),
            canonical_make_hint: String::new(),
            canonical_model_hint: String::new(),
        });
        let engine = engine(store);

        let models = engine.list_models_for_make(6).await.unwrap().into_vec();
        let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Ranger", "Taurus"]);

        assert!(engine.list_models_for_make(999).await.unwrap().is_no_data());
    }

    #[tokio::test]
    async fn test_clear_caches_sees_new_data() {
        let store = Arc::new(fixture());
        let engine = Engine::new(store.clone(), EngineParams::default());
        assert!(engine.available_years(6, 60).await.unwrap().is_no_data());

        store.insert_inventory(record(1, "Taurus", "Engine", (2010, 2010), "1"));
        // Cached answer survives until the caches are cleared.
        assert!(engine.available_years(6, 60).await.unwrap().is_no_data());
        engine.clear_caches();
        assert_eq!(engine.available_years(6, 60).await.unwrap().into_vec(), vec![2010]);
    }

    #[tokio::test]
    async fn test_refresh_clears_caches_after_data_changes() {
        let store = Arc::new(fixture());
        let engine = Engine::new(store.clone(), EngineParams::default());
        assert!(!engine.refresh_if_stale().await.unwrap());
        assert!(engine.available_years(6, 60).await.unwrap().is_no_data());

        assert!(!engine.refresh_if_stale().await.unwrap());
        store.insert_inventory(record(1, "Taurus", "Engine", (2011, 2012), "1"));
        assert!(engine.refresh_if_stale().await.unwrap());
        assert_eq!(engine.available_years(6, 60).await.unwrap().into_vec(), vec![2012, 2011]);

        store.record_link_run("ixr-1", 0).await.unwrap();
        assert!(engine.refresh_if_stale().await.unwrap());
        assert!(!engine.refresh_if_stale().await.unwrap());
    }

    #[tokio::test]
    async fn test_tree_years_match_parts_by_year() {
        let store = fixture();
        store.insert_inventory(record(1, "Taurus", "Engine", (2010, 2015), "1"));
        let params = EngineParams {
            tree_years: 2,
            ..EngineParams::default()
        };
        let engine = Engine::new(Arc::new(store), params);

        let tree = engine.vehicle_tree(6).await.unwrap().unwrap();
        let taurus = tree.models.iter().find(|m| m.model.id == 60).unwrap();
        assert_eq!(taurus.years, vec![2015, 2014]);
        let covered: Vec<i32> = taurus.parts_by_year.iter().map(|y| y.year).collect();
        assert_eq!(covered, taurus.years);
    }

    #[tokio::test]
    async fn test_cancelled_request_errors() {
        let engine = engine(fixture());
        let token = CancellationToken::new();
        token.cancel();
        let err = engine
            .with_cancellation(token)
            .available_years(6, 60)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled { .. }));
        assert_eq!(err.code(), "cancelled");
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year(" 2013 "), Some(2013));
        assert_eq!(parse_year("20x3"), None);
        assert_eq!(parse_year(""), None);
    }
}
