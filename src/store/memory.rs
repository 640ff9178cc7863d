//! In-memory [`ReferenceStore`] implementation for tests and embedding.
//!
//! Rows live in `Vec`s behind `std::sync::RwLock`. Queries are linear
//! scans, which is fine for fixtures and small snapshots.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::load::ReferenceSnapshot;
use crate::matching::{match_kind, normalize};
use crate::models::{
    CatalogEntry, InventoryRecord, Make, Model, ModelCrossReference, PartCodeReference, PartType,
};

use super::{belongs_to, DataVersion, LinkUpdate, ReferenceStore};

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    makes: RwLock<Vec<Make>>,
    models: RwLock<Vec<Model>>,
    part_types: RwLock<Vec<PartType>>,
    inventory: RwLock<Vec<InventoryRecord>>,
    catalog: RwLock<Vec<CatalogEntry>>,
    model_xrefs: RwLock<Vec<ModelCrossReference>>,
    part_code_refs: RwLock<Vec<PartCodeReference>>,
    /// Lock name to acquisition time (unix seconds).
    locks: Mutex<HashMap<String, i64>>,
    /// Bumped by every insert.
    generation: AtomicI64,
    link_runs: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: &ReferenceSnapshot) -> Self {
        let store = Self::new();
        for m in &snapshot.makes {
            store.insert_make(m.clone());
        }
        for m in &snapshot.models {
            store.insert_model(m.clone());
        }
        for p in &snapshot.part_types {
            store.insert_part_type(p.clone());
        }
        for r in &snapshot.inventory {
            store.insert_inventory(r.clone());
        }
        for e in &snapshot.catalog {
            store.insert_catalog_entry(e.clone());
        }
        for x in &snapshot.model_cross_references {
            store.insert_model_cross_reference(x.clone());
        }
        for p in &snapshot.part_code_references {
            store.insert_part_code_reference(p.clone());
        }
        store
    }

    pub fn insert_make(&self, make: Make) {
        write(&self.makes).push(make);
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn insert_model(&self, model: Model) {
        write(&self.models).push(model);
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn insert_part_type(&self, part_type: PartType) {
        write(&self.part_types).push(part_type);
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn insert_inventory(&self, record: InventoryRecord) {
        write(&self.inventory).push(record);
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn insert_catalog_entry(&self, entry: CatalogEntry) {
        write(&self.catalog).push(entry);
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn insert_model_cross_reference(&self, xref: ModelCrossReference) {
        write(&self.model_xrefs).push(xref);
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn insert_part_code_reference(&self, pref: PartCodeReference) {
        write(&self.part_code_refs).push(pref);
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of one inventory row, for assertions.
    pub fn inventory_record(&self, id: i64) -> Option<InventoryRecord> {
        read(&self.inventory).iter().find(|r| r.id == id).cloned()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ReferenceStore for InMemoryStore {
    async fn list_makes(&self) -> Result<Vec<Make>> {
        let mut makes = read(&self.makes).clone();
        makes.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(makes)
    }

    async fn get_make(&self, id: i64) -> Result<Option<Make>> {
        Ok(read(&self.makes).iter().find(|m| m.id == id).cloned())
    }

    async fn list_models(&self, make_id: i64) -> Result<Vec<Model>> {
        let mut models: Vec<Model> = read(&self.models)
            .iter()
            .filter(|m| m.make_id == make_id)
            .cloned()
            .collect();
        models.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(models)
    }

    async fn get_model(&self, id: i64) -> Result<Option<Model>> {
        Ok(read(&self.models).iter().find(|m| m.id == id).cloned())
    }

    async fn list_part_types(&self) -> Result<Vec<PartType>> {
        let mut parts = read(&self.part_types).clone();
        parts.sort_by_key(|p| p.id);
        Ok(parts)
    }

    async fn inventory_for_vehicle(
        &self,
        make: &Make,
        model: &Model,
    ) -> Result<Vec<InventoryRecord>> {
        let mut rows: Vec<InventoryRecord> = read(&self.inventory)
            .iter()
            .filter(|r| belongs_to(r, make, model))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn models_with_inventory(&self, make: &Make) -> Result<BTreeSet<i64>> {
        let models = self.list_models(make.id).await?;
        let inventory = read(&self.inventory);
        Ok(models
            .iter()
            .filter(|m| inventory.iter().any(|r| belongs_to(r, make, m)))
            .map(|m| m.id)
            .collect())
    }

    async fn cross_reference_candidates(
        &self,
        model_name: &str,
    ) -> Result<Vec<ModelCrossReference>> {
        let needle = normalize(model_name);
        Ok(read(&self.model_xrefs)
            .iter()
            .filter(|x| match_kind(&needle, &normalize(&x.legacy_model_name)).is_some())
            .cloned()
            .collect())
    }

    async fn catalog_entries(&self, ref_key: &str) -> Result<Vec<CatalogEntry>> {
        Ok(read(&self.catalog)
            .iter()
            .filter(|e| e.legacy_ref_key == ref_key)
            .cloned()
            .collect())
    }

    async fn catalog_entries_with_key_token(&self, token: &str) -> Result<Vec<CatalogEntry>> {
        if token.is_empty() {
            return Ok(Vec::new());
        }
        Ok(read(&self.catalog)
            .iter()
            .filter(|e| e.legacy_ref_key.contains(token))
            .cloned()
            .collect())
    }

    async fn part_code_reference(&self, part_code: &str) -> Result<Option<PartCodeReference>> {
        Ok(read(&self.part_code_refs)
            .iter()
            .find(|p| p.part_code == part_code)
            .cloned())
    }

    async fn unlinked_inventory(&self) -> Result<Vec<InventoryRecord>> {
        let mut rows: Vec<InventoryRecord> = read(&self.inventory)
            .iter()
            .filter(|r| !r.is_linked())
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn fill_inventory_links(&self, record_id: i64, update: LinkUpdate) -> Result<bool> {
        let mut inventory = write(&self.inventory);
        let Some(record) = inventory.iter_mut().find(|r| r.id == record_id) else {
            return Ok(false);
        };
        let mut changed = false;
        for (slot, value) in [
            (&mut record.make_id, update.make_id),
            (&mut record.model_id, update.model_id),
            (&mut record.part_type_id, update.part_type_id),
        ] {
            if slot.is_none() && value.is_some() {
                *slot = value;
                changed = true;
            }
        }
        Ok(changed)
    }

    async fn acquire_batch_lock(
        &self,
        name: &str,
        _holder: &str,
        stale_after: Duration,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let cutoff = now - stale_after.as_secs() as i64;
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        match locks.get(name) {
            Some(&acquired_at) if acquired_at > cutoff => Ok(false),
            _ => {
                locks.insert(name.to_string(), now);
                Ok(true)
            }
        }
    }

    async fn release_batch_lock(&self, name: &str) -> Result<()> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.remove(name);
        Ok(())
    }

    async fn record_link_run(&self, _holder: &str, _updated: usize) -> Result<()> {
        self.link_runs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn data_version(&self) -> Result<DataVersion> {
        Ok(DataVersion {
            snapshot: self.generation.load(Ordering::Relaxed),
            link: self.link_runs.load(Ordering::Relaxed),
        })
    }
}
