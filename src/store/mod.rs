//! Storage abstraction for the reference data.
//!
//! The [`ReferenceStore`] trait is the only read interface the engine has
//! to the taxonomy, the structured inventory, the legacy catalog, and the
//! cross-reference tables. It also carries the narrow write surface used by
//! the offline link pass (filling NULL foreign keys, batch locking).
//!
//! Implementations must be `Send + Sync` so the engine can fan work out
//! across tokio tasks.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::matching::normalize;
use crate::models::{
    CatalogEntry, InventoryRecord, Make, Model, ModelCrossReference, PartCodeReference, PartType,
};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Foreign keys proposed by the link pass for one inventory record.
///
/// `None` leaves the column untouched; a stored value is never replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkUpdate {
    pub make_id: Option<i64>,
    pub model_id: Option<i64>,
    pub part_type_id: Option<i64>,
}

impl LinkUpdate {
    pub fn is_empty(&self) -> bool {
        self.make_id.is_none() && self.model_id.is_none() && self.part_type_id.is_none()
    }
}

/// Generation counters for the reference data. Two equal versions mean
/// cached answers are still valid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DataVersion {
    /// Latest snapshot load.
    pub snapshot: i64,
    /// Latest finished link pass.
    pub link: i64,
}

/// Whether a structured row belongs to a vehicle. Each of make and model
/// matches by FK when linked, otherwise by raw text compared through
/// [`normalize`] (Unicode lowercase, whitespace collapsed).
pub(crate) fn belongs_to(record: &InventoryRecord, make: &Make, model: &Model) -> bool {
    let make_ok = match record.make_id {
        Some(id) => id == make.id,
        None => same_text(&record.make_text, &make.name),
    };
    let model_ok = match record.model_id {
        Some(id) => id == model.id,
        None => same_text(&record.model_text, &model.name),
    };
    make_ok && model_ok
}

fn same_text(a: &str, b: &str) -> bool {
    let a = normalize(a);
    !a.is_empty() && a == normalize(b)
}

/// Abstract reference-data backend.
///
/// Listing methods return rows in a stable order (by name then id for
/// makes and models, by id for part types) so callers never depend on
/// physical table order.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_makes`](ReferenceStore::list_makes) | All canonical makes |
/// | [`list_models`](ReferenceStore::list_models) | Canonical models of a make |
/// | [`list_part_types`](ReferenceStore::list_part_types) | The part taxonomy |
/// | [`inventory_for_vehicle`](ReferenceStore::inventory_for_vehicle) | Structured rows for a make/model |
/// | [`models_with_inventory`](ReferenceStore::models_with_inventory) | Model ids of a make with structured rows |
/// | [`cross_reference_candidates`](ReferenceStore::cross_reference_candidates) | References that may name a model |
/// | [`catalog_entries`](ReferenceStore::catalog_entries) | Legacy rows for one ref key |
/// | [`catalog_entries_with_key_token`](ReferenceStore::catalog_entries_with_key_token) | Legacy rows whose key embeds a token |
/// | [`part_code_reference`](ReferenceStore::part_code_reference) | Name hint for a legacy part code |
/// | [`acquire_batch_lock`](ReferenceStore::acquire_batch_lock) | Single-writer lock, stale locks taken over |
/// | [`data_version`](ReferenceStore::data_version) | Changes after every load or link pass |
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn list_makes(&self) -> Result<Vec<Make>>;

    async fn get_make(&self, id: i64) -> Result<Option<Make>>;

    async fn list_models(&self, make_id: i64) -> Result<Vec<Model>>;

    async fn get_model(&self, id: i64) -> Result<Option<Model>>;

    async fn list_part_types(&self) -> Result<Vec<PartType>>;

    /// Structured rows for a vehicle, as decided by `belongs_to`.
    async fn inventory_for_vehicle(&self, make: &Make, model: &Model)
        -> Result<Vec<InventoryRecord>>;

    /// Ids of the make's models reachable by [`inventory_for_vehicle`](ReferenceStore::inventory_for_vehicle).
    async fn models_with_inventory(&self, make: &Make) -> Result<BTreeSet<i64>>;

    /// A superset of the references whose `legacy_model_name` equals,
    /// contains, or is contained in `model_name` after [`normalize`]. The
    /// engine applies the exact ranking itself.
    async fn cross_reference_candidates(&self, model_name: &str)
        -> Result<Vec<ModelCrossReference>>;

    /// Legacy rows whose key equals `ref_key` exactly.
    async fn catalog_entries(&self, ref_key: &str) -> Result<Vec<CatalogEntry>>;

    /// Legacy rows whose key contains `token`.
    async fn catalog_entries_with_key_token(&self, token: &str) -> Result<Vec<CatalogEntry>>;

    async fn part_code_reference(&self, part_code: &str) -> Result<Option<PartCodeReference>>;

    /// Inventory rows with at least one NULL foreign key, by id.
    async fn unlinked_inventory(&self) -> Result<Vec<InventoryRecord>>;

    /// Fills the NULL foreign keys of one record. Returns whether any column
    /// changed.
    async fn fill_inventory_links(&self, record_id: i64, update: LinkUpdate) -> Result<bool>;

    /// Takes a named single-writer lock. Returns `false` if another holder
    /// took it less than `stale_after` ago; an older lock is taken over.
    async fn acquire_batch_lock(
        &self,
        name: &str,
        holder: &str,
        stale_after: Duration,
    ) -> Result<bool>;

    async fn release_batch_lock(&self, name: &str) -> Result<()>;

    /// Records a finished link pass so readers see a new [`DataVersion`].
    async fn record_link_run(&self, holder: &str, updated: usize) -> Result<()>;

    /// Changes whenever reference data is reloaded or relinked.
    async fn data_version(&self) -> Result<DataVersion>;
}
