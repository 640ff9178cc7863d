//! Core data models used throughout the interchange resolver.
//!
//! Two families of types live here: the reference data read from the
//! store (taxonomy, structured inventory, legacy catalog, cross-references)
//! and the result shapes the engine hands back to callers.

use serde::{Deserialize, Serialize};

/// Canonical vehicle make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Make {
    pub id: i64,
    pub name: String,
}

/// Canonical vehicle model, owned by a [`Make`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub id: i64,
    pub name: String,
    pub make_id: i64,
}

/// Canonical part type (e.g. "Alternator", "Engine").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartType {
    pub id: i64,
    pub name: String,
}

/// Maximum number of option strings carried by an inventory record.
pub const MAX_OPTIONS: usize = 10;

/// A row of the structured inventory.
///
/// The FK fields start out `None` and are filled by the offline link pass.
/// Until then the record is reachable only through its raw text fields.
/// Raw year ranges are not trusted: `year_start > year_end` happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: i64,
    #[serde(default)]
    pub make_id: Option<i64>,
    #[serde(default)]
    pub model_id: Option<i64>,
    #[serde(default)]
    pub part_type_id: Option<i64>,
    pub make_text: String,
    pub model_text: String,
    pub part_text: String,
    pub year_start: i32,
    pub year_end: i32,
    pub interchange_number: String,
    #[serde(default)]
    pub options: Vec<String>,
}

impl InventoryRecord {
    /// Non-empty options joined for display, e.g. `"V6 3.5L, AWD"`.
    pub fn option_string(&self) -> String {
        self.options
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// True once every FK has been populated.
    pub fn is_linked(&self) -> bool {
        self.make_id.is_some() && self.model_id.is_some() && self.part_type_id.is_some()
    }
}

/// A row of the legacy catalog. Append-only, never foreign-keyed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub legacy_ref_key: String,
    pub part_code: String,
    pub manufacturer_code: String,
    pub year_start: i32,
    pub year_end: i32,
}

impl CatalogEntry {
    /// Interchange number as printed in the legacy catalog: the part code
    /// followed by the manufacturer sequence (`"601-01234"`). Entries without
    /// a manufacturer code fall back to the legacy key itself.
    pub fn interchange_number(&self) -> String {
        let code = self.manufacturer_code.trim();
        if code.is_empty() {
            self.legacy_ref_key.trim().to_string()
        } else {
            format!("{}-{}", self.part_code.trim(), code)
        }
    }
}

/// Bridges a canonical make/model to a legacy catalog key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCrossReference {
    pub ref_id: String,
    #[serde(default)]
    pub legacy_make_code: String,
    #[serde(default)]
    pub legacy_make_name: String,
    pub legacy_model_name: String,
    #[serde(default)]
    pub canonical_make_hint: String,
    #[serde(default)]
    pub canonical_model_hint: String,
}

/// Bridges a legacy numeric part code to a human-readable part name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartCodeReference {
    pub part_code: String,
    pub canonical_part_name_hint: String,
}

/// The outcome of resolving a canonical model into the legacy catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedReference {
    pub model_id: i64,
    pub legacy_ref_id: String,
}

/// Which dataset produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Inventory,
    Catalog,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Inventory => "inventory",
            Source::Catalog => "catalog",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message attached to every catalog-sourced result.
pub const CATALOG_ONLY_MESSAGE: &str = "pricing/options not available for this catalog-only match";

/// A final interchange answer for one (year, make, model, part) query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterchangeResult {
    pub interchange_number: String,
    pub options: Vec<String>,
    pub source: Source,
    pub year_start: i32,
    pub year_end: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One selectable part for a (make, model, year).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailablePart {
    pub part_id: i64,
    pub part_name: String,
    pub interchange_number: String,
    pub options: String,
    pub source: Source,
}

/// Model summary returned by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSummary {
    pub id: i64,
    pub name: String,
}

impl From<&Model> for ModelSummary {
    fn from(m: &Model) -> Self {
        Self {
            id: m.id,
            name: m.name.clone(),
        }
    }
}

/// Parts available for a single year inside a [`ModelTree`].
#[derive(Debug, Clone, Serialize)]
pub struct YearParts {
    pub year: i32,
    pub parts: Vec<AvailablePart>,
}

/// Pre-materialized years and parts for one model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelTree {
    pub model: ModelSummary,
    pub years: Vec<i32>,
    pub parts_by_year: Vec<YearParts>,
    /// Set when this model's sub-tree was replaced by an empty one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelTree {
    pub fn empty(model: ModelSummary, error: Option<String>) -> Self {
        Self {
            model,
            years: Vec::new(),
            parts_by_year: Vec::new(),
            error,
        }
    }
}

/// Pre-materialized data for a whole make.
#[derive(Debug, Clone, Serialize)]
pub struct VehicleTree {
    pub make: Make,
    pub models: Vec<ModelTree>,
}

/// Result of an engine lookup: either nothing exists, or a non-empty list.
///
/// Keeping "no data" as its own variant stops callers from mistaking an
/// empty fallback for a complete answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    NoData,
    Results(Vec<T>),
}

impl<T> Lookup<T> {
    /// Wraps a vector, mapping an empty one to [`Lookup::NoData`].
    pub fn from_vec(items: Vec<T>) -> Self {
        if items.is_empty() {
            Lookup::NoData
        } else {
            Lookup::Results(items)
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Lookup::NoData)
    }

    pub fn len(&self) -> usize {
        match self {
            Lookup::NoData => 0,
            Lookup::Results(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            Lookup::NoData => &[],
            Lookup::Results(items) => items,
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Lookup::NoData => Vec::new(),
            Lookup::Results(items) => items,
        }
    }
}

impl<T: Serialize> Serialize for Lookup<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Lookup", 2)?;
        match self {
            Lookup::NoData => {
                s.serialize_field("status", "no_data")?;
                s.serialize_field("results", &[] as &[T])?;
            }
            Lookup::Results(items) => {
                s.serialize_field("status", "ok")?;
                s.serialize_field("results", items)?;
            }
        }
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, code: &str, mfr: &str) -> CatalogEntry {
        CatalogEntry {
            legacy_ref_key: key.to_string(),
            part_code: code.to_string(),
            manufacturer_code: mfr.to_string(),
            year_start: 1990,
            year_end: 1995,
        }
    }

    #[test]
    fn test_catalog_interchange_number() {
        assert_eq!(entry("R17", "601", "01234").interchange_number(), "601-01234");
        assert_eq!(entry("R17", "601", " ").interchange_number(), "R17");
    }

    #[test]
    fn test_option_string_skips_blanks() {
        let rec = InventoryRecord {
            id: 1,
            make_id: None,
            model_id: None,
            part_type_id: None,
            make_text: "Ford".into(),
            model_text: "Taurus".into(),
            part_text: "Engine".into(),
            year_start: 2010,
            year_end: 2015,
            interchange_number: "20011".into(),
            options: vec!["V6 3.5L".into(), "".into(), " AWD ".into()],
        };
        assert_eq!(rec.option_string(), "V6 3.5L, AWD");
        assert!(!rec.is_linked());
    }

    #[test]
    fn test_lookup_from_empty_vec_is_no_data() {
        let l: Lookup<i32> = Lookup::from_vec(vec![]);
        assert!(l.is_no_data());
        assert!(l.as_slice().is_empty());

        let l = Lookup::from_vec(vec![1, 2]);
        assert_eq!(l.len(), 2);
        assert_eq!(l.into_vec(), vec![1, 2]);
    }

    #[test]
    fn test_lookup_serializes_status() {
        let l: Lookup<i32> = Lookup::NoData;
        let v = serde_json::to_value(&l).unwrap();
        assert_eq!(v["status"], "no_data");
        assert_eq!(v["results"].as_array().unwrap().len(), 0);
    }
}
