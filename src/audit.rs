//! Dead-end report.
//!
//! Walks the picker the way a user would: make → model → year → parts, and
//! records every place the cascade stops. A model with no years, or a year
//! with no parts, is a dead end the reference data should fix.
//!
//! The report only calls public [`Engine`] operations, so it sees exactly
//! what the CLI and HTTP callers see.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::config::Config;
use crate::db;
use crate::engine::Engine;
use crate::models::{Make, ModelSummary};

#[derive(Debug, Clone, Serialize)]
pub struct ModelAudit {
    pub model: ModelSummary,
    /// Years offered for the model.
    pub years: Vec<i32>,
    /// Offered years with no parts.
    pub dead_years: Vec<i32>,
    /// Whether the model appears in the filtered model list.
    pub listed: bool,
}

impl ModelAudit {
    pub fn is_dead_end(&self) -> bool {
        self.years.is_empty() || !self.dead_years.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MakeAudit {
    pub make: Make,
    pub models: Vec<ModelAudit>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    pub makes: Vec<MakeAudit>,
    pub models_checked: usize,
    pub models_without_years: usize,
    pub years_without_parts: usize,
}

/// Audits one make, or every make when `make_id` is `None`.
pub async fn audit(engine: &Engine, make_id: Option<i64>) -> crate::error::Result<AuditReport> {
    let makes: Vec<Make> = engine
        .list_makes()
        .await?
        .into_iter()
        .filter(|m| make_id.map_or(true, |id| m.id == id))
        .collect();

    let mut report = AuditReport::default();
    for make in makes {
        let listed = engine.list_models_for_make(make.id).await?.into_vec();
        let mut models = Vec::new();
        for model in engine.all_models(make.id).await? {
            let years = engine.available_years(make.id, model.id).await?.into_vec();
            let mut dead_years = Vec::new();
            for &year in &years {
                if engine
                    .available_parts(make.id, model.id, year)
                    .await?
                    .is_no_data()
                {
                    dead_years.push(year);
                }
            }

            report.models_checked += 1;
            if years.is_empty() {
                report.models_without_years += 1;
            }
            report.years_without_parts += dead_years.len();

            models.push(ModelAudit {
                listed: listed.iter().any(|m| m.id == model.id),
                model: ModelSummary::from(&model),
                years,
                dead_years,
            });
        }
        report.makes.push(MakeAudit { make, models });
    }

    tracing::info!(
        models = report.models_checked,
        without_years = report.models_without_years,
        years_without_parts = report.years_without_parts,
        "audit complete"
    );
    Ok(report)
}

/// CLI entry point for `ixr audit`.
pub async fn run_audit(config: &Config, make_id: Option<i64>, json: bool) -> Result<()> {
    let engine = db::open_engine(config).await?;
    let report = audit(&engine, make_id).await?;

    if let (Some(id), true) = (make_id, report.makes.is_empty()) {
        bail!("Unknown make id: {}", id);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for make in &report.makes {
        println!("{} ({})", make.make.name, make.make.id);
        for m in make.models.iter().filter(|m| m.is_dead_end()) {
            if m.years.is_empty() {
                println!("  {} ({}): no years", m.model.name, m.model.id);
            } else {
                let years: Vec<String> = m.dead_years.iter().map(|y| y.to_string()).collect();
                println!(
                    "  {} ({}): no parts for {}",
                    m.model.name,
                    m.model.id,
                    years.join(", ")
                );
            }
        }
    }
    println!(
        "checked {} models: {} without years, {} years without parts",
        report.models_checked, report.models_without_years, report.years_without_parts
    );
    Ok(())
}
