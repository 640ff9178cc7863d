//! Picker commands for the CLI: `makes`, `models`, `years`, `parts`,
//! `resolve`, and `tree`.
//!
//! Arguments arrive as raw strings and are parsed leniently, so a typo in
//! an id prints `no data` exactly as the HTTP API would answer `no_data`.
//! `--json` prints the same JSON bodies the HTTP API returns.

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::db;
use crate::engine::{parse_year, Engine};
use crate::models::Lookup;

fn parse_id(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints a lookup, one line per result, or `no data`.
fn print_lookup<T: Serialize>(
    lookup: &Lookup<T>,
    json: bool,
    line: impl Fn(&T) -> String,
) -> Result<()> {
    if json {
        return print_json(lookup);
    }
    match lookup {
        Lookup::NoData => println!("no data"),
        Lookup::Results(items) => {
            for item in items {
                println!("{}", line(item));
            }
        }
    }
    Ok(())
}

async fn engine(config: &Config) -> Result<Engine> {
    db::open_engine(config).await
}

pub async fn run_makes(config: &Config, json: bool) -> Result<()> {
    let makes = Lookup::from_vec(engine(config).await?.list_makes().await?);
    print_lookup(&makes, json, |m| format!("{:>6}  {}", m.id, m.name))
}

pub async fn run_models(config: &Config, make_id: &str, json: bool) -> Result<()> {
    let models = match parse_id(make_id) {
        Some(id) => engine(config).await?.list_models_for_make(id).await?,
        None => Lookup::NoData,
    };
    print_lookup(&models, json, |m| format!("{:>6}  {}", m.id, m.name))
}

pub async fn run_years(config: &Config, make_id: &str, model_id: &str, json: bool) -> Result<()> {
    let years = match (parse_id(make_id), parse_id(model_id)) {
        (Some(make_id), Some(model_id)) => {
            engine(config)
                .await?
                .available_years(make_id, model_id)
                .await?
        }
        _ => Lookup::NoData,
    };
    print_lookup(&years, json, |y| y.to_string())
}

pub async fn run_parts(
    config: &Config,
    make_id: &str,
    model_id: &str,
    year: &str,
    json: bool,
) -> Result<()> {
    let parts = match (parse_id(make_id), parse_id(model_id), parse_year(year)) {
        (Some(make_id), Some(model_id), Some(year)) => {
            engine(config)
                .await?
                .available_parts(make_id, model_id, year)
                .await?
        }
        _ => Lookup::NoData,
    };
    print_lookup(&parts, json, |p| {
        let mut line = format!(
            "{:>6}  {:<32} {:<16} [{}]",
            p.part_id, p.part_name, p.interchange_number, p.source
        );
        if !p.options.is_empty() {
            line.push_str("  ");
            line.push_str(&p.options);
        }
        line
    })
}

pub async fn run_resolve(
    config: &Config,
    year: &str,
    make_id: &str,
    model_id: &str,
    part_id: &str,
    json: bool,
) -> Result<()> {
    let ids = (
        parse_year(year),
        parse_id(make_id),
        parse_id(model_id),
        parse_id(part_id),
    );
    let results = match ids {
        (Some(year), Some(make_id), Some(model_id), Some(part_id)) => {
            engine(config)
                .await?
                .resolve(year, make_id, model_id, part_id)
                .await?
        }
        _ => Lookup::NoData,
    };
    print_lookup(&results, json, |r| {
        let mut line = format!(
            "{:<16} {}-{} [{}]",
            r.interchange_number, r.year_start, r.year_end, r.source
        );
        if !r.options.is_empty() {
            line.push_str("  ");
            line.push_str(&r.options.join(", "));
        }
        if let Some(message) = &r.message {
            line.push_str("  (");
            line.push_str(message);
            line.push(')');
        }
        line
    })
}

pub async fn run_tree(config: &Config, make_id: &str, json: bool) -> Result<()> {
    let tree = match parse_id(make_id) {
        Some(id) => engine(config).await?.vehicle_tree(id).await?,
        None => None,
    };
    let Some(tree) = tree else {
        if json {
            return print_json(&Lookup::<()>::NoData);
        }
        println!("no data");
        return Ok(());
    };
    if json {
        return print_json(&tree);
    }

    println!("{} ({})", tree.make.name, tree.make.id);
    for model in &tree.models {
        match &model.error {
            Some(err) => println!("  {} ({}): error: {}", model.model.name, model.model.id, err),
            None if model.years.is_empty() => {
                println!("  {} ({}): no data", model.model.name, model.model.id)
            }
            None => {
                println!(
                    "  {} ({}): {} years",
                    model.model.name,
                    model.model.id,
                    model.years.len()
                );
                for yp in &model.parts_by_year {
                    println!("    {}: {} parts", yp.year, yp.parts.len());
                }
            }
        }
    }
    Ok(())
}
