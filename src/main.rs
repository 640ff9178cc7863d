//! # Interchange resolver CLI (`ixr`)
//!
//! The `ixr` binary loads reference data, links raw inventory rows, answers
//! picker lookups, and serves the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! ixr --config ./config/ixr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ixr init` | Create the SQLite database and run schema migrations |
//! | `ixr load <snapshot.json>` | Replace reference data from a JSON snapshot |
//! | `ixr link [--break-lock]` | Fill NULL inventory foreign keys from raw text |
//! | `ixr makes` | List canonical makes |
//! | `ixr models <make_id>` | Models of a make that have data |
//! | `ixr years <make_id> <model_id>` | Years with data, newest first |
//! | `ixr parts <make_id> <model_id> <year>` | Selectable parts |
//! | `ixr resolve <year> <make_id> <model_id> <part_id>` | Interchange numbers |
//! | `ixr tree <make_id>` | Bulk years and parts for every model |
//! | `ixr audit [--make <id>]` | Report picker dead ends |
//! | `ixr serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! ixr init --config ./config/ixr.toml
//! ixr load ./data/snapshot.json --config ./config/ixr.toml
//! ixr link --config ./config/ixr.toml
//! ixr resolve 2013 6 60 1 --json --config ./config/ixr.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use interchange::{audit, config, link, load, migrate, observability, query, server};

/// Interchange resolver: find the Hollander interchange number for a
/// vehicle part.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ixr.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ixr",
    about = "Resolve vehicle part interchange numbers from inventory and legacy catalog data",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ixr.toml")]
    config: PathBuf,

    /// Print JSON instead of plain text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all reference tables. Safe to
    /// run repeatedly.
    Init,

    /// Replace all reference data with the contents of a JSON snapshot.
    ///
    /// Skipped when the same file was the last one loaded, unless `--force`.
    Load {
        /// Path to the snapshot JSON file.
        path: PathBuf,

        /// Reload even if the snapshot digest is unchanged.
        #[arg(long)]
        force: bool,
    },

    /// Link raw inventory text to canonical make, model, and part ids.
    Link {
        /// Remove a lock left behind by a crashed link pass.
        #[arg(long)]
        break_lock: bool,
    },

    /// List canonical makes.
    Makes,

    /// List the models of a make that have inventory or catalog data.
    Models { make_id: String },

    /// List the years with data for a model, newest first.
    Years { make_id: String, model_id: String },

    /// List the parts available for a model and year.
    Parts {
        make_id: String,
        model_id: String,
        year: String,
    },

    /// Resolve interchange numbers for a year, make, model, and part.
    Resolve {
        year: String,
        make_id: String,
        model_id: String,
        part_id: String,
    },

    /// Print years and parts for every model of a make.
    Tree { make_id: String },

    /// Report models without years and years without parts.
    Audit {
        /// Only audit this make.
        #[arg(long = "make")]
        make_id: Option<i64>,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    observability::init_logging(cfg.logging.log_format());

    let json = cli.json;
    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Load { path, force } => {
            load::run_load(&cfg, &path, force).await?;
        }
        Commands::Link { break_lock } => {
            link::run_link(&cfg, break_lock, json).await?;
        }
        Commands::Makes => {
            query::run_makes(&cfg, json).await?;
        }
        Commands::Models { make_id } => {
            query::run_models(&cfg, &make_id, json).await?;
        }
        Commands::Years { make_id, model_id } => {
            query::run_years(&cfg, &make_id, &model_id, json).await?;
        }
        Commands::Parts {
            make_id,
            model_id,
            year,
        } => {
            query::run_parts(&cfg, &make_id, &model_id, &year, json).await?;
        }
        Commands::Resolve {
            year,
            make_id,
            model_id,
            part_id,
        } => {
            query::run_resolve(&cfg, &year, &make_id, &model_id, &part_id, json).await?;
        }
        Commands::Tree { make_id } => {
            query::run_tree(&cfg, &make_id, json).await?;
        }
        Commands::Audit { make_id } => {
            audit::run_audit(&cfg, make_id, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
