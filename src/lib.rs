//! # Interchange Resolver
//!
//! Resolves the Hollander interchange number for a vehicle part from two
//! independently authored datasets: a structured inventory keyed by
//! canonical make/model/part ids, and a legacy catalog keyed by free-text
//! reference keys and numeric part codes.
//!
//! The engine drives a cascading picker (Make → Model → Year → Part). Each
//! step offers only options backed by some data, but the two sources are
//! not cross-checked, so dead ends can remain: a listed model whose catalog
//! rows fall outside the year bounds, or a year with no selectable part.
//! `ixr audit` reports them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │ JSON snapshot│──▶│ load + link  │──▶│ SQLite reference │
//! └──────────────┘   └──────────────┘   │      tables      │
//!                                       └────────┬─────────┘
//!                                                │ ReferenceStore
//!                                          ┌─────▼─────┐
//!                                          │  Engine   │
//!                                          └─────┬─────┘
//!                                 ┌──────────────┼──────────────┐
//!                                 ▼              ▼              ▼
//!                            ┌─────────┐   ┌──────────┐   ┌──────────┐
//!                            │   CLI   │   │   HTTP   │   │  audit   │
//!                            │  (ixr)  │   │  (axum)  │   │          │
//!                            └─────────┘   └──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ixr init                       # create database
//! ixr load snapshot.json         # import reference data
//! ixr link                       # link raw inventory text to ids
//! ixr years 6 60                 # years for a make/model
//! ixr resolve 2013 6 60 1        # interchange numbers
//! ixr serve                      # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`matching`] | Name matching and year-range rules |
//! | [`engine`] | Resolution engine |
//! | [`store`] | Reference-data storage trait and backends |
//! | [`load`] | Snapshot import |
//! | [`link`] | Offline foreign-key linking |
//! | [`audit`] | Dead-end report |
//! | [`query`] | CLI picker commands |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`error`] | Engine error type |
//! | [`observability`] | Logging setup |

pub mod audit;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod link;
pub mod load;
pub mod matching;
pub mod migrate;
pub mod models;
pub mod observability;
pub mod query;
pub mod server;
pub mod store;
