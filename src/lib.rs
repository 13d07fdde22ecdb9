//! # roadlog
//!
//! Incremental ETL for road-segment drive logs and AI defect
//! classifications.
//!
//! Drive-log files are nested JSON documents (segment → drive → camera →
//! image lists and classification results). roadlog normalizes a batch of
//! them into seven relational tables with dense surrogate ids, validates
//! the rows, and bulk-loads them into a SQLite warehouse. Files already
//! loaded are skipped on the next append run, and new ids continue after
//! the ones already in the warehouse.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌───────────┐   ┌───────────┐
//! │  select    │──▶│  decode +   │──▶│ validate  │──▶│ warehouse │
//! │ new files  │   │  normalize  │   │           │   │  (SQLite) │
//! └────────────┘   └─────────────┘   └───────────┘   └─────┬─────┘
//!                                                          │
//!                              ┌───────────────┬───────────┤
//!                              ▼               ▼           ▼
//!                          ┌───────┐      ┌────────┐  ┌─────────┐
//!                          │ query │      │ stats  │  │ defects │
//!                          └───────┘      └────────┘  └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! roadlog init
//! roadlog load
//! roadlog query --quick top-categories
//! roadlog defects --paser ./data/paser.json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`schema`] | The seven output tables |
//! | [`models`] | Row types, cells and batches |
//! | [`timestamp`] | Capture time from image filenames |
//! | [`identity`] | Surrogate id allocation |
//! | [`decode`] | Drive-log document decoding |
//! | [`select`] | Input file discovery |
//! | [`normalize`] | Batch normalization |
//! | [`validate`] | Pre-load defaults and critical-column checks |
//! | [`warehouse`] | Storage abstraction (SQLite, in-memory) |
//! | [`ingest`] | Load pipeline orchestration |
//! | [`sql_rewrite`] | Dataset qualification for SQL |
//! | [`query`] | Ad-hoc, canned and benchmark queries |
//! | [`defects`] | Defect summary and PASER join |
//! | [`stats`] | Warehouse statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod config;
pub mod db;
pub mod decode;
pub mod defects;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod query;
pub mod schema;
pub mod select;
pub mod sql_rewrite;
pub mod stats;
pub mod timestamp;
pub mod validate;
pub mod warehouse;
