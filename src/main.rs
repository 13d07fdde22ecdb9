//! # roadlog CLI
//!
//! The `roadlog` binary loads road-segment drive logs into a relational
//! warehouse and answers questions about them.
//!
//! ## Usage
//!
//! ```bash
//! roadlog --config ./config/roadlog.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `roadlog init` | Create the warehouse tables |
//! | `roadlog load` | Normalize new drive-log files and load them |
//! | `roadlog pending` | List files the next append run would load |
//! | `roadlog query "<sql>"` | Run SQL with bare table names |
//! | `roadlog query --quick <name>` | Run a canned query |
//! | `roadlog bench` | Time the benchmark queries |
//! | `roadlog stats` | Row counts and database size |
//! | `roadlog defects` | Defect summary joined to PASER ratings |
//!
//! ## Examples
//!
//! ```bash
//! # Create tables, then load everything not yet loaded
//! roadlog init
//! roadlog load
//!
//! # Rebuild the warehouse from every file, writing a run report
//! roadlog load --mode replace --report ./reports/rebuild.json
//!
//! # Images per defect category
//! roadlog query --quick images-per-category
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use roadlog::progress::ProgressMode;
use roadlog::warehouse::WriteMode;
use roadlog::{config, defects, ingest, migrate, query, stats};

/// roadlog: incremental ETL for road-segment drive logs and AI defect
/// classifications.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/roadlog.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "roadlog",
    about = "Incremental ETL for road-segment drive logs and AI defect classifications",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/roadlog.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the warehouse tables.
    ///
    /// Idempotent: existing tables and rows are left alone.
    Init,

    /// Normalize drive-log files and load them into the warehouse.
    ///
    /// In `append` mode only files with no rows in the warehouse yet are
    /// read, and new ids continue after the ones already loaded. `replace`
    /// reloads every file from scratch. `fail` refuses to write into
    /// non-empty tables.
    Load {
        /// Write mode: `append`, `replace`, or `fail`. Defaults to
        /// `[ingest].default_mode`.
        #[arg(long)]
        mode: Option<WriteMode>,

        /// Normalize and validate without writing to the warehouse.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of files to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Write a JSON report of skipped files, unresolved
        /// classifications and validation results.
        #[arg(long)]
        report: Option<PathBuf>,

        /// Progress on stderr. Defaults to `human` on a terminal, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// List the files the next append run would load.
    Pending,

    /// Run SQL against the warehouse.
    ///
    /// Bare table names after FROM, JOIN, INTO, UPDATE and TABLE are
    /// qualified with `[warehouse].dataset`.
    Query {
        /// SQL statement.
        sql: Option<String>,

        /// Run a canned query by name instead.
        #[arg(long)]
        quick: Option<String>,

        /// List canned queries.
        #[arg(long)]
        list: bool,

        /// Print the statement after qualification.
        #[arg(long)]
        show_sql: bool,

        /// Print rows as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Time the benchmark queries.
    Bench {
        /// Runs per query.
        #[arg(long, default_value_t = 3)]
        runs: usize,
    },

    /// Show per-table row counts and database size.
    Stats,

    /// Summarize classifications per segment, joined to PASER ratings.
    Defects {
        /// PASER JSON export. Defaults to `[paser].ratings_path`.
        #[arg(long)]
        paser: Option<PathBuf>,

        /// Print the full report as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Warehouse initialized successfully.");
        }
        Commands::Load {
            mode,
            dry_run,
            limit,
            report,
            progress,
        } => {
            let reporter = progress.unwrap_or_else(ProgressMode::default_for_tty).reporter();
            ingest::run_load(&cfg, mode, dry_run, limit, report, reporter.as_ref()).await?;
        }
        Commands::Pending => {
            ingest::run_pending(&cfg).await?;
        }
        Commands::Query {
            sql,
            quick,
            list,
            show_sql,
            json,
        } => {
            query::run_query(&cfg, sql, quick, list, show_sql, json).await?;
        }
        Commands::Bench { runs } => {
            query::run_bench(&cfg, runs).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Defects { paser, json } => {
            defects::run_defects(&cfg, paser, json).await?;
        }
    }

    Ok(())
}
