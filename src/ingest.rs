//! Load pipeline orchestration.
//!
//! Coordinates the full load flow: file selection → normalization →
//! validation → upload. Everything is decoded before the first table is
//! written. Tables are uploaded parents-first; the first failed upload
//! aborts the run and tables already written stay written. Files are
//! recorded as loaded only after the last table succeeds, so an aborted
//! run is retried in full by the next append, where identity
//! reconciliation keeps the rows already written from being duplicated.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::Config;
use crate::identity::IdentityAllocator;
use crate::models::UnresolvedClassification;
use crate::normalize::{normalize_files, NormalizeOptions, NormalizeSummary};
use crate::progress::{LoadProgressEvent, LoadProgressReporter};
use crate::schema::Table;
use crate::select::{list_candidates, select_unprocessed, SourceFile};
use crate::validate::{validate_all, ValidateOptions, ValidationReport};
use crate::warehouse::{SqliteWarehouse, Warehouse, WriteMode};

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub mode: WriteMode,
    pub dry_run: bool,
    pub limit: Option<usize>,
    pub reconcile_identity: bool,
    pub normalize: NormalizeOptions,
    pub validate: ValidateOptions,
    /// Where to write the JSON run report, if anywhere.
    pub report_path: Option<PathBuf>,
}

impl LoadOptions {
    pub fn from_config(config: &Config, mode: WriteMode) -> Self {
        Self {
            mode,
            dry_run: false,
            limit: None,
            reconcile_identity: config.ingest.reconcile_identity,
            normalize: NormalizeOptions {
                location: config.ingest.location.clone(),
            },
            validate: ValidateOptions {
                confidence_default: config.validate.confidence_default,
            },
            report_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadedTable {
    pub table: Table,
    pub rows: u64,
}

#[derive(Debug, Serialize)]
pub struct LoadOutcome {
    pub mode: WriteMode,
    pub dry_run: bool,
    pub files: Vec<String>,
    pub summary: NormalizeSummary,
    pub validation: ValidationReport,
    pub unresolved: Vec<UnresolvedClassification>,
    pub loaded: Vec<LoadedTable>,
}

/// Candidate files for a run under `mode`. Append runs skip files whose
/// every table uploaded in an earlier run.
pub async fn select_files(
    warehouse: &dyn Warehouse,
    data_dir: &Path,
    include_globs: &[String],
    mode: WriteMode,
) -> Result<Vec<SourceFile>> {
    let candidates = list_candidates(data_dir, include_globs)?;
    match mode {
        WriteMode::Append => {
            let processed = warehouse.processed_source_files().await?;
            Ok(select_unprocessed(candidates, &processed))
        }
        WriteMode::Replace | WriteMode::Fail => Ok(candidates),
    }
}

async fn allocator_for(
    warehouse: &dyn Warehouse,
    options: &LoadOptions,
) -> Result<IdentityAllocator> {
    match options.mode {
        WriteMode::Append if options.reconcile_identity => {
            let snapshot = warehouse
                .identity_snapshot()
                .await
                .context("Failed to read existing ids from the warehouse")?;
            Ok(IdentityAllocator::from_snapshot(&snapshot))
        }
        WriteMode::Append => {
            warn!("identity reconciliation is off; ids restart at 1 and may collide with loaded rows");
            Ok(IdentityAllocator::new())
        }
        WriteMode::Replace | WriteMode::Fail => Ok(IdentityAllocator::new()),
    }
}

#[derive(Serialize)]
struct LoadReport<'a> {
    mode: WriteMode,
    dry_run: bool,
    files: &'a [String],
    summary: &'a NormalizeSummary,
    validation: &'a ValidationReport,
    unresolved: &'a [UnresolvedClassification],
}

fn write_report(path: &Path, outcome: &LoadOutcome) -> Result<()> {
    let report = LoadReport {
        mode: outcome.mode,
        dry_run: outcome.dry_run,
        files: &outcome.files,
        summary: &outcome.summary,
        validation: &outcome.validation,
        unresolved: &outcome.unresolved,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("Failed to write report: {}", path.display()))
}

/// Normalize, validate and upload `data_dir` into `warehouse`.
pub async fn load_pipeline(
    warehouse: &dyn Warehouse,
    data_dir: &Path,
    include_globs: &[String],
    options: &LoadOptions,
    progress: &dyn LoadProgressReporter,
) -> Result<LoadOutcome> {
    if !options.dry_run {
        warehouse.ensure_schema().await?;
    }

    progress.report(LoadProgressEvent::Selecting);
    let mut files = select_files(warehouse, data_dir, include_globs, options.mode).await?;
    if let Some(limit) = options.limit {
        files.truncate(limit);
    }
    info!(files = files.len(), mode = %options.mode, "selected files");

    let allocator = allocator_for(warehouse, options).await?;
    let batch = normalize_files(&files, allocator, options.normalize.clone(), progress);

    if options.mode == WriteMode::Replace && !options.dry_run && batch.summary.files_normalized == 0
    {
        bail!("No files normalized; refusing to replace warehouse contents with nothing");
    }

    let (batches, validation) = validate_all(batch.tables.to_batches(), &options.validate);

    let mut outcome = LoadOutcome {
        mode: options.mode,
        dry_run: options.dry_run,
        files: files.into_iter().map(|f| f.name).collect(),
        summary: batch.summary,
        validation,
        unresolved: batch.unresolved,
        loaded: Vec::new(),
    };

    if let Some(path) = &options.report_path {
        write_report(path, &outcome)?;
    }

    if options.dry_run {
        return Ok(outcome);
    }

    let to_load: Vec<_> = batches
        .iter()
        .filter(|b| !b.is_empty() || options.mode == WriteMode::Replace)
        .collect();
    let total = to_load.len() as u64;

    // A replace that aborts partway must leave no file marked as loaded.
    if options.mode == WriteMode::Replace {
        warehouse
            .record_loaded_files(&[], WriteMode::Replace)
            .await
            .context("Failed to reset the loaded-file record")?;
    }

    for (i, table_batch) in to_load.into_iter().enumerate() {
        progress.report(LoadProgressEvent::Uploading {
            table: table_batch.table.name().to_string(),
            rows: table_batch.len() as u64,
            n: i as u64 + 1,
            total,
        });
        let rows = warehouse
            .load(table_batch, options.mode)
            .await
            .with_context(|| {
                format!(
                    "Upload aborted at {}; tables loaded before it remain loaded and the files stay pending",
                    table_batch.table
                )
            })?;
        info!(table = %table_batch.table, rows, "loaded");
        outcome.loaded.push(LoadedTable {
            table: table_batch.table,
            rows,
        });
    }

    let skipped: HashSet<&str> = outcome
        .summary
        .files_skipped
        .iter()
        .map(|s| s.file.as_str())
        .collect();
    let normalized: Vec<String> = outcome
        .files
        .iter()
        .filter(|f| !skipped.contains(f.as_str()))
        .cloned()
        .collect();
    warehouse
        .record_loaded_files(&normalized, options.mode)
        .await
        .context("Tables loaded, but recording the loaded files failed")?;

    Ok(outcome)
}

/// Unresolved classifications listed in the summary; `--report` has all.
const MAX_LISTED_UNRESOLVED: usize = 20;

fn print_summary(outcome: &LoadOutcome) {
    let s = &outcome.summary;
    if outcome.dry_run {
        println!("load {} (dry-run)", outcome.mode);
    } else {
        println!("load {}", outcome.mode);
    }
    println!("  files selected: {}", outcome.files.len());
    println!("  files normalized: {}", s.files_normalized);
    println!("  files skipped: {}", s.files_skipped.len());
    for skipped in &s.files_skipped {
        println!("    {}: {}", skipped.file, skipped.reason);
    }
    for table in Table::ALL {
        println!("  {} rows: {}", table, s.counts.get(table));
    }
    println!("  unresolved classifications: {}", s.unresolved);
    for u in outcome.unresolved.iter().take(MAX_LISTED_UNRESOLVED) {
        println!(
            "    {} ({}) at {}/{}/{} in {}",
            u.filename, u.category, u.segment, u.drive, u.camera, u.source_file
        );
    }
    if outcome.unresolved.len() > MAX_LISTED_UNRESOLVED {
        println!(
            "    ... and {} more",
            outcome.unresolved.len() - MAX_LISTED_UNRESOLVED
        );
    }
    println!("  unrecognized keys: {}", s.unrecognized_keys);
    println!("  shape warnings: {}", s.shape_warnings.len());
    println!(
        "  validation: {} filled, {} dropped",
        outcome.validation.total_filled(),
        outcome.validation.total_dropped()
    );
    if !outcome.dry_run {
        let written: u64 = outcome.loaded.iter().map(|t| t.rows).sum();
        println!(
            "  rows written: {} across {} tables",
            written,
            outcome.loaded.len()
        );
    }
}

/// Run `roadlog load`.
pub async fn run_load(
    config: &Config,
    mode: Option<WriteMode>,
    dry_run: bool,
    limit: Option<usize>,
    report: Option<PathBuf>,
    progress: &dyn LoadProgressReporter,
) -> Result<()> {
    let mode = match mode {
        Some(m) => m,
        None => config.ingest.write_mode()?,
    };
    let mut options = LoadOptions::from_config(config, mode);
    options.dry_run = dry_run;
    options.limit = limit;
    options.report_path = report;

    let warehouse = SqliteWarehouse::open(config).await?;
    let result = load_pipeline(
        &warehouse,
        &config.ingest.data_dir,
        &config.ingest.include_globs,
        &options,
        progress,
    )
    .await;
    warehouse.close().await;

    let outcome = result?;
    print_summary(&outcome);
    println!("ok");
    Ok(())
}

/// Run `roadlog pending`: list files the next append run would load.
pub async fn run_pending(config: &Config) -> Result<()> {
    let warehouse = SqliteWarehouse::open(config).await?;
    let files = select_files(
        &warehouse,
        &config.ingest.data_dir,
        &config.ingest.include_globs,
        WriteMode::Append,
    )
    .await;
    warehouse.close().await;

    let files = files?;
    for f in &files {
        println!("{}", f.name);
    }
    println!("{} pending", files.len());
    Ok(())
}
