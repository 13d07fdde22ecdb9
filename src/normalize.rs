//! Batch normalization: many drive-log files into one set of tables.
//!
//! All files of a run share one [`IdentityAllocator`], so an entity that
//! appears in several files is emitted once. A file that cannot be read,
//! parsed as JSON, or decoded is skipped whole and reported; the rest of
//! the batch continues.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::decode::{parse_document, DecodeOutput, Decoder};
use crate::error::DecodeError;
use crate::identity::IdentityAllocator;
use crate::models::{NormalizedTables, TableCounts, UnresolvedClassification};
use crate::progress::{LoadProgressEvent, LoadProgressReporter};
use crate::select::SourceFile;

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Value written to every new segment's `Location`.
    pub location: String,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            location: "Fort Wayne, IN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedFile {
    pub file: String,
    pub reason: String,
}

/// What happened to the batch, for the printed summary and `--report`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizeSummary {
    pub files_normalized: usize,
    pub files_skipped: Vec<SkippedFile>,
    pub counts: TableCounts,
    pub unresolved: usize,
    pub unrecognized_keys: usize,
    pub shape_warnings: Vec<String>,
}

#[derive(Debug)]
pub struct NormalizedBatch {
    pub tables: NormalizedTables,
    pub unresolved: Vec<UnresolvedClassification>,
    pub summary: NormalizeSummary,
}

pub struct BatchNormalizer {
    allocator: IdentityAllocator,
    out: DecodeOutput,
    options: NormalizeOptions,
    summary: NormalizeSummary,
}

impl BatchNormalizer {
    pub fn new(allocator: IdentityAllocator, options: NormalizeOptions) -> Self {
        Self {
            allocator,
            out: DecodeOutput::new(),
            options,
            summary: NormalizeSummary::default(),
        }
    }

    /// Decode one already-parsed document attributed to `source_file`.
    ///
    /// On error nothing from the document is kept.
    pub fn add_document(&mut self, source_file: &str, doc: &Value) -> Result<(), DecodeError> {
        let log = parse_document(doc)?;

        Decoder::new(&mut self.allocator, &mut self.out, &self.options.location)
            .ingest(&log, source_file);

        self.summary.files_normalized += 1;
        self.summary.unrecognized_keys += log.unrecognized_keys;
        for warning in log.warnings {
            warn!(file = source_file, "{}", warning);
            self.summary
                .shape_warnings
                .push(format!("{}: {}", source_file, warning));
        }
        debug!(
            file = source_file,
            segments = log.segments.len(),
            "normalized"
        );
        Ok(())
    }

    /// Read, parse and decode one file. Returns false if it was skipped.
    pub fn add_file(&mut self, file: &SourceFile) -> bool {
        let reason = match std::fs::read_to_string(&file.path) {
            Err(e) => format!("read failed: {}", e),
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Err(e) => format!("invalid JSON: {}", e),
                Ok(doc) => match self.add_document(&file.name, &doc) {
                    Ok(()) => return true,
                    Err(e) => e.to_string(),
                },
            },
        };
        self.skip(&file.name, reason);
        false
    }

    pub fn skip(&mut self, file: &str, reason: String) {
        warn!(file, %reason, "skipping file");
        self.summary.files_skipped.push(SkippedFile {
            file: file.to_string(),
            reason,
        });
    }

    pub fn finish(self) -> NormalizedBatch {
        let mut summary = self.summary;
        summary.counts = self.out.tables.counts();
        summary.unresolved = self.out.unresolved.len();
        NormalizedBatch {
            tables: self.out.tables,
            unresolved: self.out.unresolved,
            summary,
        }
    }
}

/// Normalize `files` in order with a shared allocator.
pub fn normalize_files(
    files: &[SourceFile],
    allocator: IdentityAllocator,
    options: NormalizeOptions,
    progress: &dyn LoadProgressReporter,
) -> NormalizedBatch {
    let mut normalizer = BatchNormalizer::new(allocator, options);
    let total = files.len() as u64;

    for (i, file) in files.iter().enumerate() {
        progress.report(LoadProgressEvent::Normalizing {
            file: file.name.clone(),
            n: i as u64 + 1,
            total,
        });
        normalizer.add_file(file);
    }

    normalizer.finish()
}
