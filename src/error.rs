//! Typed errors for the places where callers branch on the failure.
//!
//! Everything else propagates as `anyhow::Error` with context.

use thiserror::Error;

/// A drive-log document does not have the expected shape.
///
/// Raised before any row is emitted, so a file that fails to decode
/// contributes nothing to the batch.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("expected an object at {path}, found {found}")]
    NotAnObject { path: String, found: &'static str },

    #[error("expected a list of filenames at {path}, found {found}")]
    NotAList { path: String, found: &'static str },

    #[error("expected a filename string at {path}, found {found}")]
    NotAString { path: String, found: &'static str },
}

/// A bulk load into the warehouse failed.
///
/// Loads are not retried here; tables loaded earlier in the same batch
/// stay loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("table {table} already holds {rows} rows (write mode 'fail')")]
    TableNotEmpty { table: &'static str, rows: i64 },

    #[error("loading {rows} rows into {table} failed: {source}")]
    Upload {
        table: &'static str,
        rows: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl LoadError {
    pub fn upload(
        table: &'static str,
        rows: usize,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Upload {
            table,
            rows,
            source: source.into(),
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            LoadError::TableNotEmpty { table, .. } | LoadError::Upload { table, .. } => table,
        }
    }
}
