//! Pre-load validation of table batches.
//!
//! Fills the optional columns that have a fixed default and drops rows
//! missing a critical column. A dropped row means the decoder produced
//! something it should not have, so every drop is logged.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::models::{Cell, TableBatch};
use crate::schema::Table;

#[derive(Debug, Clone)]
pub struct ValidateOptions {
    pub confidence_default: f64,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            confidence_default: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TableValidation {
    pub table: Table,
    pub filled: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub tables: Vec<TableValidation>,
}

impl ValidationReport {
    pub fn get(&self, table: Table) -> Option<&TableValidation> {
        self.tables.iter().find(|t| t.table == table)
    }

    pub fn total_filled(&self) -> usize {
        self.tables.iter().map(|t| t.filled).sum()
    }

    pub fn total_dropped(&self) -> usize {
        self.tables.iter().map(|t| t.dropped).sum()
    }
}

fn default_for(column: &str, options: &ValidateOptions) -> Option<Cell> {
    match column {
        "Confidence" => Some(Cell::Real(options.confidence_default)),
        "Timestamp" => Some(Cell::Timestamp(DateTime::<Utc>::UNIX_EPOCH)),
        "Date_Recorded" => Some(Cell::Date(DateTime::<Utc>::UNIX_EPOCH.date_naive())),
        _ => None,
    }
}

/// Validate one table's rows.
pub fn validate_batch(batch: TableBatch, options: &ValidateOptions) -> (TableBatch, TableValidation) {
    let table = batch.table;
    let mut result = TableValidation {
        table,
        filled: 0,
        dropped: 0,
    };
    if batch.is_empty() {
        return (batch, result);
    }

    let def = table.def();
    let defaults: Vec<(usize, Cell)> = def
        .columns
        .iter()
        .enumerate()
        .filter_map(|(i, c)| default_for(c.name, options).map(|d| (i, d)))
        .collect();
    let critical = def.critical_indices();

    let mut rows = Vec::with_capacity(batch.rows.len());
    for mut row in batch.rows {
        for (i, default) in &defaults {
            if let Some(cell) = row.get_mut(*i) {
                if cell.is_null() {
                    *cell = default.clone();
                    result.filled += 1;
                }
            }
        }

        let missing: Vec<&str> = critical
            .iter()
            .filter(|&&i| row.get(i).map_or(true, Cell::is_null))
            .map(|&i| def.columns[i].name)
            .collect();
        if !missing.is_empty() {
            warn!(table = %table, columns = ?missing, "dropping row with null critical column");
            result.dropped += 1;
            continue;
        }

        rows.push(row);
    }

    (TableBatch { table, rows }, result)
}

/// Validate every batch, preserving order.
pub fn validate_all(
    batches: Vec<TableBatch>,
    options: &ValidateOptions,
) -> (Vec<TableBatch>, ValidationReport) {
    let mut report = ValidationReport::default();
    let validated = batches
        .into_iter()
        .map(|batch| {
            let (batch, result) = validate_batch(batch, options);
            report.tables.push(result);
            batch
        })
        .collect();
    (validated, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImageCategoryRow, ImageRow, ImageType, SegmentRow};

    fn image_categories() -> TableBatch {
        TableBatch::from_rows(&[
            ImageCategoryRow {
                id: 1,
                image_id: 4,
                category_id: 1,
                confidence: None,
            },
            ImageCategoryRow {
                id: 2,
                image_id: 5,
                category_id: 1,
                confidence: Some(0.9),
            },
        ])
    }

    #[test]
    fn test_confidence_default() {
        let (batch, result) = validate_batch(image_categories(), &ValidateOptions::default());
        assert_eq!(batch.get(0, "Confidence"), Some(&Cell::Real(0.0)));
        assert_eq!(batch.get(1, "Confidence"), Some(&Cell::Real(0.9)));
        assert_eq!(result.filled, 1);
        assert_eq!(result.dropped, 0);

        let opts = ValidateOptions {
            confidence_default: -1.0,
        };
        let (batch, _) = validate_batch(image_categories(), &opts);
        assert_eq!(batch.get(0, "Confidence"), Some(&Cell::Real(-1.0)));
    }

    #[test]
    fn test_null_critical_column_drops_row() {
        let mut batch = image_categories();
        batch.rows[0][1] = Cell::Null;

        let (batch, result) = validate_batch(batch, &ValidateOptions::default());
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.get(0, "ID"), Some(&Cell::Integer(2)));
        assert_eq!(result.dropped, 1);
    }

    #[test]
    fn test_epoch_sentinels() {
        let images = TableBatch::from_rows(&[ImageRow {
            image_id: 1,
            filename: "frame_a.jpg".into(),
            image_type: ImageType::Color,
            timestamp: None,
        }]);
        let (images, _) = validate_batch(images, &ValidateOptions::default());
        assert_eq!(
            images.get(0, "Timestamp").unwrap().to_string(),
            "1970-01-01 00:00:00"
        );

        let segments = TableBatch::from_rows(&[SegmentRow {
            segment_id: 1,
            name: "s".into(),
            location: "x".into(),
            date_recorded: None,
            source_file: "a.json".into(),
        }]);
        let (segments, result) = validate_batch(segments, &ValidateOptions::default());
        assert_eq!(
            segments.get(0, "Date_Recorded").unwrap().to_string(),
            "1970-01-01"
        );
        assert_eq!(result.filled, 1);
    }

    #[test]
    fn test_empty_passes_through() {
        let (batch, result) = validate_batch(
            TableBatch::new(Table::Drives),
            &ValidateOptions::default(),
        );
        assert!(batch.is_empty());
        assert_eq!(result.filled + result.dropped, 0);
    }

    #[test]
    fn test_validate_all_keeps_order_and_reports() {
        let batches = vec![TableBatch::new(Table::Segments), image_categories()];
        let (out, report) = validate_all(batches, &ValidateOptions::default());
        assert_eq!(out[0].table, Table::Segments);
        assert_eq!(out[1].table, Table::ImageCategories);
        assert_eq!(report.get(Table::ImageCategories).unwrap().filled, 1);
        assert_eq!(report.total_filled(), 1);
        assert_eq!(report.total_dropped(), 0);
    }
}
