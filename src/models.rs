//! Core data models used throughout roadlog.
//!
//! Typed rows are what the decoder produces. Before validation and load
//! they are flattened into [`TableBatch`]es of [`Cell`]s laid out in the
//! column order of [`crate::schema`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::schema::Table;

/// Text format for `TIMESTAMP` columns. Sorts lexicographically.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
/// Text format for `DATE` columns.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Image stream a filename was listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Color,
    Depth,
}

impl ImageType {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageType::Color => "color",
            ImageType::Depth => "depth",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRow {
    pub segment_id: i64,
    pub name: String,
    pub location: String,
    pub date_recorded: Option<NaiveDate>,
    pub source_file: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriveRow {
    pub drive_id: i64,
    pub name: String,
    pub segment_id: i64,
    pub dir_day: Option<String>,
    pub dir_pass: Option<String>,
    pub time_driven: Option<DateTime<Utc>>,
    pub source_file: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraRow {
    pub camera_id: i64,
    pub drive_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRow {
    pub image_id: i64,
    pub filename: String,
    pub image_type: ImageType,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraImageRow {
    pub id: i64,
    pub camera_id: i64,
    pub image_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRow {
    pub category_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageCategoryRow {
    pub id: i64,
    pub image_id: i64,
    pub category_id: i64,
    /// Never present in source data; filled by the validator.
    pub confidence: Option<f64>,
}

/// A classification path whose filename was not among the images walked
/// in the same document. No `image_categories` row is created for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedClassification {
    pub filename: String,
    pub category: String,
    pub segment: String,
    pub drive: String,
    pub camera: String,
    pub source_file: String,
}

/// The seven output tables accumulated over one batch.
#[derive(Debug, Clone, Default)]
pub struct NormalizedTables {
    pub segments: Vec<SegmentRow>,
    pub drives: Vec<DriveRow>,
    pub cameras: Vec<CameraRow>,
    pub images: Vec<ImageRow>,
    pub camera_images: Vec<CameraImageRow>,
    pub categories: Vec<CategoryRow>,
    pub image_categories: Vec<ImageCategoryRow>,
}

impl NormalizedTables {
    pub fn counts(&self) -> TableCounts {
        TableCounts {
            segments: self.segments.len(),
            drives: self.drives.len(),
            cameras: self.cameras.len(),
            images: self.images.len(),
            camera_images: self.camera_images.len(),
            categories: self.categories.len(),
            image_categories: self.image_categories.len(),
        }
    }

    /// Flatten into one batch per table, in load order.
    pub fn to_batches(&self) -> Vec<TableBatch> {
        vec![
            TableBatch::from_rows(&self.segments),
            TableBatch::from_rows(&self.drives),
            TableBatch::from_rows(&self.cameras),
            TableBatch::from_rows(&self.images),
            TableBatch::from_rows(&self.camera_images),
            TableBatch::from_rows(&self.categories),
            TableBatch::from_rows(&self.image_categories),
        ]
    }
}

/// Row counts per output table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub segments: usize,
    pub drives: usize,
    pub cameras: usize,
    pub images: usize,
    pub camera_images: usize,
    pub categories: usize,
    pub image_categories: usize,
}

impl TableCounts {
    pub fn get(&self, table: Table) -> usize {
        match table {
            Table::Segments => self.segments,
            Table::Drives => self.drives,
            Table::Cameras => self.cameras,
            Table::Images => self.images,
            Table::CameraImages => self.camera_images,
            Table::Categories => self.categories,
            Table::ImageCategories => self.image_categories,
        }
    }
}

/// A single column value on its way to (or back from) the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Integer(v) => Some(*v),
            Cell::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            Cell::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Integer(v) => Some(*v as f64),
            Cell::Real(v) => Some(*v),
            Cell::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            other => Some(other.to_string()),
        }
    }

    fn text(value: &str) -> Cell {
        Cell::Text(value.to_string())
    }

    fn opt_text(value: &Option<String>) -> Cell {
        value.as_deref().map(Cell::text).unwrap_or(Cell::Null)
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Null => f.write_str("NULL"),
            Cell::Integer(v) => write!(f, "{}", v),
            Cell::Real(v) => write!(f, "{}", v),
            Cell::Text(s) => f.write_str(s),
            Cell::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Cell::Timestamp(t) => write!(f, "{}", t.format(TIMESTAMP_FORMAT)),
        }
    }
}

/// A typed row that knows its table and column layout.
pub trait TableRow {
    const TABLE: Table;

    /// Values in the column order of `TABLE.def()`.
    fn cells(&self) -> Vec<Cell>;
}

impl TableRow for SegmentRow {
    const TABLE: Table = Table::Segments;

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Integer(self.segment_id),
            Cell::text(&self.name),
            Cell::text(&self.location),
            self.date_recorded.map(Cell::Date).unwrap_or(Cell::Null),
            Cell::text(&self.source_file),
        ]
    }
}

impl TableRow for DriveRow {
    const TABLE: Table = Table::Drives;

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Integer(self.drive_id),
            Cell::text(&self.name),
            Cell::Integer(self.segment_id),
            Cell::opt_text(&self.dir_day),
            Cell::opt_text(&self.dir_pass),
            self.time_driven.map(Cell::Timestamp).unwrap_or(Cell::Null),
            Cell::text(&self.source_file),
        ]
    }
}

impl TableRow for CameraRow {
    const TABLE: Table = Table::Cameras;

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Integer(self.camera_id),
            Cell::Integer(self.drive_id),
            Cell::text(&self.name),
        ]
    }
}

impl TableRow for ImageRow {
    const TABLE: Table = Table::Images;

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Integer(self.image_id),
            Cell::text(&self.filename),
            Cell::text(self.image_type.as_str()),
            self.timestamp.map(Cell::Timestamp).unwrap_or(Cell::Null),
        ]
    }
}

impl TableRow for CameraImageRow {
    const TABLE: Table = Table::CameraImages;

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Integer(self.id),
            Cell::Integer(self.camera_id),
            Cell::Integer(self.image_id),
        ]
    }
}

impl TableRow for CategoryRow {
    const TABLE: Table = Table::Categories;

    fn cells(&self) -> Vec<Cell> {
        vec![Cell::Integer(self.category_id), Cell::text(&self.name)]
    }
}

impl TableRow for ImageCategoryRow {
    const TABLE: Table = Table::ImageCategories;

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Integer(self.id),
            Cell::Integer(self.image_id),
            Cell::Integer(self.category_id),
            self.confidence.map(Cell::Real).unwrap_or(Cell::Null),
        ]
    }
}

/// Rows for one table in schema column order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableBatch {
    pub table: Table,
    pub rows: Vec<Vec<Cell>>,
}

impl TableBatch {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            rows: Vec::new(),
        }
    }

    pub fn from_rows<R: TableRow>(rows: &[R]) -> Self {
        Self {
            table: R::TABLE,
            rows: rows.iter().map(R::cells).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in row `row`, if both exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.table.def().column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }
}

/// Result set of an ad-hoc warehouse query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl QueryResult {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cells_follow_schema_order() {
        let row = DriveRow {
            drive_id: 3,
            name: "driveA".to_string(),
            segment_id: 1,
            dir_day: Some("mon".to_string()),
            dir_pass: None,
            time_driven: Some(Utc.timestamp_opt(100, 0).unwrap()),
            source_file: "a.json".to_string(),
        };
        let batch = TableBatch::from_rows(std::slice::from_ref(&row));
        assert_eq!(batch.table, Table::Drives);
        assert_eq!(batch.rows[0].len(), Table::Drives.def().columns.len());
        assert_eq!(batch.get(0, "Drive_ID"), Some(&Cell::Integer(3)));
        assert_eq!(batch.get(0, "Dir_Pass"), Some(&Cell::Null));
        assert_eq!(batch.get(0, "Source_File"), Some(&Cell::Text("a.json".into())));
    }

    #[test]
    fn test_batches_cover_every_table_in_order() {
        let tables = NormalizedTables::default();
        let order: Vec<Table> = tables.to_batches().iter().map(|b| b.table).collect();
        assert_eq!(order, Table::ALL.to_vec());
    }

    #[test]
    fn test_timestamp_display_is_sortable() {
        let a = Cell::Timestamp(Utc.timestamp_opt(100, 0).unwrap()).to_string();
        let b = Cell::Timestamp(Utc.timestamp_opt(100, 500_000_000).unwrap()).to_string();
        assert_eq!(a, "1970-01-01 00:01:40");
        assert_eq!(b, "1970-01-01 00:01:40.500");
        assert!(a < b);
    }

    #[test]
    fn test_cell_accessors() {
        assert_eq!(Cell::Text("42".into()).as_i64(), Some(42));
        assert_eq!(Cell::Real(2.0).as_i64(), Some(2));
        assert_eq!(Cell::Null.as_text(), None);
        assert_eq!(Cell::Integer(7).as_f64(), Some(7.0));
    }
}
