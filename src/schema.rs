//! The fixed warehouse schema.
//!
//! Every table the pipeline writes is described here once. The
//! definitions drive DDL generation, bulk-load column lists, and the
//! validator's critical-column checks, so the three can never drift
//! apart.

use serde::Serialize;

/// One of the seven normalized output tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Segments,
    Drives,
    Cameras,
    Images,
    CameraImages,
    Categories,
    ImageCategories,
}

impl Table {
    /// All tables in load order: parents before the rows referencing them.
    pub const ALL: [Table; 7] = [
        Table::Segments,
        Table::Drives,
        Table::Cameras,
        Table::Images,
        Table::CameraImages,
        Table::Categories,
        Table::ImageCategories,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Segments => "segments",
            Table::Drives => "drives",
            Table::Cameras => "cameras",
            Table::Images => "images",
            Table::CameraImages => "camera_images",
            Table::Categories => "categories",
            Table::ImageCategories => "image_categories",
        }
    }

    pub fn from_name(name: &str) -> Option<Table> {
        Table::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn def(self) -> &'static TableDef {
        match self {
            Table::Segments => &SEGMENTS,
            Table::Drives => &DRIVES,
            Table::Cameras => &CAMERAS,
            Table::Images => &IMAGES,
            Table::CameraImages => &CAMERA_IMAGES,
            Table::Categories => &CATEGORIES,
            Table::ImageCategories => &IMAGE_CATEGORIES,
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Logical column type. Dates and timestamps are stored as ISO text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Date,
    Timestamp,
}

impl ColumnType {
    pub fn sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }
}

#[derive(Debug)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    /// Rows with a null here are rejected before load.
    pub critical: bool,
}

#[derive(Debug)]
pub struct TableDef {
    pub table: Table,
    pub columns: &'static [ColumnDef],
}

impl TableDef {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn critical_indices(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.critical)
            .map(|(i, _)| i)
            .collect()
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this table.
    pub fn create_sql(&self) -> String {
        let cols = self
            .columns
            .iter()
            .map(|c| {
                if c.critical {
                    format!("    {} {} NOT NULL", c.name, c.ty.sql())
                } else {
                    format!("    {} {}", c.name, c.ty.sql())
                }
            })
            .collect::<Vec<_>>()
            .join(",\n");
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            self.table.name(),
            cols
        )
    }
}

const fn col(name: &'static str, ty: ColumnType, critical: bool) -> ColumnDef {
    ColumnDef { name, ty, critical }
}

use ColumnType::{Date, Integer, Real, Text, Timestamp};

static SEGMENTS: TableDef = TableDef {
    table: Table::Segments,
    columns: &[
        col("Segment_ID", Integer, true),
        col("Name", Text, true),
        col("Location", Text, false),
        col("Date_Recorded", Date, false),
        col("Source_File", Text, true),
    ],
};

static DRIVES: TableDef = TableDef {
    table: Table::Drives,
    columns: &[
        col("Drive_ID", Integer, true),
        col("Name", Text, true),
        col("Segment_ID", Integer, true),
        col("Dir_Day", Text, false),
        col("Dir_Pass", Text, false),
        col("Time_Driven", Timestamp, false),
        col("Source_File", Text, true),
    ],
};

static CAMERAS: TableDef = TableDef {
    table: Table::Cameras,
    columns: &[
        col("Camera_ID", Integer, true),
        col("Drive_ID", Integer, true),
        col("Name", Text, true),
    ],
};

static IMAGES: TableDef = TableDef {
    table: Table::Images,
    columns: &[
        col("Image_ID", Integer, true),
        col("Filename", Text, true),
        col("Type", Text, true),
        col("Timestamp", Timestamp, false),
    ],
};

static CAMERA_IMAGES: TableDef = TableDef {
    table: Table::CameraImages,
    columns: &[
        col("ID", Integer, true),
        col("Camera_ID", Integer, true),
        col("Image_ID", Integer, true),
    ],
};

static CATEGORIES: TableDef = TableDef {
    table: Table::Categories,
    columns: &[col("Category_ID", Integer, true), col("Name", Text, true)],
};

static IMAGE_CATEGORIES: TableDef = TableDef {
    table: Table::ImageCategories,
    columns: &[
        col("ID", Integer, true),
        col("Image_ID", Integer, true),
        col("Category_ID", Integer, true),
        col("Confidence", Real, false),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names_round_trip() {
        for table in Table::ALL {
            assert_eq!(Table::from_name(table.name()), Some(table));
            assert_eq!(table.def().table, table);
        }
        assert_eq!(Table::from_name("documents"), None);
    }

    #[test]
    fn test_critical_columns() {
        let def = Table::ImageCategories.def();
        let critical: Vec<&str> = def
            .critical_indices()
            .into_iter()
            .map(|i| def.columns[i].name)
            .collect();
        assert_eq!(critical, vec!["ID", "Image_ID", "Category_ID"]);
    }

    #[test]
    fn test_create_sql() {
        let sql = Table::Categories.def().create_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS categories"));
        assert!(sql.contains("Category_ID INTEGER NOT NULL"));
        assert!(sql.contains("Name TEXT NOT NULL"));
    }

    #[test]
    fn test_nullable_dates() {
        let sql = Table::Segments.def().create_sql();
        assert!(sql.contains("Date_Recorded DATE\n") || sql.contains("Date_Recorded DATE,"));
    }
}
