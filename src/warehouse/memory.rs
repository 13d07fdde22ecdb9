//! In-memory [`Warehouse`] for tests and dry pipelines.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. SQL is not
//! supported; [`Warehouse::query`] always fails.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use super::{LoadedKeys, Warehouse, WriteMode};
use crate::error::LoadError;
use crate::identity::IdentitySnapshot;
use crate::models::{Cell, QueryResult, TableBatch};
use crate::schema::Table;

#[derive(Default)]
pub struct MemoryWarehouse {
    tables: RwLock<HashMap<Table, Vec<Vec<Cell>>>>,
    loaded_files: RwLock<HashSet<String>>,
    fail_on: Option<Table>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// A warehouse whose loads into `table` always fail.
    pub fn failing_on(table: Table) -> Self {
        Self {
            fail_on: Some(table),
            ..Self::default()
        }
    }

    /// Snapshot of the rows currently held for `table`.
    pub fn rows(&self, table: Table) -> Vec<Vec<Cell>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.get(&table).cloned().unwrap_or_default()
    }

    fn column<'a>(rows: &'a [Vec<Cell>], table: Table, name: &str) -> Vec<&'a Cell> {
        match table.def().column_index(name) {
            Some(i) => rows.iter().filter_map(|r| r.get(i)).collect(),
            None => Vec::new(),
        }
    }

    fn pairs(&self, table: Table, id: &str, name: &str) -> Vec<(i64, String)> {
        let rows = self.rows(table);
        Self::column(&rows, table, id)
            .into_iter()
            .zip(Self::column(&rows, table, name))
            .filter_map(|(id, name)| Some((id.as_i64()?, name.as_text()?)))
            .collect()
    }

    fn id_pairs(&self, table: Table, left: &str, right: &str) -> Vec<(i64, i64)> {
        let rows = self.rows(table);
        Self::column(&rows, table, left)
            .into_iter()
            .zip(Self::column(&rows, table, right))
            .filter_map(|(l, r)| Some((l.as_i64()?, r.as_i64()?)))
            .collect()
    }

    fn max_id(&self, table: Table) -> Option<i64> {
        let rows = self.rows(table);
        Self::column(&rows, table, "ID")
            .into_iter()
            .filter_map(Cell::as_i64)
            .max()
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn ensure_schema(&self) -> Result<()> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        for table in Table::ALL {
            tables.entry(table).or_default();
        }
        Ok(())
    }

    async fn load(&self, batch: &TableBatch, mode: WriteMode) -> Result<u64, LoadError> {
        let name = batch.table.name();
        if self.fail_on == Some(batch.table) {
            return Err(LoadError::upload(
                name,
                batch.len(),
                format!("injected failure for {}", name),
            ));
        }

        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let stored = tables.entry(batch.table).or_default();
        match mode {
            WriteMode::Append => {}
            WriteMode::Replace => stored.clear(),
            WriteMode::Fail if !stored.is_empty() => {
                return Err(LoadError::TableNotEmpty {
                    table: name,
                    rows: stored.len() as i64,
                })
            }
            WriteMode::Fail => {}
        }
        stored.extend(batch.rows.iter().cloned());
        Ok(batch.len() as u64)
    }

    async fn processed_source_files(&self) -> Result<HashSet<String>> {
        let loaded = self.loaded_files.read().unwrap_or_else(PoisonError::into_inner);
        Ok(loaded.clone())
    }

    async fn record_loaded_files(&self, files: &[String], mode: WriteMode) -> Result<()> {
        let mut loaded = self.loaded_files.write().unwrap_or_else(PoisonError::into_inner);
        if mode == WriteMode::Replace {
            loaded.clear();
        }
        loaded.extend(files.iter().cloned());
        Ok(())
    }

    async fn identity_snapshot(&self) -> Result<IdentitySnapshot> {
        let drives = self.rows(Table::Drives);
        let cameras = self.rows(Table::Cameras);
        let keys = LoadedKeys {
            segments: self.pairs(Table::Segments, "Segment_ID", "Name"),
            drives: Self::column(&drives, Table::Drives, "Drive_ID")
                .into_iter()
                .zip(Self::column(&drives, Table::Drives, "Name"))
                .zip(Self::column(&drives, Table::Drives, "Segment_ID"))
                .filter_map(|((id, name), seg)| Some((id.as_i64()?, name.as_text()?, seg.as_i64()?)))
                .collect(),
            cameras: Self::column(&cameras, Table::Cameras, "Camera_ID")
                .into_iter()
                .zip(Self::column(&cameras, Table::Cameras, "Drive_ID"))
                .zip(Self::column(&cameras, Table::Cameras, "Name"))
                .filter_map(|((id, drive), name)| Some((id.as_i64()?, drive.as_i64()?, name.as_text()?)))
                .collect(),
            images: self.pairs(Table::Images, "Image_ID", "Filename"),
            categories: self.pairs(Table::Categories, "Category_ID", "Name"),
            camera_images: self.id_pairs(Table::CameraImages, "Camera_ID", "Image_ID"),
            image_categories: self.id_pairs(Table::ImageCategories, "Image_ID", "Category_ID"),
            max_camera_image_id: self.max_id(Table::CameraImages),
            max_image_category_id: self.max_id(Table::ImageCategories),
        };
        Ok(keys.into_snapshot())
    }

    async fn query(&self, _sql: &str) -> Result<QueryResult> {
        bail!("the in-memory warehouse does not execute SQL")
    }

    async fn row_count(&self, table: Table) -> Result<Option<i64>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.get(&table).map(|rows| rows.len() as i64))
    }
}
