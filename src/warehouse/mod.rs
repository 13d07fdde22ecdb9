//! Storage abstraction for the normalized tables.
//!
//! The [`Warehouse`] trait covers everything the load pipeline and the
//! read-side commands need from a destination: schema creation, bulk
//! loads under a [`WriteMode`], the processed-file set used for
//! incremental runs, the identity snapshot used to continue id numbering,
//! and ad-hoc queries.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use crate::error::LoadError;
use crate::identity::{EntityKind, IdentitySnapshot, NaturalKey, RowKind};
use crate::models::{QueryResult, TableBatch};
use crate::schema::Table;

pub use memory::MemoryWarehouse;
pub use sqlite::SqliteWarehouse;

/// How a bulk load treats rows already in the destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Add rows, keep what is there.
    Append,
    /// Truncate, then load, in one transaction.
    Replace,
    /// Refuse to load into a table that already has rows.
    Fail,
}

impl WriteMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteMode::Append => "append",
            WriteMode::Replace => "replace",
            WriteMode::Fail => "fail",
        }
    }
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "append" => Ok(WriteMode::Append),
            "replace" => Ok(WriteMode::Replace),
            "fail" => Ok(WriteMode::Fail),
            other => Err(format!(
                "mode must be 'append', 'replace', or 'fail', got '{}'",
                other
            )),
        }
    }
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for normalized tables.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Create any missing tables. Idempotent.
    async fn ensure_schema(&self) -> Result<()>;

    /// Write one table's rows under `mode`. Returns the number of rows
    /// written. Each call is atomic for its table.
    async fn load(&self, batch: &TableBatch, mode: WriteMode) -> Result<u64, LoadError>;

    /// Files recorded by [`Warehouse::record_loaded_files`]. A file whose
    /// upload aborted partway is not among them, so the next append run
    /// selects it again.
    async fn processed_source_files(&self) -> Result<HashSet<String>>;

    /// Remember `files` as loaded. A `replace` run forgets earlier files.
    async fn record_loaded_files(&self, files: &[String], mode: WriteMode) -> Result<()>;

    /// Natural keys and ids already loaded, for seeding an allocator.
    async fn identity_snapshot(&self) -> Result<IdentitySnapshot>;

    /// Run an already-qualified SQL statement.
    async fn query(&self, sql: &str) -> Result<QueryResult>;

    /// Row count of `table`, or `None` if the table does not exist.
    async fn row_count(&self, table: Table) -> Result<Option<i64>>;
}

/// Raw key columns read back from a warehouse.
#[derive(Debug, Default)]
pub struct LoadedKeys {
    /// (Segment_ID, Name)
    pub segments: Vec<(i64, String)>,
    /// (Drive_ID, Name, Segment_ID)
    pub drives: Vec<(i64, String, i64)>,
    /// (Camera_ID, Drive_ID, Name)
    pub cameras: Vec<(i64, i64, String)>,
    /// (Image_ID, Filename)
    pub images: Vec<(i64, String)>,
    /// (Category_ID, Name)
    pub categories: Vec<(i64, String)>,
    /// (Camera_ID, Image_ID)
    pub camera_images: Vec<(i64, i64)>,
    /// (Image_ID, Category_ID)
    pub image_categories: Vec<(i64, i64)>,
    pub max_camera_image_id: Option<i64>,
    pub max_image_category_id: Option<i64>,
}

impl LoadedKeys {
    /// Rebuild natural keys from the stored parent references.
    ///
    /// Drives and cameras whose parent row is missing cannot be keyed, but
    /// still count towards the id watermark.
    pub fn into_snapshot(self) -> IdentitySnapshot {
        let mut snapshot = IdentitySnapshot::default();

        let mut segment_names: HashMap<i64, &str> = HashMap::new();
        for (id, name) in &self.segments {
            segment_names.entry(*id).or_insert(name.as_str());
            snapshot
                .keys
                .push((EntityKind::Segment, NaturalKey::name(name), *id));
            bump(&mut snapshot.max_ids, EntityKind::Segment, *id);
        }

        let mut drive_keys: HashMap<i64, (&str, &str)> = HashMap::new();
        for (id, name, segment_id) in &self.drives {
            bump(&mut snapshot.max_ids, EntityKind::Drive, *id);
            let Some(&segment) = segment_names.get(segment_id) else {
                continue;
            };
            drive_keys.entry(*id).or_insert((segment, name.as_str()));
            snapshot
                .keys
                .push((EntityKind::Drive, NaturalKey::drive(segment, name), *id));
        }

        for (id, drive_id, name) in &self.cameras {
            bump(&mut snapshot.max_ids, EntityKind::Camera, *id);
            let Some(&(segment, drive)) = drive_keys.get(drive_id) else {
                continue;
            };
            snapshot.keys.push((
                EntityKind::Camera,
                NaturalKey::camera(segment, drive, name),
                *id,
            ));
        }

        for (id, filename) in &self.images {
            bump(&mut snapshot.max_ids, EntityKind::Image, *id);
            snapshot
                .keys
                .push((EntityKind::Image, NaturalKey::name(filename), *id));
        }

        for (id, name) in &self.categories {
            bump(&mut snapshot.max_ids, EntityKind::Category, *id);
            snapshot
                .keys
                .push((EntityKind::Category, NaturalKey::name(name), *id));
        }

        snapshot.links.extend(
            self.camera_images
                .iter()
                .map(|&(camera, image)| (RowKind::CameraImage, camera, image)),
        );
        snapshot.links.extend(
            self.image_categories
                .iter()
                .map(|&(image, category)| (RowKind::ImageCategory, image, category)),
        );

        if let Some(max) = self.max_camera_image_id {
            snapshot.max_row_ids.insert(RowKind::CameraImage, max);
        }
        if let Some(max) = self.max_image_category_id {
            snapshot.max_row_ids.insert(RowKind::ImageCategory, max);
        }

        snapshot
    }
}

fn bump(max_ids: &mut HashMap<EntityKind, i64>, kind: EntityKind, id: i64) {
    let entry = max_ids.entry(kind).or_insert(id);
    *entry = (*entry).max(id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityAllocator;

    #[test]
    fn test_write_mode_parse() {
        assert_eq!("append".parse::<WriteMode>().unwrap(), WriteMode::Append);
        assert_eq!("replace".parse::<WriteMode>().unwrap(), WriteMode::Replace);
        assert_eq!("fail".parse::<WriteMode>().unwrap(), WriteMode::Fail);
        let err = "APPEND".parse::<WriteMode>().unwrap_err();
        assert!(err.contains("'append', 'replace', or 'fail'"));
        assert_eq!(WriteMode::Replace.to_string(), "replace");
    }

    #[test]
    fn test_snapshot_rebuilds_composite_keys() {
        let keys = LoadedKeys {
            segments: vec![(1, "segment_1".into())],
            drives: vec![(1, "driveA".into(), 1), (7, "orphan".into(), 99)],
            cameras: vec![(3, 1, "cam1".into()), (4, 7, "cam2".into())],
            images: vec![(1, "100.0.jpg".into())],
            categories: vec![(2, "Health".into())],
            camera_images: vec![(3, 1)],
            image_categories: vec![(1, 2)],
            max_camera_image_id: Some(12),
            max_image_category_id: None,
        };
        let snapshot = keys.into_snapshot();
        let mut ids = IdentityAllocator::from_snapshot(&snapshot);

        assert_eq!(
            ids.lookup(EntityKind::Drive, &NaturalKey::drive("segment_1", "driveA")),
            Some(1)
        );
        assert_eq!(
            ids.lookup(
                EntityKind::Camera,
                &NaturalKey::camera("segment_1", "driveA", "cam1")
            ),
            Some(3)
        );
        // The orphan drive has no key but still raises the watermark.
        assert_eq!(ids.peek_next(EntityKind::Drive), 8);
        assert_eq!(ids.peek_next(EntityKind::Camera), 5);
        assert_eq!(ids.peek_next(EntityKind::Category), 3);
        assert!(ids.is_loaded_link(RowKind::CameraImage, 3, 1));
        assert!(ids.is_loaded_link(RowKind::ImageCategory, 1, 2));
        assert_eq!(ids.next_row_id(RowKind::CameraImage), 13);
        assert_eq!(ids.next_row_id(RowKind::ImageCategory), 1);
    }
}
