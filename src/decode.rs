//! Drive-log document decoding.
//!
//! A drive-log file maps segment names to drive names to drive objects:
//!
//! ```text
//! { "segment_0001": {
//!     "drive_03": {
//!       "dir_day": "mon", "dir_pass": 1,
//!       "cam1": {
//!         "color": ["1693412345.0.jpg", ...],
//!         "depth": ["1693412345.0.png", ...],
//!         "Classification_Swin": { "Alligator": ["D:\\run\\1693412345.0.jpg"] }
//!       },
//!       "cam2": { ... } } } }
//! ```
//!
//! Decoding happens in two steps. [`parse_document`] classifies every key
//! into a typed [`DriveLog`] without touching any shared state, so a
//! malformed file is rejected whole. [`Decoder::ingest`] then walks the
//! typed tree, allocating ids and appending rows to a [`DecodeOutput`]
//! that spans the whole batch.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::identity::{EntityKind, IdentityAllocator, NaturalKey, RowKind};
use crate::models::{
    CameraImageRow, CameraRow, CategoryRow, DriveRow, ImageCategoryRow, ImageRow, ImageType,
    NormalizedTables, SegmentRow, UnresolvedClassification,
};
use crate::timestamp::extract_timestamp;

const CAMERA_PREFIX: &str = "cam";
const CLASSIFICATION_KEY: &str = "Classification_Swin";

/// What a key inside a drive object means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveField {
    Camera,
    DirDay,
    DirPass,
    Unrecognized,
}

impl DriveField {
    pub fn classify(key: &str) -> Self {
        match key {
            "dir_day" => DriveField::DirDay,
            "dir_pass" => DriveField::DirPass,
            k if k.starts_with(CAMERA_PREFIX) => DriveField::Camera,
            _ => DriveField::Unrecognized,
        }
    }
}

/// What a key inside a camera object means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraField {
    Color,
    Depth,
    Classification,
    Unrecognized,
}

impl CameraField {
    pub fn classify(key: &str) -> Self {
        match key {
            "color" => CameraField::Color,
            "depth" => CameraField::Depth,
            CLASSIFICATION_KEY => CameraField::Classification,
            _ => CameraField::Unrecognized,
        }
    }
}

/// One parsed drive-log document.
#[derive(Debug, Clone, Default)]
pub struct DriveLog {
    pub segments: Vec<SegmentLog>,
    /// Keys that were neither cameras, metadata, nor image lists.
    pub unrecognized_keys: usize,
    /// Tolerated shape problems, e.g. a camera key holding a non-object.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SegmentLog {
    pub name: String,
    pub drives: Vec<DriveEntry>,
}

#[derive(Debug, Clone)]
pub struct DriveEntry {
    pub name: String,
    pub dir_day: Option<String>,
    pub dir_pass: Option<String>,
    pub cameras: Vec<CameraEntry>,
}

#[derive(Debug, Clone)]
pub struct CameraEntry {
    pub name: String,
    pub color: Vec<String>,
    pub depth: Vec<String>,
    /// Category label to classified file paths, in source order.
    pub classifications: Vec<(String, Vec<String>)>,
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, DecodeError> {
    value.as_object().ok_or_else(|| DecodeError::NotAnObject {
        path: path.to_string(),
        found: kind_of(value),
    })
}

fn string_list(value: &Value, path: &str) -> Result<Vec<String>, DecodeError> {
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => {
            return Err(DecodeError::NotAList {
                path: path.to_string(),
                found: kind_of(other),
            })
        }
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(DecodeError::NotAString {
                path: format!("{}[{}]", path, i),
                found: kind_of(other),
            }),
        })
        .collect()
}

/// Metadata values may be strings or numbers in the source.
fn metadata_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Classify a whole document into a [`DriveLog`].
pub fn parse_document(doc: &Value) -> Result<DriveLog, DecodeError> {
    let mut log = DriveLog::default();

    for (segment_name, segment_value) in as_object(doc, "$")? {
        let segment_path = format!("$.{}", segment_name);
        let mut drives = Vec::new();

        for (drive_name, drive_value) in as_object(segment_value, &segment_path)? {
            let drive_path = format!("{}.{}", segment_path, drive_name);
            drives.push(parse_drive(drive_name, drive_value, &drive_path, &mut log)?);
        }

        log.segments.push(SegmentLog {
            name: segment_name.clone(),
            drives,
        });
    }

    Ok(log)
}

fn parse_drive(
    name: &str,
    value: &Value,
    path: &str,
    log: &mut DriveLog,
) -> Result<DriveEntry, DecodeError> {
    let mut entry = DriveEntry {
        name: name.to_string(),
        dir_day: None,
        dir_pass: None,
        cameras: Vec::new(),
    };

    for (key, field_value) in as_object(value, path)? {
        match DriveField::classify(key) {
            DriveField::DirDay => entry.dir_day = metadata_text(field_value),
            DriveField::DirPass => entry.dir_pass = metadata_text(field_value),
            DriveField::Camera => {
                let camera_path = format!("{}.{}", path, key);
                entry
                    .cameras
                    .push(parse_camera(key, field_value, &camera_path, log)?);
            }
            DriveField::Unrecognized => log.unrecognized_keys += 1,
        }
    }

    Ok(entry)
}

fn parse_camera(
    name: &str,
    value: &Value,
    path: &str,
    log: &mut DriveLog,
) -> Result<CameraEntry, DecodeError> {
    let mut entry = CameraEntry {
        name: name.to_string(),
        color: Vec::new(),
        depth: Vec::new(),
        classifications: Vec::new(),
    };

    // A camera slot without an object body keeps its row but has no images.
    let Some(fields) = value.as_object() else {
        log.warnings
            .push(format!("{} is {}, expected an object", path, kind_of(value)));
        return Ok(entry);
    };

    for (key, field_value) in fields {
        let field_path = format!("{}.{}", path, key);
        match CameraField::classify(key) {
            CameraField::Color => entry.color = string_list(field_value, &field_path)?,
            CameraField::Depth => entry.depth = string_list(field_value, &field_path)?,
            CameraField::Classification => {
                for (category, paths) in as_object(field_value, &field_path)? {
                    let list_path = format!("{}.{}", field_path, category);
                    entry
                        .classifications
                        .push((category.clone(), string_list(paths, &list_path)?));
                }
            }
            CameraField::Unrecognized => log.unrecognized_keys += 1,
        }
    }

    Ok(entry)
}

/// Strip a `\`-separated directory prefix from a classified file path.
pub fn bare_filename(path: &str) -> &str {
    path.rsplit('\\').next().unwrap_or(path)
}

/// Rows and reports accumulated across every document of a batch.
#[derive(Debug, Default)]
pub struct DecodeOutput {
    pub tables: NormalizedTables,
    pub unresolved: Vec<UnresolvedClassification>,
    segment_rows: HashMap<i64, usize>,
    drive_rows: HashMap<i64, usize>,
}

impl DecodeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an image timestamp into the segment's and drive's minimum.
    fn observe(&mut self, segment_id: i64, drive_id: i64, ts: chrono::DateTime<chrono::Utc>) {
        if let Some(&idx) = self.segment_rows.get(&segment_id) {
            let row = &mut self.tables.segments[idx];
            let date = ts.date_naive();
            row.date_recorded = Some(row.date_recorded.map_or(date, |d| d.min(date)));
        }
        if let Some(&idx) = self.drive_rows.get(&drive_id) {
            let row = &mut self.tables.drives[idx];
            row.time_driven = Some(row.time_driven.map_or(ts, |t| t.min(ts)));
        }
    }
}

/// Walks parsed documents into the shared id space.
pub struct Decoder<'a> {
    allocator: &'a mut IdentityAllocator,
    out: &'a mut DecodeOutput,
    location: &'a str,
}

impl<'a> Decoder<'a> {
    pub fn new(
        allocator: &'a mut IdentityAllocator,
        out: &'a mut DecodeOutput,
        location: &'a str,
    ) -> Self {
        Self {
            allocator,
            out,
            location,
        }
    }

    /// Emit every row described by `log`, attributing new segments and
    /// drives to `source_file`.
    pub fn ingest(&mut self, log: &DriveLog, source_file: &str) {
        // Classifications only resolve against images walked in this document.
        let mut walked: HashMap<&str, i64> = HashMap::new();

        for segment in &log.segments {
            let segment_id = self.segment(&segment.name, source_file);

            for drive in &segment.drives {
                let drive_id = self.drive(&segment.name, segment_id, drive, source_file);

                for camera in &drive.cameras {
                    let camera_id = self.camera(&segment.name, drive, drive_id, &camera.name);

                    let frames = camera
                        .color
                        .iter()
                        .map(|f| (ImageType::Color, f))
                        .chain(camera.depth.iter().map(|f| (ImageType::Depth, f)));
                    for (image_type, filename) in frames {
                        let image_id = self.image(filename, image_type, segment_id, drive_id);
                        walked.insert(filename.as_str(), image_id);
                        if self
                            .allocator
                            .is_loaded_link(RowKind::CameraImage, camera_id, image_id)
                        {
                            continue;
                        }
                        let id = self.allocator.next_row_id(RowKind::CameraImage);
                        self.out.tables.camera_images.push(CameraImageRow {
                            id,
                            camera_id,
                            image_id,
                        });
                    }

                    for (category, paths) in &camera.classifications {
                        let category_id = self.category(category);
                        for path in paths {
                            let filename = bare_filename(path);
                            match walked.get(filename) {
                                Some(&image_id)
                                    if self.allocator.is_loaded_link(
                                        RowKind::ImageCategory,
                                        image_id,
                                        category_id,
                                    ) => {}
                                Some(&image_id) => {
                                    let id = self.allocator.next_row_id(RowKind::ImageCategory);
                                    self.out.tables.image_categories.push(ImageCategoryRow {
                                        id,
                                        image_id,
                                        category_id,
                                        confidence: None,
                                    });
                                }
                                None => self.out.unresolved.push(UnresolvedClassification {
                                    filename: filename.to_string(),
                                    category: category.clone(),
                                    segment: segment.name.clone(),
                                    drive: drive.name.clone(),
                                    camera: camera.name.clone(),
                                    source_file: source_file.to_string(),
                                }),
                            }
                        }
                    }
                }
            }
        }
    }

    fn segment(&mut self, name: &str, source_file: &str) -> i64 {
        let (id, fresh) = self
            .allocator
            .register(EntityKind::Segment, NaturalKey::name(name));
        if fresh {
            self.out
                .segment_rows
                .insert(id, self.out.tables.segments.len());
            self.out.tables.segments.push(SegmentRow {
                segment_id: id,
                name: name.to_string(),
                location: self.location.to_string(),
                date_recorded: None,
                source_file: source_file.to_string(),
            });
        }
        id
    }

    fn drive(
        &mut self,
        segment_name: &str,
        segment_id: i64,
        drive: &DriveEntry,
        source_file: &str,
    ) -> i64 {
        let (id, fresh) = self
            .allocator
            .register(EntityKind::Drive, NaturalKey::drive(segment_name, &drive.name));
        if fresh {
            self.out.drive_rows.insert(id, self.out.tables.drives.len());
            self.out.tables.drives.push(DriveRow {
                drive_id: id,
                name: drive.name.clone(),
                segment_id,
                dir_day: drive.dir_day.clone(),
                dir_pass: drive.dir_pass.clone(),
                time_driven: None,
                source_file: source_file.to_string(),
            });
        }
        id
    }

    fn camera(
        &mut self,
        segment_name: &str,
        drive: &DriveEntry,
        drive_id: i64,
        camera_name: &str,
    ) -> i64 {
        let key = NaturalKey::camera(segment_name, &drive.name, camera_name);
        let (id, fresh) = self.allocator.register(EntityKind::Camera, key);
        if fresh {
            self.out.tables.cameras.push(CameraRow {
                camera_id: id,
                drive_id,
                name: camera_name.to_string(),
            });
        }
        id
    }

    fn image(
        &mut self,
        filename: &str,
        image_type: ImageType,
        segment_id: i64,
        drive_id: i64,
    ) -> i64 {
        let (id, fresh) = self
            .allocator
            .register(EntityKind::Image, NaturalKey::name(filename));
        if fresh {
            let timestamp = extract_timestamp(filename);
            self.out.tables.images.push(ImageRow {
                image_id: id,
                filename: filename.to_string(),
                image_type,
                timestamp,
            });
            if let Some(ts) = timestamp {
                self.out.observe(segment_id, drive_id, ts);
            }
        }
        id
    }

    fn category(&mut self, name: &str) -> i64 {
        let (id, fresh) = self
            .allocator
            .register(EntityKind::Category, NaturalKey::name(name));
        if fresh {
            self.out.tables.categories.push(CategoryRow {
                category_id: id,
                name: name.to_string(),
            });
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(doc: &Value) -> DecodeOutput {
        let log = parse_document(doc).unwrap();
        let mut ids = IdentityAllocator::new();
        let mut out = DecodeOutput::new();
        Decoder::new(&mut ids, &mut out, "Fort Wayne, IN").ingest(&log, "a.json");
        out
    }

    #[test]
    fn test_field_classification() {
        assert_eq!(DriveField::classify("cam1"), DriveField::Camera);
        assert_eq!(DriveField::classify("camera_rear"), DriveField::Camera);
        assert_eq!(DriveField::classify("dir_day"), DriveField::DirDay);
        assert_eq!(DriveField::classify("dir_pass"), DriveField::DirPass);
        assert_eq!(DriveField::classify("gps"), DriveField::Unrecognized);
        assert_eq!(CameraField::classify("color"), CameraField::Color);
        assert_eq!(CameraField::classify("Classification_Swin"), CameraField::Classification);
        assert_eq!(CameraField::classify("classification_swin"), CameraField::Unrecognized);
    }

    #[test]
    fn test_bare_filename() {
        assert_eq!(bare_filename(r"D:\runs\seg1\100.0.jpg"), "100.0.jpg");
        assert_eq!(bare_filename("100.0.jpg"), "100.0.jpg");
        assert_eq!(bare_filename(r"dir\"), "");
    }

    #[test]
    fn test_reference_scenario() {
        let out = decode(&json!({
            "segment_1": {"driveA": {
                "dir_day": "mon", "dir_pass": 1,
                "cam1": {
                    "color": ["100.0.jpg", "101.0.jpg"],
                    "Classification_Swin": {"Health": ["100.0.jpg"], "Alligator": ["999.0.jpg"]}
                }
            }}
        }));
        let t = &out.tables;
        assert_eq!(t.segments.len(), 1);
        assert_eq!(t.drives.len(), 1);
        assert_eq!(t.cameras.len(), 1);
        assert_eq!(t.images.len(), 2);
        assert_eq!(t.camera_images.len(), 2);
        assert_eq!(
            t.categories.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["Health", "Alligator"]
        );
        assert_eq!(t.image_categories.len(), 1);
        assert_eq!(t.image_categories[0].image_id, 1);
        assert_eq!(t.image_categories[0].category_id, 1);
        assert_eq!(t.image_categories[0].confidence, None);

        assert_eq!(out.unresolved.len(), 1);
        assert_eq!(out.unresolved[0].filename, "999.0.jpg");
        assert_eq!(out.unresolved[0].category, "Alligator");
        assert_eq!(out.unresolved[0].camera, "cam1");

        assert_eq!(t.drives[0].dir_day.as_deref(), Some("mon"));
        assert_eq!(t.drives[0].dir_pass.as_deref(), Some("1"));
        assert_eq!(t.drives[0].time_driven.unwrap().timestamp(), 100);
        assert_eq!(
            t.segments[0].date_recorded.unwrap().to_string(),
            "1970-01-01"
        );
    }

    #[test]
    fn test_links_already_loaded_are_not_emitted_again() {
        use crate::identity::IdentitySnapshot;

        let mut snapshot = IdentitySnapshot::default();
        snapshot.keys = vec![
            (EntityKind::Segment, NaturalKey::name("s"), 1),
            (EntityKind::Drive, NaturalKey::drive("s", "d"), 1),
            (EntityKind::Camera, NaturalKey::camera("s", "d", "cam1"), 1),
            (EntityKind::Image, NaturalKey::name("5.jpg"), 1),
            (EntityKind::Category, NaturalKey::name("Crack"), 1),
        ];
        snapshot.links.insert((RowKind::CameraImage, 1, 1));
        snapshot.links.insert((RowKind::ImageCategory, 1, 1));
        snapshot.max_row_ids.insert(RowKind::CameraImage, 1);
        snapshot.max_row_ids.insert(RowKind::ImageCategory, 1);

        let log = parse_document(&json!({
            "s": {"d": {"cam1": {
                "color": ["5.jpg", "6.jpg"],
                "Classification_Swin": {"Crack": ["5.jpg", "6.jpg"]}
            }}}
        }))
        .unwrap();
        let mut ids = IdentityAllocator::from_snapshot(&snapshot);
        let mut out = DecodeOutput::new();
        Decoder::new(&mut ids, &mut out, "x").ingest(&log, "retry.json");

        let t = &out.tables;
        assert!(t.segments.is_empty());
        assert!(t.cameras.is_empty());
        assert_eq!(t.images.len(), 1);
        assert_eq!(t.camera_images.len(), 1);
        assert_eq!(t.camera_images[0].id, 2);
        assert_eq!(t.camera_images[0].image_id, 2);
        assert_eq!(t.image_categories.len(), 1);
        assert_eq!(t.image_categories[0].image_id, 2);
        assert!(out.unresolved.is_empty());
    }

    #[test]
    fn test_repeated_image_links_every_occurrence() {
        let out = decode(&json!({
            "s": {"d": {
                "cam1": {"color": ["5.jpg", "5.jpg"], "depth": ["5.jpg"]},
                "cam2": {"color": ["5.jpg"]}
            }}
        }));
        assert_eq!(out.tables.images.len(), 1);
        assert_eq!(out.tables.images[0].image_type, ImageType::Color);
        assert_eq!(out.tables.camera_images.len(), 4);
        let ids: Vec<i64> = out.tables.camera_images.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(out.tables.camera_images[3].camera_id, 2);
    }

    #[test]
    fn test_empty_structures_still_produce_rows() {
        let out = decode(&json!({
            "segment_empty": {},
            "segment_2": {"driveB": {"dir_day": "tue"}, "driveC": {"cam1": {}}}
        }));
        assert_eq!(out.tables.segments.len(), 2);
        assert_eq!(out.tables.drives.len(), 2);
        assert_eq!(out.tables.cameras.len(), 1);
        assert!(out.tables.images.is_empty());
        assert_eq!(out.tables.segments[0].date_recorded, None);
        assert_eq!(out.tables.drives[0].time_driven, None);
    }

    #[test]
    fn test_unparseable_timestamps_leave_dates_null() {
        let out = decode(&json!({
            "s": {"d": {"cam1": {"color": ["frame_a.jpg", "frame_b.jpg"]}}}
        }));
        assert!(out.tables.images.iter().all(|i| i.timestamp.is_none()));
        assert_eq!(out.tables.segments[0].date_recorded, None);
        assert_eq!(out.tables.drives[0].time_driven, None);
    }

    #[test]
    fn test_minimum_timestamp_across_drives() {
        let out = decode(&json!({
            "s": {
                "d1": {"cam1": {"color": ["500.jpg", "300.jpg"]}},
                "d2": {"cam1": {"depth": ["86400.png", "200.png"]}}
            }
        }));
        let drives = &out.tables.drives;
        assert_eq!(drives[0].time_driven.unwrap().timestamp(), 300);
        assert_eq!(drives[1].time_driven.unwrap().timestamp(), 200);
        assert_eq!(
            out.tables.segments[0].date_recorded.unwrap().to_string(),
            "1970-01-01"
        );
    }

    #[test]
    fn test_classification_paths_are_stripped() {
        let out = decode(&json!({
            "s": {"d": {"cam1": {
                "color": ["7.jpg"],
                "Classification_Swin": {"Crack": ["C:\\data\\s\\7.jpg"]}
            }}}
        }));
        assert_eq!(out.tables.image_categories.len(), 1);
        assert!(out.unresolved.is_empty());
    }

    #[test]
    fn test_classification_resolves_against_earlier_cameras_in_document() {
        let out = decode(&json!({
            "s": {"d": {
                "cam1": {"color": ["1.jpg"]},
                "cam2": {"Classification_Swin": {"Patch": ["1.jpg"]}}
            }}
        }));
        assert_eq!(out.tables.image_categories.len(), 1);
    }

    #[test]
    fn test_metadata_and_unrecognized_keys() {
        let log = parse_document(&json!({
            "s": {"d": {"dir_day": null, "dir_pass": "B", "gps": [1, 2],
                        "cam1": {"color": [], "thumb": []}}}
        }))
        .unwrap();
        let drive = &log.segments[0].drives[0];
        assert_eq!(drive.dir_day, None);
        assert_eq!(drive.dir_pass.as_deref(), Some("B"));
        assert_eq!(log.unrecognized_keys, 2);
    }

    #[test]
    fn test_camera_without_object_is_tolerated() {
        let log = parse_document(&json!({"s": {"d": {"cam1": "broken"}}})).unwrap();
        assert_eq!(log.segments[0].drives[0].cameras.len(), 1);
        assert_eq!(log.warnings.len(), 1);
        assert!(log.warnings[0].contains("$.s.d.cam1"));
    }

    #[test]
    fn test_shape_errors_name_the_path() {
        let err = parse_document(&json!(["not", "an", "object"])).unwrap_err();
        assert!(err.to_string().contains("at $"));

        let err = parse_document(&json!({"s": {"d": 5}})).unwrap_err();
        assert!(err.to_string().contains("$.s.d"), "{}", err);

        let err = parse_document(&json!({"s": {"d": {"cam1": {"color": "x.jpg"}}}})).unwrap_err();
        assert!(matches!(err, DecodeError::NotAList { .. }));

        let err = parse_document(&json!({"s": {"d": {"cam1": {"color": [1]}}}})).unwrap_err();
        assert!(err.to_string().contains("$.s.d.cam1.color[0]"), "{}", err);
    }

    #[test]
    fn test_source_key_order_drives_numbering() {
        let out = decode(&json!({"zeta": {}, "alpha": {}, "mid": {}}));
        let names: Vec<(&str, i64)> = out
            .tables
            .segments
            .iter()
            .map(|s| (s.name.as_str(), s.segment_id))
            .collect();
        assert_eq!(names, vec![("zeta", 1), ("alpha", 2), ("mid", 3)]);
    }
}
