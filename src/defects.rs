//! Defect summary joined to PASER pavement ratings.
//!
//! Classification counts come from the warehouse, grouped per segment,
//! drive, camera and category. Segments named `segment_NNNN` are matched
//! to PASER records on `Seg_ID = NNNN`. PASER data is read from a JSON
//! export of the centerline attribute table, either a plain array of
//! records or a GeoJSON feature collection (geometry is ignored).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::models::QueryResult;
use crate::sql_rewrite::qualify_tables;
use crate::warehouse::{SqliteWarehouse, Warehouse};

/// Category label for images without a defect.
pub const HEALTHY_CATEGORY: &str = "Health";

const DEFECT_COUNTS_SQL: &str = "SELECT s.Name AS segment, d.Name AS drive, c.Name AS camera,
       cat.Name AS category, COUNT(DISTINCT ic.Image_ID) AS image_count
FROM image_categories ic
JOIN categories cat ON ic.Category_ID = cat.Category_ID
JOIN camera_images ci ON ic.Image_ID = ci.Image_ID
JOIN cameras c ON ci.Camera_ID = c.Camera_ID
JOIN drives d ON c.Drive_ID = d.Drive_ID
JOIN segments s ON d.Segment_ID = s.Segment_ID
GROUP BY s.Name, d.Name, c.Name, cat.Name
ORDER BY s.Name, d.Name, c.Name, cat.Name";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefectCount {
    pub segment: String,
    pub drive: String,
    pub camera: String,
    pub category: String,
    pub image_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaserRecord {
    #[serde(rename = "Seg_ID")]
    pub seg_id: i64,
    #[serde(rename = "Street_Nam", default)]
    pub street_name: Option<String>,
    #[serde(rename = "PASER_Rati", default)]
    pub paser_rating: Option<f64>,
    #[serde(rename = "PXpaser25", default)]
    pub pxpaser25: Option<f64>,
    #[serde(rename = "Latitude", default)]
    pub latitude: Option<f64>,
    #[serde(rename = "Longitude", default)]
    pub longitude: Option<f64>,
}

#[derive(Deserialize)]
struct PaserFeature {
    properties: PaserRecord,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PaserFile {
    Records(Vec<PaserRecord>),
    Features { features: Vec<PaserFeature> },
}

pub fn load_paser_records(path: &Path) -> Result<Vec<PaserRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read PASER file: {}", path.display()))?;
    let parsed: PaserFile = serde_json::from_str(&content).with_context(|| {
        format!(
            "PASER file must be a JSON array of records or a feature collection: {}",
            path.display()
        )
    })?;
    Ok(match parsed {
        PaserFile::Records(records) => records,
        PaserFile::Features { features } => features.into_iter().map(|f| f.properties).collect(),
    })
}

/// `segment_0042` → `42`.
pub fn segment_number(name: &str) -> Option<i64> {
    name.strip_prefix("segment_").unwrap_or(name).trim().parse().ok()
}

pub fn defect_counts(result: &QueryResult) -> Result<Vec<DefectCount>> {
    let idx = |name: &str| {
        result
            .column_index(name)
            .with_context(|| format!("defect query returned no '{}' column", name))
    };
    let (seg, drive, cam, cat, count) = (
        idx("segment")?,
        idx("drive")?,
        idx("camera")?,
        idx("category")?,
        idx("image_count")?,
    );

    result
        .rows
        .iter()
        .map(|row| {
            let text = |i: usize| row.get(i).and_then(|c| c.as_text()).unwrap_or_default();
            Ok(DefectCount {
                segment: text(seg),
                drive: text(drive),
                camera: text(cam),
                category: text(cat),
                image_count: row.get(count).and_then(|c| c.as_i64()).unwrap_or(0),
            })
        })
        .collect()
}

/// Per-segment rollup with its PASER match, if any.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentDefects {
    pub segment: String,
    pub seg_num: Option<i64>,
    pub total_images: i64,
    pub defect_images: i64,
    pub top_defect: Option<String>,
    pub paser: Option<PaserRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DefectReport {
    pub counts: Vec<DefectCount>,
    pub segments: Vec<SegmentDefects>,
    pub matched_segments: usize,
    pub total_segments: usize,
}

/// Left-join per-segment rollups to PASER records on segment number.
///
/// A segment counts as matched when its record carries a latitude.
pub fn join_paser(counts: Vec<DefectCount>, records: &[PaserRecord]) -> DefectReport {
    let by_id: HashMap<i64, &PaserRecord> = records.iter().map(|r| (r.seg_id, r)).collect();

    let mut per_segment: BTreeMap<&str, BTreeMap<&str, i64>> = BTreeMap::new();
    for c in &counts {
        *per_segment
            .entry(c.segment.as_str())
            .or_default()
            .entry(c.category.as_str())
            .or_default() += c.image_count;
    }

    let segments: Vec<SegmentDefects> = per_segment
        .into_iter()
        .map(|(segment, categories)| {
            let seg_num = segment_number(segment);
            let defects = categories
                .iter()
                .filter(|(cat, _)| **cat != HEALTHY_CATEGORY);
            let top_defect = defects
                .clone()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(cat, _)| cat.to_string());
            SegmentDefects {
                segment: segment.to_string(),
                seg_num,
                total_images: categories.values().sum(),
                defect_images: defects.map(|(_, n)| n).sum(),
                top_defect,
                paser: seg_num.and_then(|n| by_id.get(&n)).map(|r| (*r).clone()),
            }
        })
        .collect();

    let matched_segments = segments
        .iter()
        .filter(|s| s.paser.as_ref().is_some_and(|p| p.latitude.is_some()))
        .count();
    let total_segments = segments.len();

    DefectReport {
        counts,
        segments,
        matched_segments,
        total_segments,
    }
}

/// Run `roadlog defects`.
pub async fn run_defects(config: &Config, paser: Option<PathBuf>, json: bool) -> Result<()> {
    let records = match paser.or_else(|| config.paser.ratings_path.clone()) {
        Some(path) => load_paser_records(&path)?,
        None => Vec::new(),
    };

    let warehouse = SqliteWarehouse::open(config).await?;
    if warehouse
        .row_count(crate::schema::Table::ImageCategories)
        .await?
        .is_none()
    {
        warehouse.close().await;
        bail!("Warehouse has no tables yet. Run `roadlog init` and `roadlog load` first.");
    }
    let sql = qualify_tables(DEFECT_COUNTS_SQL, &config.warehouse.dataset);
    let result = warehouse.query(&sql).await?;
    warehouse.close().await;

    let report = join_paser(defect_counts(&result)?, &records);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "  {:<16} {:>6} {:>8} {:>8}  {:<18} {:<24} {:>6}",
        "SEGMENT", "SEG_ID", "IMAGES", "DEFECTS", "TOP DEFECT", "STREET", "PASER"
    );
    println!("  {}", "-".repeat(94));
    for s in &report.segments {
        let street = s
            .paser
            .as_ref()
            .and_then(|p| p.street_name.clone())
            .unwrap_or_else(|| "-".to_string());
        let rating = s
            .paser
            .as_ref()
            .and_then(|p| p.paser_rating)
            .map(|r| format!("{}", r))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<16} {:>6} {:>8} {:>8}  {:<18} {:<24} {:>6}",
            s.segment,
            s.seg_num.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
            s.total_images,
            s.defect_images,
            s.top_defect.as_deref().unwrap_or("-"),
            street,
            rating
        );
    }
    println!();

    let pct = if report.total_segments > 0 {
        report.matched_segments as f64 * 100.0 / report.total_segments as f64
    } else {
        0.0
    };
    println!(
        "Matched {}/{} segments with PASER coordinates ({:.1}%)",
        report.matched_segments, report.total_segments, pct
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cell;

    fn count(segment: &str, category: &str, n: i64) -> DefectCount {
        DefectCount {
            segment: segment.into(),
            drive: "d".into(),
            camera: "cam1".into(),
            category: category.into(),
            image_count: n,
        }
    }

    fn record(id: i64, lat: Option<f64>) -> PaserRecord {
        PaserRecord {
            seg_id: id,
            street_name: Some("Main St".into()),
            paser_rating: Some(6.0),
            pxpaser25: None,
            latitude: lat,
            longitude: lat.map(|_| -85.1),
        }
    }

    #[test]
    fn test_segment_number() {
        assert_eq!(segment_number("segment_0042"), Some(42));
        assert_eq!(segment_number("17"), Some(17));
        assert_eq!(segment_number("segment_x"), None);
        assert_eq!(segment_number("road_3"), None);
    }

    #[test]
    fn test_join_and_match_rate() {
        let counts = vec![
            count("segment_0001", "Health", 10),
            count("segment_0001", "Alligator", 3),
            count("segment_0001", "Crack", 5),
            count("segment_0002", "Crack", 1),
            count("segment_0003", "Health", 2),
            count("unnumbered", "Patch", 4),
        ];
        let records = vec![record(1, Some(41.1)), record(2, None)];
        let report = join_paser(counts, &records);

        assert_eq!(report.total_segments, 4);
        assert_eq!(report.matched_segments, 1);

        let first = &report.segments[0];
        assert_eq!(first.segment, "segment_0001");
        assert_eq!(first.total_images, 18);
        assert_eq!(first.defect_images, 8);
        assert_eq!(first.top_defect.as_deref(), Some("Crack"));
        assert_eq!(first.paser.as_ref().unwrap().seg_id, 1);

        let healthy = report
            .segments
            .iter()
            .find(|s| s.segment == "segment_0003")
            .unwrap();
        assert_eq!(healthy.defect_images, 0);
        assert_eq!(healthy.top_defect, None);
        assert!(healthy.paser.is_none());
    }

    #[test]
    fn test_load_paser_formats() {
        let tmp = tempfile::TempDir::new().unwrap();
        let plain = tmp.path().join("plain.json");
        std::fs::write(
            &plain,
            r#"[{"Seg_ID": 1, "Street_Nam": "Main St", "PASER_Rati": 7, "Latitude": 41.08, "Longitude": -85.14}]"#,
        )
        .unwrap();
        let records = load_paser_records(&plain).unwrap();
        assert_eq!(records[0].paser_rating, Some(7.0));
        assert_eq!(records[0].pxpaser25, None);

        let geo = tmp.path().join("geo.json");
        std::fs::write(
            &geo,
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "geometry": null, "properties": {"Seg_ID": 9, "PXpaser25": 4.5}}
            ]}"#,
        )
        .unwrap();
        let records = load_paser_records(&geo).unwrap();
        assert_eq!(records[0].seg_id, 9);
        assert_eq!(records[0].pxpaser25, Some(4.5));

        let bad = tmp.path().join("bad.json");
        std::fs::write(&bad, r#"{"rows": []}"#).unwrap();
        assert!(load_paser_records(&bad).is_err());
    }

    #[test]
    fn test_defect_counts_from_result() {
        let result = QueryResult {
            columns: vec![
                "segment".into(),
                "drive".into(),
                "camera".into(),
                "category".into(),
                "image_count".into(),
            ],
            rows: vec![vec![
                Cell::Text("segment_1".into()),
                Cell::Text("driveA".into()),
                Cell::Text("cam1".into()),
                Cell::Text("Health".into()),
                Cell::Integer(1),
            ]],
        };
        let counts = defect_counts(&result).unwrap();
        assert_eq!(counts, vec![DefectCount {
            segment: "segment_1".into(),
            drive: "driveA".into(),
            camera: "cam1".into(),
            category: "Health".into(),
            image_count: 1,
        }]);

        let missing = QueryResult {
            columns: vec!["segment".into()],
            rows: vec![],
        };
        assert!(defect_counts(&missing).is_err());
    }
}
