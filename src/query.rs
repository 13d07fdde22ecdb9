//! Read side: ad-hoc SQL, canned queries, and query timing.
//!
//! Every statement goes through [`qualify_tables`] before it reaches the
//! warehouse, so operators can write bare table names.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::models::QueryResult;
use crate::sql_rewrite::qualify_tables;
use crate::warehouse::{SqliteWarehouse, Warehouse};

/// A named statement shipped with the binary.
#[derive(Debug, Clone, Copy)]
pub struct CannedQuery {
    pub name: &'static str,
    pub title: &'static str,
    pub sql: &'static str,
}

pub const QUICK_QUERIES: &[CannedQuery] = &[
    CannedQuery {
        name: "segments",
        title: "View segments",
        sql: "SELECT * FROM segments LIMIT 10",
    },
    CannedQuery {
        name: "drives",
        title: "View drives",
        sql: "SELECT * FROM drives LIMIT 10",
    },
    CannedQuery {
        name: "count-images",
        title: "Count images",
        sql: "SELECT COUNT(*) AS total_images FROM images",
    },
    CannedQuery {
        name: "images-per-category",
        title: "Images per category",
        sql: "SELECT cat.Name AS category_name, COUNT(ic.Image_ID) AS total_images
FROM categories cat
JOIN image_categories ic ON cat.Category_ID = ic.Category_ID
GROUP BY cat.Name
ORDER BY total_images DESC",
    },
    CannedQuery {
        name: "common-category-per-segment",
        title: "Most common category per segment",
        sql: "WITH per_segment AS (
    SELECT s.Name AS segment_name, cat.Name AS category_name, COUNT(*) AS image_count
    FROM image_categories ic
    JOIN categories cat ON ic.Category_ID = cat.Category_ID
    JOIN camera_images ci ON ic.Image_ID = ci.Image_ID
    JOIN cameras c ON ci.Camera_ID = c.Camera_ID
    JOIN drives d ON c.Drive_ID = d.Drive_ID
    JOIN segments s ON d.Segment_ID = s.Segment_ID
    GROUP BY s.Name, cat.Name
), ranked AS (
    SELECT segment_name, category_name, image_count,
           ROW_NUMBER() OVER (PARTITION BY segment_name ORDER BY image_count DESC, category_name) AS rn
    FROM per_segment
)
SELECT segment_name, category_name AS most_common_cat, image_count
FROM ranked
WHERE rn = 1
ORDER BY segment_name",
    },
    CannedQuery {
        name: "longest-drives",
        title: "Drives with longest timespan",
        sql: "SELECT d.Name AS drive_name, s.Name AS segment_name,
       MIN(i.Timestamp) AS start_time, MAX(i.Timestamp) AS end_time,
       CAST(ROUND((julianday(MAX(i.Timestamp)) - julianday(MIN(i.Timestamp))) * 86400) AS INTEGER) AS duration_seconds
FROM drives d
JOIN segments s ON d.Segment_ID = s.Segment_ID
JOIN cameras c ON d.Drive_ID = c.Drive_ID
JOIN camera_images ci ON c.Camera_ID = ci.Camera_ID
JOIN images i ON ci.Image_ID = i.Image_ID
GROUP BY d.Drive_ID, d.Name, s.Name
ORDER BY duration_seconds DESC
LIMIT 10",
    },
    CannedQuery {
        name: "top-categories",
        title: "Top categories by segment",
        sql: "SELECT s.Name AS segment_name, cat.Name AS category_name, COUNT(*) AS image_count
FROM image_categories ic
JOIN categories cat ON ic.Category_ID = cat.Category_ID
JOIN camera_images ci ON ic.Image_ID = ci.Image_ID
JOIN cameras c ON ci.Camera_ID = c.Camera_ID
JOIN drives d ON c.Drive_ID = d.Drive_ID
JOIN segments s ON d.Segment_ID = s.Segment_ID
GROUP BY segment_name, category_name
ORDER BY segment_name, image_count DESC",
    },
];

/// Statements of increasing join depth, timed by `roadlog bench`.
pub const BENCH_QUERIES: &[CannedQuery] = &[
    CannedQuery {
        name: "simple-select",
        title: "Simple SELECT",
        sql: "SELECT * FROM segments LIMIT 100",
    },
    CannedQuery {
        name: "filtered-where",
        title: "Filtered WHERE",
        sql: "SELECT * FROM images WHERE Type = 'color' LIMIT 1000",
    },
    CannedQuery {
        name: "single-join",
        title: "Single JOIN",
        sql: "SELECT s.Name, COUNT(d.Drive_ID) AS drive_count
FROM segments s
JOIN drives d ON s.Segment_ID = d.Segment_ID
GROUP BY s.Name
LIMIT 100",
    },
    CannedQuery {
        name: "multi-join",
        title: "Multi-JOIN (3 tables)",
        sql: "SELECT s.Name AS segment_name, COUNT(c.Camera_ID) AS camera_count
FROM segments s
JOIN drives d ON s.Segment_ID = d.Segment_ID
JOIN cameras c ON d.Drive_ID = c.Drive_ID
GROUP BY s.Name
ORDER BY camera_count DESC
LIMIT 50",
    },
    CannedQuery {
        name: "six-way-join",
        title: "Complex (6-way JOIN)",
        sql: "SELECT s.Name AS segment_name, cat.Name AS category_name, COUNT(*) AS classification_count
FROM image_categories ic
JOIN categories cat ON ic.Category_ID = cat.Category_ID
JOIN images i ON ic.Image_ID = i.Image_ID
JOIN camera_images ci ON i.Image_ID = ci.Image_ID
JOIN cameras c ON ci.Camera_ID = c.Camera_ID
JOIN drives d ON c.Drive_ID = d.Drive_ID
JOIN segments s ON d.Segment_ID = s.Segment_ID
GROUP BY s.Name, cat.Name
ORDER BY classification_count DESC
LIMIT 100",
    },
    CannedQuery {
        name: "aggregation",
        title: "Aggregation GROUP BY",
        sql: "SELECT cat.Name, COUNT(*) AS total
FROM image_categories ic
JOIN categories cat ON ic.Category_ID = cat.Category_ID
GROUP BY cat.Name
ORDER BY total DESC",
    },
];

pub fn find_quick(name: &str) -> Option<&'static CannedQuery> {
    QUICK_QUERIES.iter().find(|q| q.name == name)
}

/// Render a result set as an aligned text table.
pub fn format_table(result: &QueryResult) -> String {
    let rendered: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(|c| c.to_string()).collect())
        .collect();

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.chars().count()).collect();
    for row in &rendered {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&line(&result.columns));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    out.push('\n');
    for row in &rendered {
        out.push_str(&line(row));
        out.push('\n');
    }
    out
}

/// Run `roadlog query`.
pub async fn run_query(
    config: &Config,
    sql: Option<String>,
    quick: Option<String>,
    list: bool,
    show_sql: bool,
    json: bool,
) -> Result<()> {
    if list {
        for q in QUICK_QUERIES {
            println!("{:<30} {}", q.name, q.title);
        }
        return Ok(());
    }

    let statement = match (sql, quick) {
        (Some(_), Some(_)) => bail!("Pass either a SQL statement or --quick, not both"),
        (Some(sql), None) => sql,
        (None, Some(name)) => match find_quick(&name) {
            Some(q) => q.sql.to_string(),
            None => bail!(
                "Unknown quick query: '{}'. Run `roadlog query --list` to see them.",
                name
            ),
        },
        (None, None) => bail!("No query given. Pass SQL or --quick NAME."),
    };

    let qualified = qualify_tables(&statement, &config.warehouse.dataset);
    if show_sql {
        println!("{}", qualified);
        println!();
    }

    let warehouse = SqliteWarehouse::open(config).await?;
    let result = warehouse
        .query(&qualified)
        .await
        .with_context(|| "Query failed")?;
    warehouse.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", format_table(&result));
        println!("({} row{})", result.rows.len(), if result.rows.len() == 1 { "" } else { "s" });
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    pub name: &'static str,
    pub title: &'static str,
    pub runs: Vec<Duration>,
    pub error: Option<String>,
}

impl BenchResult {
    /// Mean run time, if every run succeeded.
    pub fn average(&self) -> Option<Duration> {
        if self.error.is_some() || self.runs.is_empty() {
            return None;
        }
        Some(self.runs.iter().sum::<Duration>() / self.runs.len() as u32)
    }
}

/// Time each query `runs` times. A failing query stops its own runs and
/// the rest continue.
pub async fn bench_queries(
    warehouse: &dyn Warehouse,
    dataset: &str,
    queries: &[CannedQuery],
    runs: usize,
) -> Vec<BenchResult> {
    let mut results = Vec::with_capacity(queries.len());
    for q in queries {
        let sql = qualify_tables(q.sql, dataset);
        let mut result = BenchResult {
            name: q.name,
            title: q.title,
            runs: Vec::with_capacity(runs),
            error: None,
        };
        for _ in 0..runs {
            let start = Instant::now();
            match warehouse.query(&sql).await {
                Ok(_) => result.runs.push(start.elapsed()),
                Err(e) => {
                    result.error = Some(format!("{:#}", e));
                    break;
                }
            }
        }
        results.push(result);
    }
    results
}

/// Run `roadlog bench`.
pub async fn run_bench(config: &Config, runs: usize) -> Result<()> {
    if runs == 0 {
        bail!("--runs must be >= 1");
    }

    let warehouse = SqliteWarehouse::open(config).await?;
    let results = bench_queries(&warehouse, &config.warehouse.dataset, BENCH_QUERIES, runs).await;
    warehouse.close().await;

    println!("bench ({} run{} per query)", runs, if runs == 1 { "" } else { "s" });
    for r in &results {
        match (r.average(), &r.error) {
            (Some(avg), _) => {
                let per_run = r
                    .runs
                    .iter()
                    .map(|d| format!("{:.2}ms", d.as_secs_f64() * 1000.0))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!(
                    "  {:<24} {:>10.2}ms  [{}]",
                    r.title,
                    avg.as_secs_f64() * 1000.0,
                    per_run
                );
            }
            (None, Some(err)) => println!("  {:<24} {:>12}  {}", r.title, "FAILED", err),
            (None, None) => println!("  {:<24} {:>12}", r.title, "FAILED"),
        }
    }
    Ok(())
}
