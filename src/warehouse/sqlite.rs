//! SQLite-backed [`Warehouse`].
//!
//! Each table load runs in its own transaction: a `replace` truncate and
//! the inserts that follow commit together, and a failed load leaves the
//! table as it was. Rows go in through multi-row `INSERT ... VALUES`
//! statements sized to stay under SQLite's bind-parameter limit.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{Column, Executor, QueryBuilder, Row, Statement, TypeInfo, ValueRef};
use std::collections::HashSet;

use super::{LoadedKeys, Warehouse, WriteMode};
use crate::config::Config;
use crate::db;
use crate::error::LoadError;
use crate::identity::IdentitySnapshot;
use crate::migrate;
use crate::models::{Cell, QueryResult, TableBatch, TIMESTAMP_FORMAT};
use crate::schema::Table;

/// Upper bound on bound parameters per statement.
const MAX_BIND_PARAMS: usize = 999;

pub struct SqliteWarehouse {
    pool: SqlitePool,
}

impl SqliteWarehouse {
    pub async fn open(config: &Config) -> Result<Self> {
        Ok(Self {
            pool: db::connect(config).await?,
        })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn table_exists(&self, table: Table) -> Result<bool> {
        db::table_exists(&self.pool, table.name()).await
    }

    async fn fetch_keys<T>(&self, table: Table, sql: &str) -> Result<Vec<T>>
    where
        T: for<'r> sqlx::FromRow<'r, SqliteRow> + Send + Unpin,
    {
        if !self.table_exists(table).await? {
            return Ok(Vec::new());
        }
        Ok(sqlx::query_as::<_, T>(sql).fetch_all(&self.pool).await?)
    }

    async fn max_id(&self, table: Table) -> Result<Option<i64>> {
        if !self.table_exists(table).await? {
            return Ok(None);
        }
        let max: Option<i64> = sqlx::query_scalar(&format!("SELECT MAX(ID) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(max)
    }

    async fn write_rows(&self, batch: &TableBatch, mode: WriteMode) -> Result<u64, sqlx::Error> {
        let def = batch.table.def();
        let name = def.table.name();
        let columns = def.column_names().join(", ");
        let rows_per_insert = (MAX_BIND_PARAMS / def.columns.len()).max(1);

        let mut tx = self.pool.begin().await?;

        if mode == WriteMode::Replace {
            sqlx::query(&format!("DELETE FROM {}", name))
                .execute(&mut *tx)
                .await?;
        }

        let mut written = 0u64;
        for chunk in batch.rows.chunks(rows_per_insert) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("INSERT INTO {} ({}) ", name, columns));
            qb.push_values(chunk, |mut b, row| {
                for cell in row {
                    match cell {
                        Cell::Null => {
                            b.push_bind(None::<String>);
                        }
                        Cell::Integer(v) => {
                            b.push_bind(*v);
                        }
                        Cell::Real(v) => {
                            b.push_bind(*v);
                        }
                        Cell::Text(s) => {
                            b.push_bind(s.clone());
                        }
                        Cell::Date(_) | Cell::Timestamp(_) => {
                            b.push_bind(cell.to_string());
                        }
                    }
                }
            });
            written += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }
}

#[async_trait]
impl Warehouse for SqliteWarehouse {
    async fn ensure_schema(&self) -> Result<()> {
        migrate::create_schema(&self.pool).await
    }

    async fn load(&self, batch: &TableBatch, mode: WriteMode) -> Result<u64, LoadError> {
        let name = batch.table.name();

        if mode == WriteMode::Fail {
            let existing: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", name))
                .fetch_one(&self.pool)
                .await
                .map_err(|e| LoadError::upload(name, batch.len(), e))?;
            if existing > 0 {
                return Err(LoadError::TableNotEmpty {
                    table: name,
                    rows: existing,
                });
            }
        }

        self.write_rows(batch, mode)
            .await
            .map_err(|e| LoadError::upload(name, batch.len(), e))
    }

    async fn processed_source_files(&self) -> Result<HashSet<String>> {
        if db::table_exists(&self.pool, "loaded_files").await? {
            let files: Vec<String> =
                sqlx::query_scalar("SELECT DISTINCT Source_File FROM loaded_files")
                    .fetch_all(&self.pool)
                    .await?;
            return Ok(files.into_iter().collect());
        }

        // Warehouses without bookkeeping fall back to the row attribution.
        let mut processed = HashSet::new();
        for table in [Table::Segments, Table::Drives] {
            if !self.table_exists(table).await? {
                continue;
            }
            let files: Vec<String> =
                sqlx::query_scalar(&format!("SELECT DISTINCT Source_File FROM {}", table))
                    .fetch_all(&self.pool)
                    .await?;
            processed.extend(files);
        }
        Ok(processed)
    }

    async fn record_loaded_files(&self, files: &[String], mode: WriteMode) -> Result<()> {
        let loaded_at = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let mut tx = self.pool.begin().await?;
        if mode == WriteMode::Replace {
            sqlx::query("DELETE FROM loaded_files")
                .execute(&mut *tx)
                .await?;
        }
        for file in files {
            sqlx::query("INSERT INTO loaded_files (Source_File, Loaded_At) VALUES (?, ?)")
                .bind(file)
                .bind(&loaded_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn identity_snapshot(&self) -> Result<IdentitySnapshot> {
        let keys = LoadedKeys {
            segments: self
                .fetch_keys(
                    Table::Segments,
                    "SELECT Segment_ID, Name FROM segments ORDER BY Segment_ID",
                )
                .await?,
            drives: self
                .fetch_keys(
                    Table::Drives,
                    "SELECT Drive_ID, Name, Segment_ID FROM drives ORDER BY Drive_ID",
                )
                .await?,
            cameras: self
                .fetch_keys(
                    Table::Cameras,
                    "SELECT Camera_ID, Drive_ID, Name FROM cameras ORDER BY Camera_ID",
                )
                .await?,
            images: self
                .fetch_keys(
                    Table::Images,
                    "SELECT Image_ID, Filename FROM images ORDER BY Image_ID",
                )
                .await?,
            categories: self
                .fetch_keys(
                    Table::Categories,
                    "SELECT Category_ID, Name FROM categories ORDER BY Category_ID",
                )
                .await?,
            camera_images: self
                .fetch_keys(
                    Table::CameraImages,
                    "SELECT DISTINCT Camera_ID, Image_ID FROM camera_images",
                )
                .await?,
            image_categories: self
                .fetch_keys(
                    Table::ImageCategories,
                    "SELECT DISTINCT Image_ID, Category_ID FROM image_categories",
                )
                .await?,
            max_camera_image_id: self.max_id(Table::CameraImages).await?,
            max_image_category_id: self.max_id(Table::ImageCategories).await?,
        };
        Ok(keys.into_snapshot())
    }

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        let columns: Vec<String> = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => {
                let stmt = (&self.pool).prepare(sql).await?;
                stmt.columns().iter().map(|c| c.name().to_string()).collect()
            }
        };

        let mut decoded = Vec::with_capacity(rows.len());
        for row in &rows {
            let cells = (0..row.len())
                .map(|i| decode_cell(row, i))
                .collect::<Result<Vec<_>>>()?;
            decoded.push(cells);
        }

        Ok(QueryResult {
            columns,
            rows: decoded,
        })
    }

    async fn row_count(&self, table: Table) -> Result<Option<i64>> {
        if !self.table_exists(table).await? {
            return Ok(None);
        }
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(Some(count))
    }
}

/// Decode by the value's storage class rather than the declared type.
fn decode_cell(row: &SqliteRow, i: usize) -> Result<Cell> {
    let storage = {
        let raw = row.try_get_raw(i)?;
        if raw.is_null() {
            return Ok(Cell::Null);
        }
        raw.type_info().name().to_string()
    };

    Ok(match storage.as_str() {
        "INTEGER" | "BOOLEAN" => Cell::Integer(row.try_get_unchecked::<i64, _>(i)?),
        "REAL" => Cell::Real(row.try_get_unchecked::<f64, _>(i)?),
        "BLOB" => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(i)?;
            Cell::Text(format!("<{} bytes>", bytes.len()))
        }
        _ => Cell::Text(row.try_get_unchecked::<String, _>(i)?),
    })
}
