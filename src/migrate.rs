use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::schema::Table;

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_segments_name ON segments(Name)",
    "CREATE INDEX IF NOT EXISTS idx_segments_source_file ON segments(Source_File)",
    "CREATE INDEX IF NOT EXISTS idx_drives_segment_id ON drives(Segment_ID)",
    "CREATE INDEX IF NOT EXISTS idx_drives_source_file ON drives(Source_File)",
    "CREATE INDEX IF NOT EXISTS idx_cameras_drive_id ON cameras(Drive_ID)",
    "CREATE INDEX IF NOT EXISTS idx_images_filename ON images(Filename)",
    "CREATE INDEX IF NOT EXISTS idx_camera_images_camera_id ON camera_images(Camera_ID)",
    "CREATE INDEX IF NOT EXISTS idx_camera_images_image_id ON camera_images(Image_ID)",
    "CREATE INDEX IF NOT EXISTS idx_image_categories_image_id ON image_categories(Image_ID)",
    "CREATE INDEX IF NOT EXISTS idx_image_categories_category_id ON image_categories(Category_ID)",
    "CREATE INDEX IF NOT EXISTS idx_loaded_files_source_file ON loaded_files(Source_File)",
];

/// Files whose every table uploaded. The processed set for append runs.
pub const LOADED_FILES_DDL: &str = "CREATE TABLE IF NOT EXISTS loaded_files (
    Source_File TEXT NOT NULL,
    Loaded_At TEXT NOT NULL
)";

const BACKFILL_LOADED_FILES: &str = "INSERT INTO loaded_files (Source_File, Loaded_At)
    SELECT Source_File, datetime('now') FROM segments
    UNION
    SELECT Source_File, datetime('now') FROM drives";

/// Create the seven warehouse tables and their lookup indexes. Idempotent.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    for table in Table::ALL {
        sqlx::query(&table.def().create_sql()).execute(pool).await?;
    }

    let had_bookkeeping = db::table_exists(pool, "loaded_files").await?;
    sqlx::query(LOADED_FILES_DDL).execute(pool).await?;
    if !had_bookkeeping {
        // Carry over files attributed by rows loaded before the table existed.
        sqlx::query(BACKFILL_LOADED_FILES).execute(pool).await?;
    }

    for ddl in INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }

    Ok(())
}

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = Config::minimal(tmp.path().join("w.sqlite"), tmp.path().to_path_buf());

        run_migrations(&cfg).await.unwrap();
        run_migrations(&cfg).await.unwrap();

        let pool = db::connect(&cfg).await.unwrap();
        for table in Table::ALL {
            assert!(db::table_exists(&pool, table.name()).await.unwrap());
        }
        assert!(db::table_exists(&pool, "loaded_files").await.unwrap());
        assert!(!db::table_exists(&pool, "documents").await.unwrap());
        pool.close().await;
    }

    #[tokio::test]
    async fn test_bookkeeping_backfilled_from_loaded_rows() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = Config::minimal(tmp.path().join("w.sqlite"), tmp.path().to_path_buf());
        let pool = db::connect(&cfg).await.unwrap();

        sqlx::query(&Table::Segments.def().create_sql())
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO segments (Segment_ID, Name, Location, Date_Recorded, Source_File) \
             VALUES (1, 'segment_1', 'x', NULL, 'old.json')",
        )
        .execute(&pool)
        .await
        .unwrap();

        create_schema(&pool).await.unwrap();
        create_schema(&pool).await.unwrap();

        let files: Vec<String> = sqlx::query_scalar("SELECT Source_File FROM loaded_files")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(files, vec!["old.json"]);
        pool.close().await;
    }
}
