//! Warehouse statistics.
//!
//! Per-table row counts, how many source files have been loaded, and the
//! size of the database file. Used by `roadlog stats` to confirm loads
//! landed where expected.

use anyhow::Result;

use crate::config::Config;
use crate::schema::Table;
use crate::warehouse::{SqliteWarehouse, Warehouse};

/// Run the stats command: query the warehouse and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let warehouse = SqliteWarehouse::open(config).await?;

    let mut counts = Vec::with_capacity(Table::ALL.len());
    for table in Table::ALL {
        counts.push((table, warehouse.row_count(table).await?));
    }
    let processed = warehouse.processed_source_files().await?;
    warehouse.close().await;

    let db_size = std::fs::metadata(&config.warehouse.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("roadlog warehouse stats");
    println!("=======================");
    println!();
    println!("  Database:    {}", config.warehouse.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Dataset:     {}", config.warehouse.dataset);
    println!("  Files:       {} loaded", processed.len());
    println!();
    println!("  {:<20} {:>12}", "TABLE", "ROWS");
    println!("  {}", "-".repeat(33));
    for (table, count) in counts {
        let display = match count {
            Some(n) => n.to_string(),
            None => "missing".to_string(),
        };
        println!("  {:<20} {:>12}", table.name(), display);
    }
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
pub(crate) fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
