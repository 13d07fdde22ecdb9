use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::warehouse::WriteMode;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub warehouse: WarehouseConfig,
    pub ingest: IngestConfig,
    #[serde(default)]
    pub validate: ValidateConfig,
    #[serde(default)]
    pub paser: PaserConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WarehouseConfig {
    pub path: PathBuf,
    /// Qualifier prepended to bare table names in operator SQL.
    #[serde(default = "default_dataset")]
    pub dataset: String,
}

fn default_dataset() -> String {
    "main".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    pub data_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_mode")]
    pub default_mode: String,
    #[serde(default = "default_reconcile")]
    pub reconcile_identity: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["*.json".to_string()]
}
fn default_location() -> String {
    "Fort Wayne, IN".to_string()
}
fn default_mode() -> String {
    "append".to_string()
}
fn default_reconcile() -> bool {
    true
}

impl IngestConfig {
    pub fn write_mode(&self) -> Result<WriteMode> {
        self.default_mode
            .parse()
            .map_err(|e: String| anyhow::anyhow!("ingest.default_mode: {}", e))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidateConfig {
    #[serde(default)]
    pub confidence_default: f64,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            confidence_default: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PaserConfig {
    #[serde(default)]
    pub ratings_path: Option<PathBuf>,
}

impl Config {
    /// Config rooted at a warehouse path and data directory, everything else
    /// at its default.
    pub fn minimal(warehouse_path: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            warehouse: WarehouseConfig {
                path: warehouse_path,
                dataset: default_dataset(),
            },
            ingest: IngestConfig {
                data_dir,
                include_globs: default_include_globs(),
                location: default_location(),
                default_mode: default_mode(),
                reconcile_identity: default_reconcile(),
            },
            validate: ValidateConfig::default(),
            paser: PaserConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.warehouse.dataset.is_empty()
        || !config
            .warehouse
            .dataset
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        anyhow::bail!(
            "warehouse.dataset must be a non-empty identifier, got '{}'",
            config.warehouse.dataset
        );
    }

    if config.ingest.include_globs.is_empty() {
        anyhow::bail!("ingest.include_globs must not be empty");
    }

    config.ingest.write_mode()?;

    if !config.validate.confidence_default.is_finite() {
        anyhow::bail!("validate.confidence_default must be a finite number");
    }

    Ok(config)
}
