//! Picking which drive-log files a run should process.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A candidate input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the data directory with `/` separators. This is
    /// the value recorded in `Source_File`.
    pub name: String,
    pub path: PathBuf,
}

/// Every file under `dir` matching one of `include_globs`, sorted by name.
pub fn list_candidates(dir: &Path, include_globs: &[String]) -> Result<Vec<SourceFile>> {
    if !dir.is_dir() {
        bail!("Data directory does not exist: {}", dir.display());
    }

    let include_set = build_globset(include_globs)?;
    let mut files = Vec::new();

    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if !include_set.is_match(&name) {
            continue;
        }

        files.push(SourceFile {
            name,
            path: path.to_path_buf(),
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Drop candidates whose name is already recorded in the warehouse.
pub fn select_unprocessed(candidates: Vec<SourceFile>, processed: &HashSet<String>) -> Vec<SourceFile> {
    candidates
        .into_iter()
        .filter(|f| !processed.contains(&f.name))
        .collect()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
