//! Load progress reporting.
//!
//! Reports observable progress during `roadlog load` so operators see which
//! file is being normalized and which table is being written. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for a load run.
#[derive(Clone, Debug)]
pub enum LoadProgressEvent {
    /// Listing the data directory and diffing against the warehouse.
    Selecting,
    /// File `n` of `total` is being decoded.
    Normalizing { file: String, n: u64, total: u64 },
    /// Table `n` of `total` is being written.
    Uploading {
        table: String,
        rows: u64,
        n: u64,
        total: u64,
    },
}

/// Reports load progress. Implementations write to stderr (human or JSON).
pub trait LoadProgressReporter: Send + Sync {
    fn report(&self, event: LoadProgressEvent);
}

/// Human-friendly progress on stderr: "load  normalizing  3 / 12 files  run_03.json".
pub struct StderrProgress;

impl LoadProgressReporter for StderrProgress {
    fn report(&self, event: LoadProgressEvent) {
        let line = match &event {
            LoadProgressEvent::Selecting => "load  selecting files...\n".to_string(),
            LoadProgressEvent::Normalizing { file, n, total } => format!(
                "load  normalizing  {} / {} files  {}\n",
                format_number(*n),
                format_number(*total),
                file
            ),
            LoadProgressEvent::Uploading {
                table,
                rows,
                n,
                total,
            } => format!(
                "load  uploading  {} / {} tables  {} ({} rows)\n",
                n,
                total,
                table,
                format_number(*rows)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl LoadProgressReporter for JsonProgress {
    fn report(&self, event: LoadProgressEvent) {
        let obj = match &event {
            LoadProgressEvent::Selecting => serde_json::json!({
                "event": "progress",
                "phase": "selecting"
            }),
            LoadProgressEvent::Normalizing { file, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "normalizing",
                "file": file,
                "n": n,
                "total": total
            }),
            LoadProgressEvent::Uploading {
                table,
                rows,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "phase": "uploading",
                "table": table,
                "rows": rows,
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl LoadProgressReporter for NoProgress {
    fn report(&self, _event: LoadProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn LoadProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
