//! Dataset qualification for operator-written SQL.
//!
//! Bare table names following `FROM`, `JOIN`, `INTO`, `UPDATE` and
//! `TABLE` (including `TABLE IF [NOT] EXISTS`) become `{dataset}.{table}`.
//! References that already contain a dot, are backtick-quoted, or name a
//! CTE from the same statement are left alone.
//!
//! This is a textual rewrite. Keywords inside string literals and
//! comments are rewritten too, as is the operand of `EXTRACT(x FROM y)`.

use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::OnceLock;

fn table_ref_re() -> &'static Regex {
    static TABLE_REF_RE: OnceLock<Regex> = OnceLock::new();
    TABLE_REF_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(FROM|JOIN|INTO|UPDATE|TABLE(?:\s+IF(?:\s+NOT)?\s+EXISTS)?)(\s+)(`[^`]*`|[\w.]+)",
        )
        .expect("valid table reference regex")
    })
}

fn cte_re() -> &'static Regex {
    static CTE_RE: OnceLock<Regex> = OnceLock::new();
    CTE_RE.get_or_init(|| {
        Regex::new(r"(?i)(?:\bWITH(?:\s+RECURSIVE)?|,)\s*(\w+)(?:\s*\([^)]*\))?\s+AS\s*\(")
            .expect("valid CTE regex")
    })
}

/// Lowercased names of CTEs defined anywhere in `sql`.
pub fn cte_names(sql: &str) -> HashSet<String> {
    cte_re()
        .captures_iter(sql)
        .map(|c| c[1].to_ascii_lowercase())
        .collect()
}

/// Prefix bare table references in `sql` with `dataset`.
pub fn qualify_tables(sql: &str, dataset: &str) -> String {
    let ctes = cte_names(sql);
    table_ref_re()
        .replace_all(sql, |caps: &Captures| {
            let table = &caps[3];
            if table.contains('.')
                || table.starts_with('`')
                || ctes.contains(&table.to_ascii_lowercase())
            {
                caps[0].to_string()
            } else {
                format!("{}{}{}.{}", &caps[1], &caps[2], dataset, table)
            }
        })
        .into_owned()
}
