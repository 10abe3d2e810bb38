//! Markdown summary rendered from the CSV rows.

use chrono::{DateTime, Utc};
use std::fmt::Write;

use super::csv::CsvRow;

/// Render the summary table; one line per row, in row order
pub fn render(rows: &[CsvRow], run_at: DateTime<Utc>) -> String {
    let mut md = String::new();

    let _ = writeln!(md, "# Literature Summary ({})", run_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(md);
    let _ = writeln!(md, "{} publications.", rows.len());
    let _ = writeln!(md);
    md.push_str("| # | Title | Authors | Journal | Publication Date | DOI | Sources |\n");
    md.push_str("| --- | --- | --- | --- | --- | --- | --- |\n");

    for (i, row) in rows.iter().enumerate() {
        let doi = if row.doi.is_empty() {
            String::new()
        } else {
            format!("[{}](https://doi.org/{})", escape(&row.doi), row.doi)
        };

        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} | {} |",
            i + 1,
            escape(&row.title),
            escape(&row.author_list().join(", ")),
            escape(&row.journal),
            row.pub_date,
            doi,
            row.matched_source_list().join(", "),
        );
    }

    md
}

/// Make a value safe inside a table cell
fn escape(value: &str) -> String {
    value
        .replace('|', "\\|")
        .replace(['\r', '\n'], " ")
}
