//! Rendering of lookup results.

use anyhow::{Context, Result};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use dirlookup_core::directory::SearchRecord;

/// Longest value shown in a table cell before it is cut.
const MAX_CELL_LEN: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One table per returned entry.
    Table,
    /// A JSON array of attribute maps.
    Json,
}

pub fn render(records: &[SearchRecord], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(records).context("failed to serialize results")
        }
        OutputFormat::Table => Ok(render_tables(records)),
    }
}

fn render_tables(records: &[SearchRecord]) -> String {
    if records.is_empty() {
        return "No matching users found.".to_string();
    }

    let mut out = String::new();
    for (i, record) in records.iter().enumerate() {
        let title = record
            .get("distinguishedName")
            .and_then(|v| v.first())
            .map(String::as_str)
            .unwrap_or("(no distinguishedName)");
        out.push_str(&format!("Entry {}: {}\n", i + 1, title));

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Attribute", "Value"]);

        for (name, values) in record {
            let shown: Vec<String> = values.iter().map(|v| truncate(v, MAX_CELL_LEN)).collect();
            table.add_row(vec![Cell::new(name), Cell::new(shown.join("\n"))]);
        }

        out.push_str(&table.to_string());
        out.push('\n');
    }
    out.push_str(&format!("{} user object(s) found", records.len()));
    out
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
