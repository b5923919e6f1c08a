//! Output formatting for catalog results.
//!
//! Supports table, JSON and plain output formats.

use comfy_table::{Cell, ContentArrangement, Table as TextTable};
use serde_json::{json, Value as JsonValue};

use cinder_client::{Client, Table};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Formatted table output.
    Table,
    /// JSON output.
    Json,
    /// One canonical name per line.
    Plain,
}

/// Formats tables according to the specified format.
pub fn format_tables(tables: &[Table], format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_table(tables),
        OutputFormat::Json => format_json(tables),
        OutputFormat::Plain => format_plain(tables),
    }
}

fn format_table(tables: &[Table]) -> String {
    let mut table = TextTable::new();

    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
        .set_header(vec!["id", "schema", "name"]);

    for t in tables {
        table.add_row(vec![
            Cell::new(t.id()),
            Cell::new(t.schema()),
            Cell::new(t.table_name()),
        ]);
    }

    table.to_string()
}

fn format_json(tables: &[Table]) -> String {
    let rows: Vec<JsonValue> = tables
        .iter()
        .map(|t| {
            json!({
                "id": t.id().as_u64(),
                "schema": t.schema(),
                "name": t.table_name(),
                "canonical": t.name(),
            })
        })
        .collect();

    serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
}

fn format_plain(tables: &[Table]) -> String {
    tables
        .iter()
        .map(|t| t.name())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Formats a short description of the session.
pub fn format_session(client: &Client) -> String {
    let stats = client.stats();
    format!(
        "connected to {} ({})\nsession:  {}\nprotocol: {}\nattempts: {} ({} failed)",
        client.node_name(),
        client.endpoint(),
        client.session_id(),
        client.server_version(),
        stats.connection_attempts,
        stats.connection_failures,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_client::{QualifiedName, TableId};

    fn sample() -> Vec<Table> {
        vec![
            Table::new(TableId::new(1), QualifiedName::from_parts("PUB", "TBL1")),
            Table::new(TableId::new(2), QualifiedName::from_parts("Sales", "q1")),
        ]
    }

    #[test]
    fn test_plain() {
        assert_eq!(format_tables(&sample(), OutputFormat::Plain), "PUB.TBL1\nSales.q1");
    }

    #[test]
    fn test_json() {
        let out = format_tables(&sample(), OutputFormat::Json);
        let parsed: JsonValue = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed[0]["canonical"], "PUB.TBL1");
        assert_eq!(parsed[1]["schema"], "Sales");
        assert_eq!(parsed[1]["id"], 2);
    }

    #[test]
    fn test_table_contains_names() {
        let out = format_tables(&sample(), OutputFormat::Table);
        assert!(out.contains("TBL1"));
        assert!(out.contains("Sales"));
    }
}
