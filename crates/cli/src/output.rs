//! Output formatting utilities

use crate::client::Table;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{builder::Builder, settings::Style};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Render rows under an optional header; columns come from the data
pub fn render_rows(header: Option<&[String]>, rows: &[Vec<String>]) -> String {
    let mut builder = Builder::default();
    if let Some(header) = header {
        builder.push_record(header.iter().cloned());
    }
    for row in rows {
        builder.push_record(row.iter().cloned());
    }

    let mut table = builder.build();
    if header.is_some() {
        table.with(Style::rounded());
    } else {
        table.with(Style::blank());
    }
    table.to_string()
}

/// Render a server table, with or without its column headers
pub fn render_server_table(table: &Table, no_headers: bool) -> String {
    let header: Vec<String> = table
        .column_definitions
        .iter()
        .map(|c| c.name.to_uppercase())
        .collect();
    let rows: Vec<Vec<String>> = table.rows.iter().map(|r| r.cells.clone()).collect();

    let show_header = !no_headers && !header.is_empty();
    render_rows(show_header.then_some(header.as_slice()), &rows)
}

pub fn print_server_table(table: &Table, no_headers: bool) {
    if table.rows.is_empty() {
        print_warning("No resources found");
        return;
    }
    println!("{}", render_server_table(table, no_headers));
}

pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => print_error(&format!("Failed to serialize output: {}", e)),
    }
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{TableColumn, TableRow};

    fn table() -> Table {
        Table {
            column_definitions: ["Name", "cpu", "Window"]
                .iter()
                .map(|n| TableColumn {
                    name: n.to_string(),
                })
                .collect(),
            rows: vec![TableRow {
                cells: vec!["node-a".into(), "250m".into(), "10s".into()],
            }],
        }
    }

    #[test]
    fn test_render_with_headers() {
        let rendered = render_server_table(&table(), false);

        assert!(rendered.contains("NAME"));
        assert!(rendered.contains("CPU"));
        assert!(rendered.contains("node-a"));
        assert!(rendered.contains("250m"));
    }

    #[test]
    fn test_render_without_headers() {
        let rendered = render_server_table(&table(), true);

        assert!(!rendered.contains("NAME"));
        assert!(rendered.contains("node-a"));
    }
}
