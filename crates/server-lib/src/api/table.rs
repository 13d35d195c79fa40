//! Generic tabular rendering of metrics results

use crate::quantity::ResourceList;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

pub const TABLE_API_VERSION: &str = "meta.k8s.io/v1";

/// Rendering options supplied by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOptions {
    /// Omit column definitions
    #[serde(default)]
    pub no_headers: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub format: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub kind: String,
    pub api_version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub column_definitions: Vec<TableColumn>,
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn column_names(&self) -> Vec<&str> {
        self.column_definitions.iter().map(|c| c.name.as_str()).collect()
    }
}

/// One row's worth of data
pub(crate) struct TableEntry<'a> {
    pub name: &'a str,
    pub resources: ResourceList,
    pub window: Duration,
}

/// Columns are `Name`, every resource kind seen in any entry (sorted), `Window`
pub(crate) fn build_table(entries: &[TableEntry<'_>], options: &TableOptions) -> Table {
    let kinds: BTreeSet<&str> = entries
        .iter()
        .flat_map(|e| e.resources.keys().map(String::as_str))
        .collect();

    let rows = entries
        .iter()
        .map(|entry| {
            let mut cells = Vec::with_capacity(kinds.len() + 2);
            cells.push(entry.name.to_string());
            for kind in &kinds {
                cells.push(
                    entry
                        .resources
                        .get(*kind)
                        .map_or_else(|| "0".to_string(), |q| q.to_string()),
                );
            }
            cells.push(format_window(entry.window));
            TableRow { cells }
        })
        .collect();

    let column_definitions = if options.no_headers {
        Vec::new()
    } else {
        let mut columns = vec![column("Name", "name", "Name of the resource")];
        columns.extend(
            kinds
                .iter()
                .map(|kind| column(kind, "quantity", &format!("{} usage", kind))),
        );
        columns.push(column("Window", "", "Length of the sampling window"));
        columns
    };

    Table {
        kind: "Table".to_string(),
        api_version: TABLE_API_VERSION.to_string(),
        column_definitions,
        rows,
    }
}

/// Render a window the way Go prints durations: `1µs`, `1.5s`, `1m30s`, `2h0m0s`
pub(crate) fn format_window(window: Duration) -> String {
    let nanos = window.as_nanos();
    match nanos {
        0 => return "0s".to_string(),
        1..=999 => return format!("{}ns", nanos),
        1_000..=999_999 => return format!("{}µs", decimal(nanos, 1_000)),
        1_000_000..=999_999_999 => return format!("{}ms", decimal(nanos, 1_000_000)),
        _ => {}
    }

    let secs = window.as_secs();
    let (hours, minutes) = (secs / 3600, secs / 60 % 60);
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    out.push_str(&decimal(nanos % 60_000_000_000, 1_000_000_000));
    out.push('s');
    out
}

/// `value / unit` with the remainder as trimmed decimal digits
fn decimal(value: u128, unit: u128) -> String {
    let (whole, rem) = (value / unit, value % unit);
    if rem == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", rem, width = unit.ilog10() as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

fn column(name: &str, format: &str, description: &str) -> TableColumn {
    TableColumn {
        name: name.to_string(),
        column_type: "string".to_string(),
        format: format.to_string(),
        description: description.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::Quantity;

    fn entry<'a>(name: &'a str, resources: &[(&str, &str)], window_ms: u64) -> TableEntry<'a> {
        TableEntry {
            name,
            resources: resources
                .iter()
                .map(|(k, v)| (k.to_string(), v.parse::<Quantity>().unwrap()))
                .collect(),
            window: Duration::from_millis(window_ms),
        }
    }

    #[test]
    fn test_columns_are_sorted_union() {
        let entries = [
            entry("a", &[("memory", "1Gi")], 10_000),
            entry("b", &[("cpu", "250m"), ("memory", "512Mi")], 15_000),
        ];

        let table = build_table(&entries, &TableOptions::default());

        assert_eq!(table.column_names(), vec!["Name", "cpu", "memory", "Window"]);
        assert_eq!(table.rows[0].cells, vec!["a", "0", "1Gi", "10s"]);
        assert_eq!(table.rows[1].cells, vec!["b", "250m", "512Mi", "15s"]);
    }

    #[test]
    fn test_no_headers_keeps_rows() {
        let entries = [entry("a", &[("cpu", "1")], 1_000)];

        let table = build_table(&entries, &TableOptions { no_headers: true });

        assert!(table.column_definitions.is_empty());
        assert_eq!(table.rows[0].cells, vec!["a", "1", "1s"]);
    }

    #[test]
    fn test_window_uses_go_duration_form() {
        let cases = [
            (Duration::ZERO, "0s"),
            (Duration::from_nanos(500), "500ns"),
            (Duration::from_micros(1), "1µs"),
            (Duration::from_nanos(1_500), "1.5µs"),
            (Duration::from_millis(250), "250ms"),
            (Duration::from_millis(1_500), "1.5s"),
            (Duration::from_secs(10), "10s"),
            (Duration::from_secs(90), "1m30s"),
            (Duration::from_secs(3600), "1h0m0s"),
            (Duration::from_millis(3_723_250), "1h2m3.25s"),
        ];

        for (window, expected) in cases {
            assert_eq!(format_window(window), expected, "{:?}", window);
        }
    }

    #[test]
    fn test_empty_input() {
        let table = build_table(&[], &TableOptions::default());
        assert_eq!(table.column_names(), vec!["Name", "Window"]);
        assert!(table.rows.is_empty());
    }
}
