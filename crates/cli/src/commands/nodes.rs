//! `mtop nodes`

use anyhow::Result;

use crate::client::MetricsClient;
use crate::output::{print_json, print_server_table, OutputFormat};

/// Resource path for all nodes or a single node
pub fn node_path(name: Option<&str>) -> String {
    match name {
        Some(name) => format!("nodes/{}", name),
        None => "nodes".to_string(),
    }
}

/// Show node usage
pub async fn show_nodes(
    client: &MetricsClient,
    name: Option<&str>,
    selector: Option<&str>,
    format: OutputFormat,
    no_headers: bool,
) -> Result<()> {
    let path = node_path(name);

    match format {
        OutputFormat::Table => {
            let table = client.get_table(&path, selector, no_headers).await?;
            print_server_table(&table, no_headers);
        }
        OutputFormat::Json => {
            let value: serde_json::Value = client.get(&path, selector).await?;
            print_json(&value);
        }
    }

    Ok(())
}
