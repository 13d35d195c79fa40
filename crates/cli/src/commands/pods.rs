//! `mtop pods`

use anyhow::{bail, Result};
use std::collections::BTreeSet;

use crate::client::{MetricsClient, PodMetrics, PodMetricsList};
use crate::output::{print_json, print_server_table, print_warning, render_rows, OutputFormat};

/// Which pods to show
#[derive(Debug, Clone, Default)]
pub struct PodQuery {
    pub name: Option<String>,
    /// Resolved namespace; ignored with `all_namespaces`
    pub namespace: String,
    pub all_namespaces: bool,
    pub selector: Option<String>,
    /// Show one row per container instead of per pod
    pub containers: bool,
}

impl PodQuery {
    pub fn path(&self) -> Result<String> {
        match (&self.name, self.all_namespaces) {
            (Some(_), true) => bail!("a pod cannot be retrieved by name across all namespaces"),
            (Some(name), false) => Ok(format!("namespaces/{}/pods/{}", self.namespace, name)),
            (None, true) => Ok("pods".to_string()),
            (None, false) => Ok(format!("namespaces/{}/pods", self.namespace)),
        }
    }
}

/// Show pod usage
pub async fn show_pods(
    client: &MetricsClient,
    query: &PodQuery,
    format: OutputFormat,
    no_headers: bool,
) -> Result<()> {
    let path = query.path()?;
    let selector = query.selector.as_deref();

    match (format, query.containers) {
        (OutputFormat::Json, _) => {
            let value: serde_json::Value = client.get(&path, selector).await?;
            print_json(&value);
        }
        (OutputFormat::Table, false) => {
            let table = client.get_table(&path, selector, no_headers).await?;
            print_server_table(&table, no_headers);
        }
        (OutputFormat::Table, true) => {
            let pods = match query.name {
                Some(_) => vec![client.get::<PodMetrics>(&path, selector).await?],
                None => client.get::<PodMetricsList>(&path, selector).await?.items,
            };
            if pods.is_empty() {
                print_warning("No resources found");
                return Ok(());
            }
            let (header, rows) = container_rows(&pods, query.all_namespaces);
            let header = (!no_headers).then_some(header);
            println!("{}", render_rows(header.as_deref(), &rows));
        }
    }

    Ok(())
}

/// One row per container; resource columns are the union across containers
pub fn container_rows(pods: &[PodMetrics], with_namespace: bool) -> (Vec<String>, Vec<Vec<String>>) {
    let kinds: BTreeSet<&str> = pods
        .iter()
        .flat_map(|p| p.containers.iter())
        .flat_map(|c| c.usage.keys().map(String::as_str))
        .collect();

    let mut header = Vec::new();
    if with_namespace {
        header.push("NAMESPACE".to_string());
    }
    header.push("POD".to_string());
    header.push("NAME".to_string());
    header.extend(kinds.iter().map(|k| k.to_uppercase()));

    let mut rows = Vec::new();
    for pod in pods {
        for container in &pod.containers {
            let mut row = Vec::with_capacity(header.len());
            if with_namespace {
                row.push(pod.metadata.namespace.clone().unwrap_or_default());
            }
            row.push(pod.metadata.name.clone());
            row.push(container.name.clone());
            row.extend(
                kinds
                    .iter()
                    .map(|k| container.usage.get(*k).cloned().unwrap_or_else(|| "0".to_string())),
            );
            rows.push(row);
        }
    }

    (header, rows)
}
