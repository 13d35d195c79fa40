//! mtop - resource usage viewer
//!
//! A command-line tool that shows node and pod CPU/memory usage as served
//! by the cluster metrics server.

use anyhow::Result;
use clap::{Parser, Subcommand};
use mtop_cli::{
    client::MetricsClient,
    commands::{nodes, pods},
    config::Config,
    output::{print_error, OutputFormat},
};

/// Resource usage viewer for the cluster metrics server
#[derive(Parser)]
#[command(name = "mtop")]
#[command(author, version, about = "Show node and pod resource usage", long_about = None)]
pub struct Cli {
    /// Metrics server URL (can also be set via MTOP_SERVER_URL env var)
    #[arg(long, env = "MTOP_SERVER_URL", global = true)]
    pub server: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: OutputFormat,

    /// Do not print column headers
    #[arg(long, global = true)]
    pub no_headers: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show node usage
    Nodes {
        /// Node name (shows all nodes if not specified)
        name: Option<String>,

        /// Label selector, e.g. `zone=eu-1,gpu`
        #[arg(long, short = 'l')]
        selector: Option<String>,
    },

    /// Show pod usage
    Pods {
        /// Pod name (shows all pods in the namespace if not specified)
        name: Option<String>,

        /// Namespace to query
        #[arg(long, short)]
        namespace: Option<String>,

        /// Query pods in all namespaces
        #[arg(long, short = 'A', conflicts_with = "namespace")]
        all_namespaces: bool,

        /// Label selector
        #[arg(long, short = 'l')]
        selector: Option<String>,

        /// Show usage per container
        #[arg(long)]
        containers: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    // Initialize client
    let client = MetricsClient::new(&config.server_url(cli.server.as_deref()))?;

    // Execute command
    match cli.command {
        Commands::Nodes { name, selector } => {
            nodes::show_nodes(
                &client,
                name.as_deref(),
                selector.as_deref(),
                cli.format,
                cli.no_headers,
            )
            .await?;
        }
        Commands::Pods {
            name,
            namespace,
            all_namespaces,
            selector,
            containers,
        } => {
            let query = pods::PodQuery {
                name,
                namespace: config.namespace(namespace.as_deref()),
                all_namespaces,
                selector,
                containers,
            };
            pods::show_pods(&client, &query, cli.format, cli.no_headers).await?;
        }
    }

    Ok(())
}
