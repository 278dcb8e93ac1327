use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tributary_core::{Config, Severity, TableIdentifier};
use tributary_lineage::RootCauseReport;
use tributary_server::{build_service, connect_warehouse, serve};

/// Tributary - table lineage and root-cause analysis for BigQuery
#[derive(Parser)]
#[command(name = "tributary")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: tributary.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Bind address (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Listen port (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the lineage graph of a table
    Lineage {
        /// Fully qualified table (project.dataset.table)
        table: String,

        /// upstream, downstream or both
        #[arg(short, long, default_value = "both")]
        direction: String,

        /// Hops to follow (clamped to lineage.max_depth)
        #[arg(long)]
        depth: Option<u32>,

        /// Print the raw JSON graph
        #[arg(long)]
        json: bool,
    },

    /// Rank upstream tables likely to explain a data incident
    RootCause {
        /// Fully qualified table (project.dataset.table)
        table: String,

        /// Print the raw JSON report
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // .env is optional
    let _ = dotenvy::dotenv();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let mut config = load_config(&cli)?;
    config.apply_env()?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve_command(config).await
        }
        Commands::Lineage {
            table,
            direction,
            depth,
            json,
        } => lineage_command(config, &table, &direction, depth, json).await,
        Commands::RootCause { table, json } => root_cause_command(config, &table, json).await,
    }
}

/// Explicit path, then ./tributary.toml, then defaults
fn load_config(cli: &Cli) -> Result<Config> {
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if Path::new("tributary.toml").exists() {
        Config::from_file(Path::new("tributary.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };
    Ok(config)
}

async fn serve_command(config: Config) -> Result<()> {
    let adapter = connect_warehouse(&config.warehouse).await?;
    let service = build_service(adapter, config).await;

    eprintln!(
        "{} http://{}:{}",
        "Tributary listening on".green().bold(),
        service.config().server.host,
        service.config().server.port
    );
    serve(service).await
}

async fn lineage_command(
    config: Config,
    table: &str,
    direction: &str,
    depth: Option<u32>,
    json: bool,
) -> Result<()> {
    let table = TableIdentifier::parse(table)?;
    let adapter = connect_warehouse(&config.warehouse).await?;
    let service = build_service(adapter, config).await;

    let graph = service.lineage(&table, Some(direction), depth).await?.value;

    if json {
        println!("{}", serde_json::to_string_pretty(&graph)?);
        return Ok(());
    }

    println!("{} {}", "Lineage of".cyan().bold(), table.fqn().bold());
    let mut nodes: Vec<_> = graph.nodes().filter(|n| n.level > 0).collect();
    nodes.sort_by(|a, b| (a.level, &a.id).cmp(&(b.level, &b.id)));
    for node in &nodes {
        println!("  {} {} ({})", format!("[{}]", node.level).dimmed(), node.id, node.kind.as_str());
    }
    println!();
    for edge in graph.edges() {
        println!("  {} {} {}", edge.source, "->".dimmed(), edge.target);
    }
    println!(
        "\n{} {} nodes, {} edges",
        "Summary:".bold(),
        graph.node_count(),
        graph.edge_count()
    );
    Ok(())
}

async fn root_cause_command(config: Config, table: &str, json: bool) -> Result<()> {
    let table = TableIdentifier::parse(table)?;
    let adapter = connect_warehouse(&config.warehouse).await?;
    let service = build_service(adapter, config).await;

    let report = service.root_cause(&table).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&table, &report);
    Ok(())
}

fn print_report(table: &TableIdentifier, report: &RootCauseReport) {
    println!("{} {}", "Root-cause analysis for".cyan().bold(), table.fqn().bold());
    println!("  analyzed {} tables\n", report.analyzed_nodes);

    for suspect in &report.suspicious_nodes {
        let label = match suspect.severity {
            Severity::Critical => "CRITICAL".red().bold(),
            Severity::Warning => "WARNING".yellow().bold(),
            Severity::Info => "INFO".blue(),
        };
        println!("{} {}", label, suspect.node.id);
        for issue in &suspect.issues {
            println!("    - {}", issue);
        }
    }

    println!("\n{} {}", "Recommendation:".green().bold(), report.recommendation);
}
