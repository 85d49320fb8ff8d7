//! kgraph CLI - ingest text into the knowledge graph and inspect it

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use kgraph_core::config::Config;
use kgraph_core::domain::graph::{
    DuplicateStatus, IngestResult, Node, ORPHAN_SCAN_LIMIT, SourceContext, compute_item_hash,
    short_id,
};
use kgraph_core::services::Services;
use kgraph_core::storage::Database;
use tracing::warn;

#[derive(Parser)]
#[command(name = "kgraph")]
#[command(author, version, about = "Knowledge graph ingestion and semantic linking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Distill a text file and add it to the graph
    Ingest {
        /// File holding the raw text ("-" for stdin)
        file: PathBuf,
        /// Where the text came from
        #[arg(long)]
        source: String,
        /// Topic the text belongs to
        #[arg(long)]
        topic: String,
        /// Source type (news, report, strategic-briefing, ...)
        #[arg(long, default_value = "document")]
        source_type: String,
        /// Original URL of the document
        #[arg(long)]
        url: Option<String>,
        /// Source timestamp (ISO-8601)
        #[arg(long)]
        timestamp: Option<String>,
        /// Never write to the vector index for this document
        #[arg(long, conflicts_with = "force_index")]
        no_index: bool,
        /// Index even if the source type is excluded by default
        #[arg(long)]
        force_index: bool,
        /// Item hash from the source; computed from the text when absent
        #[arg(long)]
        hash: Option<String>,
        /// Ingest even if the URL or hash is already in the graph
        #[arg(long)]
        force: bool,
    },

    /// Show one node and its edges
    Node {
        /// Node ID
        id: String,
    },

    /// Node and edge counts by type
    Stats,

    /// Nodes with no edges
    Orphans {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Also count orphans for this topic
        #[arg(long)]
        topic: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("kgraph=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            file,
            source,
            topic,
            source_type,
            url,
            timestamp,
            no_index,
            force_index,
            hash,
            force,
        } => {
            let mut context = SourceContext::new(source, topic, source_type);
            if let Some(hash) = hash {
                context = context.with_hash(hash);
            }
            if let Some(url) = url {
                context = context.with_original_url(url);
            }
            if let Some(timestamp) = timestamp {
                context = context.with_timestamp(timestamp);
            }
            if no_index {
                context = context.with_index_override(false);
            } else if force_index {
                context = context.with_index_override(true);
            }
            cmd_ingest(&file, context, force, cli.format, cli.quiet).await
        }

        Commands::Node { id } => cmd_node(&id, cli.format).await,

        Commands::Stats => cmd_stats(cli.format).await,

        Commands::Orphans { limit, topic } => {
            cmd_orphans(limit, topic.as_deref(), cli.format).await
        }

        Commands::Config { action } => cmd_config(action, cli.quiet),

        Commands::Doctor => cmd_doctor(cli.quiet).await,
    }
}

async fn open_services() -> anyhow::Result<Services> {
    let config = Config::load()?;
    Services::open(config).await
}

fn read_input(file: &Path) -> anyhow::Result<String> {
    if file.as_os_str() == "-" {
        return std::io::read_to_string(std::io::stdin()).context("Failed to read stdin");
    }
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

/// Item hash over the first non-blank line, the timestamp and the text
fn document_hash(raw_text: &str, context: &SourceContext) -> String {
    let title = raw_text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    compute_item_hash(
        title,
        context.timestamp.as_deref(),
        Some(raw_text),
        context.hash.as_deref(),
    )
}

async fn cmd_ingest(
    file: &Path,
    mut context: SourceContext,
    force: bool,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let raw_text = read_input(file)?;
    let hash = document_hash(&raw_text, &context);
    context = context.with_hash(hash);

    let services = open_services().await?;

    if !force {
        let status = services
            .dedup()
            .check(context.original_url.as_deref(), context.hash.as_deref())
            .await?;
        if status.is_duplicate() {
            services.close().await;
            print_duplicate(&status, format, quiet)?;
            return Ok(());
        }
    }

    let engine = services.engine()?;
    let result = engine.ingest(&raw_text, &context).await?;
    services.close().await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text if !quiet => print_ingest(&result),
        OutputFormat::Text => {}
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn print_duplicate(status: &DuplicateStatus, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let (matched_on, existing) = match status {
        DuplicateStatus::DuplicateUrl(id) => ("url", id.as_str()),
        DuplicateStatus::DuplicateHash(id) => ("hash", id.as_str()),
        DuplicateStatus::New => return Ok(()),
    };

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "duplicate": true,
                "matched_on": matched_on,
                "existing_node_id": existing,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text if !quiet => {
            println!(
                "Skipped: already ingested as {} (same {}). Use --force to ingest anyway.",
                short_id(existing),
                matched_on
            );
        }
        OutputFormat::Text => {}
    }
    Ok(())
}

fn print_ingest(result: &IngestResult) {
    if let Some(reason) = &result.reason {
        println!("No nodes created: {}", reason);
    }
    println!("Created {} node(s)", result.nodes_created);
    for node in &result.nodes {
        let id = node.node_id.as_deref().map(short_id).unwrap_or("--------");
        let indexed = if node.indexed { "indexed" } else { "not indexed" };
        println!(
            "  {}  {}  [{}, {} connection(s)]",
            id, node.title, indexed, node.connections_created
        );
        if let Some(error) = &node.error {
            println!("      error: {}", error);
        }
    }
}

async fn cmd_node(id: &str, format: OutputFormat) -> anyhow::Result<()> {
    let services = open_services().await?;
    let repository = services.repository();

    let node = repository
        .get_node(id)
        .await?
        .ok_or_else(|| kgraph_core::Error::NodeNotFound(id.to_string()))?;
    let edges = repository.list_edges_for_node(id).await?;

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({ "node": node, "edges": edges });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            print_node(&node);
            println!("Edges ({}):", edges.len());
            for edge in edges {
                let justification = edge
                    .metadata
                    .as_ref()
                    .map(|m| format!(" ({})", m.justification))
                    .unwrap_or_default();
                println!(
                    "  {} -[{}]-> {}{}",
                    short_id(&edge.source_id),
                    edge.relationship_type,
                    short_id(&edge.target_id),
                    justification
                );
            }
        }
    }
    Ok(())
}

fn print_node(node: &Node) {
    println!("{} [{}]", node.label, node.node_type);
    println!("  id:      {}", node.id);
    println!("  created: {}", node.created_at.to_rfc3339());
    if let Some(source) = &node.properties.source {
        println!("  source:  {}", source);
    }
    if let Some(topic) = &node.properties.topic {
        println!("  topic:   {}", topic);
    }
    if let Some(url) = &node.properties.original_url {
        println!("  url:     {}", url);
    }
}

async fn cmd_stats(format: OutputFormat) -> anyhow::Result<()> {
    let services = open_services().await?;
    let stats = services.repository().stats().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => {
            println!("Nodes: {}", stats.total_nodes);
            for (node_type, count) in &stats.nodes_by_type {
                println!("  {:<20} {}", node_type, count);
            }
            println!("Edges: {}", stats.total_edges);
            for (edge_type, count) in &stats.edges_by_type {
                println!("  {:<20} {}", edge_type, count);
            }
        }
    }
    Ok(())
}

async fn cmd_orphans(limit: usize, topic: Option<&str>, format: OutputFormat) -> anyhow::Result<()> {
    let services = open_services().await?;
    let curator = services.curator();
    let orphans = curator.orphan_nodes(limit.min(ORPHAN_SCAN_LIMIT)).await?;
    let report = curator.run_cycle(topic).await?;

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({ "report": report, "orphans": orphans });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!(
                "{} orphan(s), {} hub(s)",
                report.orphan_count, report.hub_count
            );
            if let (Some(topic), Some(count)) = (&report.topic, report.topic_orphan_count) {
                println!("{} orphan(s) in topic '{}'", count, topic);
            }
            for node in orphans {
                println!("  {}  [{}]  {}", short_id(&node.id), node.node_type, node.label);
            }
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("kgraph Health Check");
        println!("===================");
        println!();
    }

    let mut all_ok = true;

    let config = match Config::load() {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }
            Some(config)
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Configuration: Error - {}", e);
            }
            None
        }
    };

    if let Some(config) = &config {
        match config.llm.redacted_api_key() {
            Ok(Some(redacted)) => {
                if !quiet {
                    println!("[OK] API Key: Configured ({})", redacted);
                }
            }
            Ok(None) => {
                all_ok = false;
                if !quiet {
                    warn!("API Key: Not configured");
                    println!("[!!] API Key: Not configured");
                    println!("     Set KGRAPH_API_KEY or OPENROUTER_API_KEY environment variable");
                }
            }
            Err(e) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] API Key: Error - {}", e);
                }
            }
        }

        if !quiet {
            println!(
                "[--] Vector index: {}",
                config.vector_index.backend.as_str()
            );
        }

        match config.database_path() {
            Ok(path) => match Database::open(&path).await {
                Ok(db) => {
                    let healthy = db.health_check().await.is_ok();
                    let status = db.migration_status().await.ok();
                    db.close().await;
                    if healthy {
                        if !quiet {
                            println!("[OK] Graph store: {}", path.display());
                            if let Some(status) = status {
                                println!("     Schema version: {}", status.current_version);
                            }
                        }
                    } else {
                        all_ok = false;
                        if !quiet {
                            println!("[!!] Graph store: health check failed");
                        }
                    }
                }
                Err(e) => {
                    all_ok = false;
                    if !quiet {
                        println!("[!!] Graph store: Error - {}", e);
                    }
                }
            },
            Err(e) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] Graph store: Error - {}", e);
                }
            }
        }
    }

    if !quiet {
        match Config::config_path() {
            Ok(path) if path.exists() => println!("[OK] Config file: {}", path.display()),
            Ok(path) => println!("[--] Config file: {} (using defaults)", path.display()),
            Err(e) => println!("[!!] Config file: Error - {}", e),
        }
        println!();
        if all_ok {
            println!("All checks passed.");
        } else {
            println!("Some checks failed.");
        }
    }

    Ok(())
}
