//! Cairn CLI - Command line interface for the project knowledge graph

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use cairn_core::MemoryManager;
use cairn_storage::RedbStorage;
use commands::{analyze, completions, entity, io, query, relation};
use config::Config;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "cairn")]
#[command(author, version, about = "Versioned knowledge graph for project decisions and code")]
pub struct Cli {
    /// Data directory
    #[arg(short, long, global = true, env = "CAIRN_DATA_DIR")]
    pub data_dir: Option<String>,

    /// Output format: json, text
    #[arg(short, long, global = true)]
    pub format: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Data directory: flag, then config file, then ~/.cairn
    pub fn data_dir(&self, config: &Config) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| config.data_dir())
    }

    pub fn output_format(&self, config: &Config) -> OutputFormat {
        self.format
            .as_deref()
            .or(config.format.as_deref())
            .map(OutputFormat::from)
            .unwrap_or_default()
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage entities
    Entity(entity::EntityArgs),
    /// Manage relationships
    Relation(relation::RelationArgs),
    /// Query entities with filters and keywords
    Query(query::QueryArgs),
    /// Entities reachable from a root entity
    Related(analyze::RelatedArgs),
    /// Shortest or strongest path between two entities
    Path(analyze::PathArgs),
    /// Compute patterns, inferred relationships and recommendations
    Analyze,
    /// Capture a snapshot of the graph with fresh intelligence
    Snapshot,
    /// Decay relevance and purge orphaned relationships
    Optimize,
    /// Show graph counters
    Stats,
    /// Import a graph from a JSON file
    Import(io::ImportArgs),
    /// Export the graph as JSON
    Export(io::ExportArgs),
    /// Manage CLI configuration
    Config(commands::config::ConfigArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Application context with an initialized memory manager
pub struct AppContext {
    pub manager: Arc<MemoryManager>,
    pub format: OutputFormat,
}

impl AppContext {
    pub async fn new(cli: &Cli, config: &Config) -> anyhow::Result<Self> {
        let data_dir = cli.data_dir(config);
        std::fs::create_dir_all(&data_dir)?;

        let db_path = data_dir.join("cairn.redb");
        tracing::debug!("Using database at: {:?}", db_path);

        let storage = RedbStorage::open(&db_path)?;
        let manager = MemoryManager::new(Arc::new(storage), config.manager.clone());
        manager.initialize().await?;

        Ok(Self {
            manager: Arc::new(manager),
            format: cli.output_format(config),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    tracing::debug!("Starting cairn CLI");

    // Commands that never touch the database
    match &cli.command {
        Commands::Config(args) => return commands::config::run(args),
        Commands::Completions(args) => return completions::run(args),
        _ => {}
    }

    let config = Config::load();
    let ctx = AppContext::new(&cli, &config).await?;

    match &cli.command {
        Commands::Entity(args) => entity::run(args, &ctx).await?,
        Commands::Relation(args) => relation::run(args, &ctx).await?,
        Commands::Query(args) => query::run(args, &ctx).await?,
        Commands::Related(args) => analyze::run_related(args, &ctx).await?,
        Commands::Path(args) => analyze::run_path(args, &ctx).await?,
        Commands::Analyze => analyze::run_analyze(&ctx).await?,
        Commands::Snapshot => analyze::run_snapshot(&ctx).await?,
        Commands::Optimize => analyze::run_optimize(&ctx).await?,
        Commands::Stats => analyze::run_stats(&ctx).await?,
        Commands::Import(args) => io::run_import(args, &ctx).await?,
        Commands::Export(args) => io::run_export(args, &ctx).await?,
        Commands::Config(_) | Commands::Completions(_) => {}
    }

    Ok(())
}
