//! DocQuery CLI
//!
//! Main entry point for the docquery command-line tool: semantic search,
//! self-querying and answer synthesis over a document collection.

mod commands;

use clap::{Parser, Subcommand};
use commands::{EmbedCommand, QueryCommand};
use docquery_core::{config::AppConfig, logging};
use std::path::PathBuf;
use std::process::ExitCode;

/// DocQuery - question answering over a document collection
#[derive(Parser, Debug)]
#[command(name = "docquery")]
#[command(about = "Question answering over a document collection", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config file (merged over DOCQUERY_CONFIG and the environment)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Store backend (mongodb, memory)
    #[arg(long, global = true)]
    store: Option<String>,

    /// Generation model identifier
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Return the documents most similar to the query
    Search(QueryCommand),

    /// Answer the query from the most similar documents
    Ask(QueryCommand),

    /// Compute missing document embeddings
    Embed(EmbedCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(path) = &cli.config {
        config = config.merge_yaml(path)?;
    }
    let config = config.with_overrides(
        cli.store,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color)?;
    config.validate()?;

    tracing::info!("DocQuery CLI starting");
    tracing::debug!("Store: {}", config.store.backend);
    tracing::debug!("Model: {} via {}", config.llm.model, config.llm.provider);

    let command_name = match &cli.command {
        Commands::Search(_) => "search",
        Commands::Ask(_) => "ask",
        Commands::Embed(_) => "embed",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let succeeded = match cli.command {
        Commands::Search(cmd) => cmd.execute(&config, false).await?,
        Commands::Ask(cmd) => cmd.execute(&config, true).await?,
        Commands::Embed(cmd) => {
            cmd.execute(&config).await?;
            true
        }
    };

    if succeeded {
        tracing::info!("Command completed successfully");
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::warn!("Command finished with an error response");
        Ok(ExitCode::FAILURE)
    }
}
