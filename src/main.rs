//! RAG server CLI
//!
//! Serves document ingestion and question answering over HTTP.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rag_evaluator::{config::Config, llm::LlmClient, logging::init_logging, server};
use std::path::PathBuf;

/// RAG server - retrieval-augmented question answering over uploaded documents
#[derive(Parser)]
#[command(name = "rag-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to bind (overrides RAG_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides RAG_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory uploads are stored in (overrides RAG_DATA_DIR)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Test LLM connection
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            data_dir,
        } => cmd_serve(host, port, data_dir).await,
        Commands::Test => cmd_test().await,
    }
}

async fn cmd_serve(
    host: Option<String>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(data_dir) = data_dir {
        config.server.data_dir = data_dir;
    }

    init_logging(&config.logging);
    config.validate().context("Invalid configuration")?;

    server::serve(&config).await
}

async fn cmd_test() -> Result<()> {
    println!("Testing LLM connection...\n");

    let config = Config::load().context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    println!(
        "  API Key:   {}...",
        config.llm.api_key.chars().take(8).collect::<String>()
    );
    println!();

    if let Err(e) = config.validate_llm() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::new(config.llm).context("Failed to create LLM client")?;

    println!("Sending test request...");
    match client.test_connection().await {
        Ok(()) => {
            println!("Connection successful!");
        }
        Err(e) => {
            println!("Connection failed: {}", e);
        }
    }

    Ok(())
}
