//! Evaluation CLI for the RAG server.
//!
//! Usage:
//!   eval keywords            # Retrieval + keyword scoring
//!   eval judge               # Retrieval + keyword + LLM judge scoring
//!
//! Options:
//!   --base-url <URL>         # Query Service to evaluate (default: http://localhost:8000)
//!   --dataset <path>         # Golden dataset CSV
//!   --output <path>          # Report CSV (summary JSON is written next to it)
//!   --judge-model <name>     # Model used by the judge
//!   --delay-ms <N>           # Minimum spacing between judge calls
//!   --max-items <N>          # Limit number of questions

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rag_evaluator::config::Config;
use rag_evaluator::error::RagError;
use rag_evaluator::eval::{
    GoldenDataset, Orchestrator, Pacer, RagClient, SemanticJudge, print_summary, summary_path,
    write_report, write_summary,
};
use rag_evaluator::llm::LlmClient;
use rag_evaluator::logging::init_logging;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "eval")]
#[command(about = "Evaluate the RAG server against a golden dataset", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of the running RAG server
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Golden dataset (semicolon-delimited CSV)
    #[arg(short, long, global = true)]
    dataset: Option<PathBuf>,

    /// Report CSV path
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Model used by the semantic judge
    #[arg(long, global = true)]
    judge_model: Option<String>,

    /// Minimum delay between judge calls in milliseconds
    #[arg(long, global = true)]
    delay_ms: Option<u64>,

    /// Maximum number of questions to evaluate
    #[arg(long, global = true)]
    max_items: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score retrieval and keyword coverage (no LLM needed)
    Keywords,

    /// Score retrieval, keywords, and semantic equivalence via an LLM judge
    Judge,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load().context("Failed to load configuration")?;
    init_logging(&config.logging);

    if let Some(url) = cli.base_url {
        config.eval.base_url = url;
    }
    if let Some(path) = cli.dataset {
        config.eval.dataset_path = path;
    }
    if let Some(model) = cli.judge_model {
        config.eval.judge_model = model;
    }
    if let Some(delay) = cli.delay_ms {
        config.eval.delay_ms = delay;
    }

    let judge_mode = matches!(cli.command, Commands::Judge);
    let output = cli.output.unwrap_or_else(|| {
        if judge_mode {
            config.eval.judge_output_path.clone()
        } else {
            config.eval.keyword_output_path.clone()
        }
    });

    let mut dataset = GoldenDataset::load(&config.eval.dataset_path)
        .context("Failed to load golden dataset")?;
    if let Some(max) = cli.max_items {
        dataset = dataset.take(max);
    }

    println!(
        "Dataset: {} ({} questions)",
        config.eval.dataset_path.display(),
        dataset.len()
    );
    if dataset.skipped > 0 {
        println!("  Skipped {} rows without a question", dataset.skipped);
    }
    let client = Arc::new(RagClient::new(&config.eval).context("Failed to create RAG client")?);
    println!("RAG server: {}", client.base_url());

    let mut orchestrator = if judge_mode {
        config.validate_llm().context("Judge needs an LLM")?;
        let generator =
            LlmClient::new(config.judge_llm()).context("Failed to create judge client")?;
        let judge = SemanticJudge::new(Arc::new(generator));
        println!("Judge model: {}", judge.model());
        Orchestrator::full(client, judge, Pacer::from_millis(config.eval.delay_ms))
    } else {
        Orchestrator::keywords(client)
    };

    let run = match orchestrator.run(&dataset).await {
        Ok(run) => run,
        Err(e @ RagError::ServiceUnavailable(_)) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Evaluation failed"),
    };

    if run.records.is_empty() {
        eprintln!("Error: No results - the dataset contains no questions");
        std::process::exit(1);
    }

    write_report(&output, &dataset, &run).context("Failed to write report")?;
    write_summary(
        &summary_path(&output),
        &config.eval.dataset_path,
        &output,
        &dataset,
        &run,
    )
    .context("Failed to write summary")?;

    print_summary(&run, &output);

    Ok(())
}
