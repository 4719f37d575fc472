//! meld - learned cluster merging CLI
//!
//! Trains a merge-scoring weight on gold-annotated documents and decodes new
//! documents with it.
//!
//! # Usage
//!
//! ```bash
//! # Write a starting configuration
//! meld config --features head_match,overlap -o run.toml
//!
//! # Train, keeping the averaged model and a per-iteration report
//! meld train -c run.toml --train train.json --test dev.json --model-out model.json --report report.json
//!
//! # Decode with the greedy strategy, labelling every candidate merge
//! meld decode -m model.json --search greedy --records records.jsonl test.json
//! ```

use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;

mod commands;
mod output;

use commands::{ConfigArgs, DecodeArgs, TrainArgs};

// ============================================================================
// CLI Structure
// ============================================================================

/// Learned cluster merging for coreference resolution
#[derive(Parser)]
#[command(name = "meld")]
#[command(
    author,
    version,
    about = "Learned cluster merging for coreference resolution",
    long_about = r#"
meld - train and apply a linear merge scorer over mention clusters

COMMANDS:
  train   - perceptron training with bounded search, averaged weights
  decode  - merge clusters of new documents with a trained model
  config  - print or write a default run configuration

DOCUMENTS:
  JSON files holding one document or an array of documents. Each document
  lists its mentions (id, text, pronominal, gold_cluster), its initial
  clusters, and per-mention-pair feature values.
"#
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model on gold-annotated documents
    #[command(visible_alias = "t")]
    Train(TrainArgs),

    /// Decode documents with a trained model
    #[command(visible_alias = "d")]
    Decode(DecodeArgs),

    /// Print or write the default configuration
    Config(ConfigArgs),
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Train(args) => commands::train::run(args, cli.quiet),
        Commands::Decode(args) => commands::decode::run(args),
        Commands::Config(args) => commands::config::run(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", output::color("31", "error:"), e);
            ExitCode::FAILURE
        }
    }
}

/// Install the stderr subscriber; library `log` records are bridged into it.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::ERROR
    } else {
        match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };
    // Fails only if a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
