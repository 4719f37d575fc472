//! Train command - perceptron training over gold-annotated documents

use clap::Parser;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use meld::{AverageLinkage, Experiment, ExperimentConfig, JsonlSink, NullSink, RunReport};

use super::load_documents;
use crate::output::{color, status, write_output};

/// Train a merge-scoring model
#[derive(Parser, Debug)]
pub struct TrainArgs {
    /// Run configuration (TOML)
    #[arg(short, long, value_name = "PATH")]
    pub config: PathBuf,

    /// Training documents (JSON)
    #[arg(long = "train", value_name = "PATH", required = true, num_args = 1..)]
    pub train: Vec<PathBuf>,

    /// Test documents (JSON), decoded after every iteration
    #[arg(long = "test", value_name = "PATH", num_args = 1..)]
    pub test: Vec<PathBuf>,

    /// Override the configured iteration count
    #[arg(long, value_name = "N")]
    pub iterations: Option<usize>,

    /// Write the averaged model here instead of stdout
    #[arg(long, value_name = "PATH")]
    pub model_out: Option<PathBuf>,

    /// Write the full per-iteration report (JSON)
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Write greedy-decoding records (JSON lines)
    #[arg(long, value_name = "PATH")]
    pub records: Option<PathBuf>,
}

pub fn run(args: TrainArgs, quiet: bool) -> Result<(), String> {
    let mut config = ExperimentConfig::from_file(&args.config)
        .map_err(|e| format!("Failed to load {}: {}", args.config.display(), e))?;
    if let Some(n) = args.iterations {
        config.iterations = n;
    }
    let experiment = Experiment::new(config).map_err(|e| e.to_string())?;

    let train = load_documents(&args.train)?;
    let test = load_documents(&args.test)?;
    if train.is_empty() {
        return Err("no training documents".to_string());
    }

    let report = match &args.records {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| format!("Failed to create {}: {}", path.display(), e))?;
            let mut sink = JsonlSink::new(BufWriter::new(file));
            let report = experiment
                .run(&train, &test, &AverageLinkage, &mut sink)
                .map_err(|e| e.to_string())?;
            let written = sink.written();
            sink.finish()
                .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
            log::info!("wrote {} records to {}", written, path.display());
            report
        }
        None => experiment
            .run(&train, &test, &AverageLinkage, &mut NullSink)
            .map_err(|e| e.to_string())?,
    };

    print_summary(&report, quiet);

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
        write_output(&json, Some(path))?;
    }
    match &args.model_out {
        Some(path) => {
            report
                .model
                .save(path)
                .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
            status(&format!("model written to {}", path.display()), quiet);
        }
        None => {
            let json = serde_json::to_string_pretty(&report.model).map_err(|e| e.to_string())?;
            write_output(&format!("{}\n", json), None)?;
        }
    }
    Ok(())
}

fn print_summary(report: &RunReport, quiet: bool) {
    status(
        &color("1", "iter      lr  violations     total     drift  failed"),
        quiet,
    );
    for it in &report.iterations {
        let drift = it
            .drift
            .map_or_else(|| "-".to_string(), |d| format!("{:.4}", d));
        let failed = it.training_failures.len() + it.validation.failed.len() + it.testing.failed.len();
        status(
            &format!(
                "{:>4} {:>7.2} {:>11} {:>9} {:>9} {:>7}",
                it.iteration, it.learning_rate, it.violations, it.total_violations, drift, failed
            ),
            quiet,
        );
    }
}
