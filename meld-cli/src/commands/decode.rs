//! Decode command - merge clusters with a trained model

use clap::Parser;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use meld::{
    decode_documents, AverageLinkage, ExperimentConfig, JsonlSink, Model, NullSink, SearchKind,
};

use super::load_documents;
use crate::output::write_output;

/// Decode documents with a trained model
#[derive(Parser, Debug)]
pub struct DecodeArgs {
    /// Model file written by `meld train`
    #[arg(short, long, value_name = "PATH")]
    pub model: PathBuf,

    /// Search strategy: bounded (alias: beam) or greedy
    #[arg(long, value_name = "KIND", default_value = "bounded")]
    pub search: SearchKind,

    /// Greedy stop threshold
    #[arg(long, value_name = "FLOAT")]
    pub threshold: Option<f64>,

    /// Bounded search round budget
    #[arg(long, value_name = "N")]
    pub step: Option<usize>,

    /// Bounded search beam width
    #[arg(long, value_name = "N")]
    pub beam_width: Option<usize>,

    /// Write greedy-decoding records (JSON lines)
    #[arg(long, value_name = "PATH")]
    pub records: Option<PathBuf>,

    /// Write decoded partitions here instead of stdout
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Documents to decode (JSON)
    #[arg(value_name = "FILE", required = true)]
    pub documents: Vec<PathBuf>,
}

pub fn run(args: DecodeArgs) -> Result<(), String> {
    let model = Model::load(&args.model)
        .map_err(|e| format!("Failed to load model {}: {}", args.model.display(), e))?;

    let mut config = ExperimentConfig::default().with_features(model.feature_names.names().to_vec());
    config.decoder = args.search;
    if let Some(threshold) = args.threshold {
        config.decode_threshold = threshold;
    }
    if let Some(step) = args.step {
        config.search_step = step;
    }
    if let Some(width) = args.beam_width {
        config.beam_width = width;
    }
    config.validate().map_err(|e| e.to_string())?;
    let search = config.decoding_search().map_err(|e| e.to_string())?;

    let documents = load_documents(&args.documents)?;
    let report = match &args.records {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| format!("Failed to create {}: {}", path.display(), e))?;
            let mut sink = JsonlSink::new(BufWriter::new(file));
            let report = decode_documents(&search, &documents, &AverageLinkage, &model.weight, &mut sink)
                .map_err(|e| e.to_string())?;
            sink.finish()
                .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
            report
        }
        None => decode_documents(&search, &documents, &AverageLinkage, &model.weight, &mut NullSink)
            .map_err(|e| e.to_string())?,
    };

    for id in &report.failed {
        log::warn!("document '{}' could not be decoded", id);
    }
    let json = serde_json::to_string_pretty(&report.decoded).map_err(|e| e.to_string())?;
    write_output(&format!("{}\n", json), args.output.as_deref())?;

    if report.decoded.is_empty() && !report.failed.is_empty() {
        return Err(format!("all {} documents failed to decode", report.failed.len()));
    }
    Ok(())
}
