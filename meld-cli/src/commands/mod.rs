//! Subcommands.

pub mod config;
pub mod decode;
pub mod train;

pub use config::ConfigArgs;
pub use decode::DecodeArgs;
pub use train::TrainArgs;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use meld::Document;

/// A document file holds one document or an array of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentFile {
    Many(Vec<Document>),
    One(Box<Document>),
}

/// Read every document from `paths`, in order.
pub fn load_documents(paths: &[PathBuf]) -> Result<Vec<Document>, String> {
    let mut documents = Vec::new();
    for path in paths {
        documents.extend(load_file(path)?);
    }
    Ok(documents)
}

fn load_file(path: &Path) -> Result<Vec<Document>, String> {
    let file = File::open(path).map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
    let parsed: DocumentFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
    let documents = match parsed {
        DocumentFile::Many(docs) => docs,
        DocumentFile::One(doc) => vec![*doc],
    };
    log::info!("loaded {} documents from {}", documents.len(), path.display());
    Ok(documents)
}
