//! Config command - print or write the default run configuration

use clap::Parser;
use std::path::PathBuf;

use meld::ExperimentConfig;

use crate::output::write_output;

/// Print or write the default configuration
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Feature names to fill in (comma-separated)
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    pub features: Vec<String>,

    /// Write to this file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

pub fn run(args: ConfigArgs) -> Result<(), String> {
    let config = ExperimentConfig::default().with_features(args.features);
    let text = config.to_toml_string().map_err(|e| e.to_string())?;
    write_output(&text, args.output.as_deref())?;
    if let Some(path) = &args.output {
        log::info!("wrote default configuration to {}", path.display());
    }
    Ok(())
}
