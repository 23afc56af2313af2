//! Command-line argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::pipeline::FeatureRecord;

/// Tourism - Train, select and promote tourism-package purchase models
#[derive(Parser, Debug)]
#[command(name = "tourism")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Skip the banner and step output (logs are still written to stderr)
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline: ingest, validate, transform, tune and promote
    Train {
        /// Pipeline configuration (JSON). Promotion writes the advanced baseline back to it.
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,

        /// Directory the dataset source id is resolved against
        #[arg(long, default_value = "data")]
        data_root: PathBuf,

        /// Directory standing in for remote object storage
        #[arg(long, default_value = "remote")]
        remote_root: PathBuf,

        /// Write a JSON report of the run to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Ingest the dataset and run schema and drift validation only
    Validate {
        /// Pipeline configuration (JSON)
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,

        /// Directory the dataset source id is resolved against
        #[arg(long, default_value = "data")]
        data_root: PathBuf,
    },

    /// Predict with a trained bundle
    Predict {
        /// Trained bundle written by a promotion
        #[arg(short, long)]
        model: PathBuf,

        /// One record as a JSON object of feature values
        #[arg(long, value_parser = parse_record, conflicts_with = "input", required_unless_present = "input")]
        record: Option<FeatureRecord>,

        /// CSV or Parquet file of records
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output file for the input records with a prediction column.
        /// Defaults to the input directory with a '_predictions.csv' suffix.
        #[arg(short, long, requires = "input", conflicts_with = "record")]
        output: Option<PathBuf>,
    },
}

impl Commands {
    /// Prediction output path, derived from the input file when not given
    pub fn prediction_output_path(&self) -> Option<PathBuf> {
        let Commands::Predict { input, output, .. } = self else {
            return None;
        };
        if let Some(output) = output {
            return Some(output.clone());
        }
        let input = input.as_ref()?;
        let parent = input.parent().unwrap_or_else(|| std::path::Path::new("."));
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("records");
        Some(parent.join(format!("{}_predictions.csv", stem)))
    }
}

/// Parser for the --record argument
fn parse_record(s: &str) -> Result<FeatureRecord, String> {
    FeatureRecord::from_json(s).map_err(|e| e.to_string())
}
