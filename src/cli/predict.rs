//! `tourism predict`: score records with a trained bundle

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use polars::prelude::*;

use crate::pipeline::{load_dataset, FeatureRecord, LocalArtifactStore, TrainedBundle};
use crate::utils::{create_spinner, finish_with_success, print_info, print_success};

/// Load a bundle from a local path
pub fn load_bundle(model_path: &Path) -> Result<TrainedBundle> {
    let parent = model_path.parent().unwrap_or_else(|| Path::new("."));
    TrainedBundle::load(&LocalArtifactStore::new(parent), model_path)
        .with_context(|| format!("Failed to load trained bundle from {}", model_path.display()))
}

/// Predict a single record and print the value
pub fn run_predict_record(model_path: &Path, record: &FeatureRecord, quiet: bool) -> Result<f64> {
    let bundle = load_bundle(model_path)?;
    let prediction = bundle
        .predict_record(record)
        .context("Failed to predict record")?;

    if quiet {
        println!("{}", prediction);
    } else {
        print_info(&format!(
            "{} (R² {:.4}, trained {})",
            bundle.model_name,
            bundle.score,
            bundle.trained_at.format("%Y-%m-%d %H:%M UTC")
        ));
        println!(
            "    {} Prediction: {}",
            style("✧").cyan(),
            style(format!("{:.4}", prediction)).yellow().bold()
        );
    }
    Ok(prediction)
}

/// Predict every row of `input` and write it with a `prediction` column
pub fn run_predict_file(model_path: &Path, input: &Path, output: &Path, quiet: bool) -> Result<()> {
    let bundle = load_bundle(model_path)?;

    let spinner = (!quiet).then(|| create_spinner("Scoring records..."));
    let mut df = load_dataset(input)?
        .collect()
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let predictions = bundle
        .predict(&df)
        .with_context(|| format!("Failed to predict records from {}", input.display()))?;

    df.with_column(Column::new("prediction".into(), predictions.to_vec()))
        .context("Failed to append predictions")?;
    save_predictions(&mut df, output)?;

    if let Some(pb) = &spinner {
        finish_with_success(pb, &format!("Scored {} records", df.height()));
        print_success(&format!("Predictions written to {}", output.display()));
    }
    Ok(())
}

/// Save predictions (CSV or Parquet based on extension)
fn save_predictions(df: &mut DataFrame, path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "csv" => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            CsvWriter::new(&mut file)
                .finish(df)
                .with_context(|| format!("Failed to write CSV file: {}", path.display()))?;
        }
        "parquet" => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            ParquetWriter::new(file)
                .finish(df)
                .with_context(|| format!("Failed to write Parquet file: {}", path.display()))?;
        }
        _ => anyhow::bail!(
            "Unsupported output format: {}. Supported formats: csv, parquet",
            extension
        ),
    }
    Ok(())
}
