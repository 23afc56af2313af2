//! Dataset loading and ingestion
//!
//! The dataset source hands back the raw labeled table; ingestion removes the
//! configured drop columns and splits the rows into train and test sets.

use std::path::{Path, PathBuf};

use anyhow::Context;
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::pipeline::config::Configuration;
use crate::pipeline::frame::column_names;

/// Fetches the raw labeled dataset
pub trait DatasetSource {
    fn fetch(&self, source_id: &str) -> Result<DataFrame>;
}

/// Dataset source reading CSV or Parquet files below a root directory
#[derive(Debug, Clone)]
pub struct FileDatasetSource {
    root: PathBuf,
}

impl FileDatasetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DatasetSource for FileDatasetSource {
    fn fetch(&self, source_id: &str) -> Result<DataFrame> {
        let path = self.root.join(source_id);
        if !path.exists() {
            return Err(PipelineError::data_source(
                source_id,
                format!("{} does not exist", path.display()),
            ));
        }
        load_dataset(&path)
            .and_then(|lf| lf.collect().context("Failed to collect dataset"))
            .map_err(|e| PipelineError::DataSource {
                source_id: source_id.to_string(),
                message: format!("{:#}", e),
                source: None,
            })
    }
}

/// Load a dataset from a file (CSV or Parquet based on extension)
pub fn load_dataset(path: &Path) -> anyhow::Result<LazyFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let lf = match extension.as_str() {
        "csv" => LazyCsvReader::new(path)
            .finish()
            .with_context(|| format!("Failed to load CSV file: {}", path.display()))?,
        "parquet" => LazyFrame::scan_parquet(path, Default::default())
            .with_context(|| format!("Failed to load Parquet file: {}", path.display()))?,
        _ => anyhow::bail!(
            "Unsupported file format: {}. Supported formats: csv, parquet",
            extension
        ),
    };

    Ok(lf)
}

/// Shuffle rows with a seeded generator and split off `test_size` of them
pub fn split_train_test(
    df: &DataFrame,
    test_size: f64,
    random_state: u64,
) -> Result<(DataFrame, DataFrame)> {
    let n = df.height();
    let n_test = (n as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(PipelineError::configuration(format!(
            "dataset of {} rows is too small to split with test_size {}: both splits need at least one row",
            n, test_size
        )));
    }

    let mut indices: Vec<IdxSize> = (0..n as IdxSize).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(random_state);
    indices.shuffle(&mut rng);

    let test_idx = IdxCa::from_vec("idx".into(), indices[..n_test].to_vec());
    let train_idx = IdxCa::from_vec("idx".into(), indices[n_test..].to_vec());

    Ok((df.take(&train_idx)?, df.take(&test_idx)?))
}

/// Fetch the dataset, remove the drop columns and split it
pub fn ingest(source: &dyn DatasetSource, config: &Configuration) -> Result<(DataFrame, DataFrame)> {
    let source_id = &config.data_source.source_id;
    let df = source.fetch(source_id)?;

    let present = column_names(&df);
    let to_drop: Vec<&str> = config
        .schema
        .drop_columns
        .iter()
        .filter(|c| present.contains(c))
        .map(|c| c.as_str())
        .collect();
    let df = df.drop_many(to_drop.iter().copied());

    let (train, test) =
        split_train_test(&df, config.split.test_size, config.split.random_state)?;

    info!(
        source = %source_id,
        rows = df.height(),
        columns = df.width(),
        dropped = to_drop.len(),
        train_rows = train.height(),
        test_rows = test.height(),
        "Ingested dataset"
    );

    Ok((train, test))
}
