//! `tourism validate`: ingestion and validation without training

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::pipeline::{
    ConfigProvider, FileDatasetSource, JsonConfigProvider, LocalArtifactStore, Stage, TrainPipeline,
};
use crate::report::display_validation;
use crate::utils::{
    create_spinner, finish_with_success, finish_with_warning, print_banner, print_info,
    print_step_header, print_step_time, print_success, print_warning,
};

/// Validate the configured dataset; a failed validation exits non-zero
pub fn run_validate(config_path: &Path, data_root: &Path, quiet: bool) -> Result<()> {
    let provider = JsonConfigProvider::new(config_path);
    let config = provider
        .load()
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    if !quiet {
        print_banner(env!("CARGO_PKG_VERSION"));
        print_step_header(Stage::Validation.number(), &Stage::Validation.to_string());
    }

    let source = FileDatasetSource::new(data_root);
    let store = LocalArtifactStore::new(data_root);
    let pipeline = TrainPipeline::new(config, &source, &store, &provider);

    let step_start = Instant::now();
    let spinner = (!quiet).then(|| create_spinner("Ingesting and validating splits..."));
    let report = pipeline.validate_only()?;

    if let Some(pb) = &spinner {
        if report.proceed() {
            finish_with_success(pb, "Validation finished");
        } else {
            finish_with_warning(pb, "Validation finished with failures");
        }
    }
    if !quiet {
        print_step_time(step_start.elapsed());
        display_validation(&report);
    }

    if report.proceed() {
        if !quiet {
            print_success("Dataset is ready for training");
        }
        Ok(())
    } else {
        let reasons = report.failures();
        if !quiet {
            print_warning("Dataset failed validation");
            for line in &reasons {
                print_info(line);
            }
        }
        anyhow::bail!("validation failed: {}", reasons.join("; "))
    }
}
