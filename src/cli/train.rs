//! `tourism train`: run the whole pipeline with terminal progress

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::ProgressBar;

use crate::error::PipelineError;
use crate::pipeline::{
    CandidateResult, ConfigProvider, FileDatasetSource, JsonConfigProvider, LocalArtifactStore,
    PipelineObserver, PipelineOutcome, Stage, TrainPipeline, ValidationReport,
};
use crate::report::{display_validation, export_run_report, RunReport, TrainingSummary};
use crate::utils::{
    create_spinner, finish_with_error, finish_with_success, hidden_spinner, print_banner,
    print_completion, print_config, print_failure, print_info, print_step_header,
    print_step_time, print_success, print_warning,
};

/// Renders stage progress and collects the tuned candidates
pub struct TerminalObserver {
    quiet: bool,
    spinner: Option<ProgressBar>,
    pub summary: TrainingSummary,
    pub timings: Vec<(Stage, Duration)>,
}

impl TerminalObserver {
    pub fn new(baseline: f64, quiet: bool) -> Self {
        Self {
            quiet,
            spinner: None,
            summary: TrainingSummary::new(baseline),
            timings: Vec::new(),
        }
    }
}

impl PipelineObserver for TerminalObserver {
    fn stage_started(&mut self, stage: Stage) {
        if self.quiet {
            self.spinner = Some(hidden_spinner());
            return;
        }
        print_step_header(stage.number(), &stage.to_string());
        self.spinner = Some(create_spinner(&format!("{}...", stage)));
    }

    fn stage_finished(&mut self, stage: Stage, elapsed: Duration) {
        self.timings.push((stage, elapsed));
        if let Some(pb) = self.spinner.take() {
            finish_with_success(&pb, &format!("{} finished", stage));
        }
        if !self.quiet {
            print_step_time(elapsed);
        }
    }

    fn stage_failed(&mut self, stage: Stage, _error: &PipelineError) {
        if let Some(pb) = self.spinner.take() {
            finish_with_error(&pb, &format!("{} stopped", stage));
        }
    }

    fn validated(&mut self, report: &ValidationReport) {
        if !self.quiet {
            display_validation(report);
        }
    }

    fn candidate_scored(&mut self, candidate: &CandidateResult) {
        if let Some(pb) = &self.spinner {
            pb.set_message(format!(
                "{} scored R² {:.4} on the test split",
                candidate.model_name, candidate.score
            ));
        }
        self.summary.add_candidate(candidate);
    }
}

/// Run the pipeline; only a failed run is an error
pub fn run_train(
    config_path: &Path,
    data_root: &Path,
    remote_root: &Path,
    report_path: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let provider = JsonConfigProvider::new(config_path);
    let config = provider
        .load()
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    if !quiet {
        print_banner(env!("CARGO_PKG_VERSION"));
        print_config(
            config_path,
            &config.data_source.source_id,
            &config.schema.target_column,
            config.train_model.len(),
            config.base_model_score,
        );
    }

    let source = FileDatasetSource::new(data_root);
    let store = LocalArtifactStore::new(remote_root);
    let baseline = config.base_model_score;
    let pipeline = TrainPipeline::new(config, &source, &store, &provider);

    let mut observer = TerminalObserver::new(baseline, quiet);
    let outcome = pipeline.run_observed(&mut observer);

    if !quiet && !observer.summary.candidates.is_empty() {
        observer.summary.display();
    }

    if let Some(path) = report_path {
        let report = RunReport::new(
            config_path,
            baseline,
            &outcome,
            observer.summary.candidates.clone(),
            &observer.timings,
        );
        export_run_report(&report, path)?;
        if !quiet {
            print_info(&format!("Run report written to {}", path.display()));
        }
    }

    match outcome {
        PipelineOutcome::Promoted(report) => {
            if !quiet {
                print_success(&format!(
                    "Promoted {} (R² {:.4}, previous baseline {:.4})",
                    report.model_name, report.score, report.previous_baseline
                ));
                print_info(&format!("Bundle saved to {}", report.bundle_path.display()));
                print_info(&format!(
                    "Artifacts uploaded to '{}', configuration now at version {}",
                    report.uploaded_to, report.config_version
                ));
                print_completion("Training pipeline complete!");
            }
            Ok(())
        }
        PipelineOutcome::Aborted(reason) => {
            if !quiet {
                print_warning("Validation failed; no model was trained");
                for line in reason.reasons() {
                    print_info(&line);
                }
            }
            Ok(())
        }
        PipelineOutcome::Failed { error, .. } => {
            if !quiet {
                print_failure(&error.to_string());
            }
            Err(anyhow::Error::new(error))
        }
    }
}
