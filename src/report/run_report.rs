//! JSON report of a training run
//!
//! Records the outcome, the last pipeline state reached, every tuned
//! candidate and the per-stage timings so that runs can be compared later.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::{PipelineOutcome, PipelineState, PromotionReport, Stage};
use crate::report::CandidateRow;

/// Outcome label written to the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Promoted,
    Aborted,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub tool_version: String,
    pub config_path: String,
    pub status: RunStatus,
    pub state: PipelineState,
    pub baseline: f64,
    pub candidates: Vec<CandidateRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PromotionReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
    pub timings: Vec<StageTiming>,
}

impl RunReport {
    pub fn new(
        config_path: &Path,
        baseline: f64,
        outcome: &PipelineOutcome,
        candidates: Vec<CandidateRow>,
        timings: &[(Stage, Duration)],
    ) -> Self {
        let (status, promotion, reasons) = match outcome {
            PipelineOutcome::Promoted(report) => (RunStatus::Promoted, Some(report.clone()), Vec::new()),
            PipelineOutcome::Aborted(reason) => (RunStatus::Aborted, None, reason.reasons()),
            PipelineOutcome::Failed { error, .. } => (RunStatus::Failed, None, vec![error.to_string()]),
        };

        Self {
            generated_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            config_path: config_path.display().to_string(),
            status,
            state: outcome.state(),
            baseline,
            candidates,
            promotion,
            reasons,
            timings: timings
                .iter()
                .map(|(stage, elapsed)| StageTiming {
                    stage: *stage,
                    seconds: elapsed.as_secs_f64(),
                })
                .collect(),
        }
    }
}

/// Write the report as pretty-printed JSON
pub fn export_run_report(report: &RunReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize run report to JSON")?;

    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write run report to {}", output_path.display()))?;

    Ok(())
}
