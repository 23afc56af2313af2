//! Training pipeline orchestration
//!
//! `ingest → validate → transform → train → promote`, strictly in sequence.
//! A failed validation ends the run with [`PipelineOutcome::Aborted`]; any
//! error ends it with [`PipelineOutcome::Failed`] naming the stage.

use std::fmt;
use std::time::{Duration, Instant};

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::pipeline::config::{ConfigProvider, Configuration};
use crate::pipeline::estimators::ModelRegistry;
use crate::pipeline::loader::{ingest, DatasetSource};
use crate::pipeline::selector::{select_best, ModelPromoter, PromotionReport};
use crate::pipeline::store::ArtifactStore;
use crate::pipeline::transform::{FeatureTransformer, TransformedData};
use crate::pipeline::tuner::{CandidateResult, ModelTuner};
use crate::pipeline::validation::{SchemaValidator, ValidationReport};

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Ingestion,
    Validation,
    Transformation,
    Training,
    Promotion,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Ingestion,
        Stage::Validation,
        Stage::Transformation,
        Stage::Training,
        Stage::Promotion,
    ];

    pub fn number(&self) -> usize {
        *self as usize + 1
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Ingestion => "Data Ingestion",
            Stage::Validation => "Data Validation",
            Stage::Transformation => "Data Transformation",
            Stage::Training => "Model Training",
            Stage::Promotion => "Model Promotion",
        };
        f.write_str(name)
    }
}

/// Error raised inside a stage
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
}

/// Last state a run reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Started,
    Ingested,
    Validated(bool),
    Transformed,
    Trained,
    Promoted,
}

/// Why a run stopped without error
#[derive(Debug, Clone)]
pub struct AbortReason {
    pub report: ValidationReport,
}

impl AbortReason {
    pub fn reasons(&self) -> Vec<String> {
        self.report.failures()
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed: {}", self.reasons().join("; "))
    }
}

/// Tagged result of a pipeline run
#[derive(Debug)]
pub enum PipelineOutcome {
    Promoted(PromotionReport),
    Aborted(AbortReason),
    Failed {
        error: StageError,
        /// State reached before the failing stage started
        state: PipelineState,
    },
}

impl PipelineOutcome {
    pub fn state(&self) -> PipelineState {
        match self {
            PipelineOutcome::Promoted(_) => PipelineState::Promoted,
            PipelineOutcome::Aborted(_) => PipelineState::Validated(false),
            PipelineOutcome::Failed { state, .. } => *state,
        }
    }

    pub fn is_promoted(&self) -> bool {
        matches!(self, PipelineOutcome::Promoted(_))
    }
}

/// Progress hooks for callers that render a run; every method defaults to a no-op
pub trait PipelineObserver {
    fn stage_started(&mut self, _stage: Stage) {}

    fn stage_finished(&mut self, _stage: Stage, _elapsed: Duration) {}

    fn stage_failed(&mut self, _stage: Stage, _error: &PipelineError) {}

    fn validated(&mut self, _report: &ValidationReport) {}

    fn candidate_scored(&mut self, _candidate: &CandidateResult) {}
}

/// Observer that ignores every event
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// One training run over a configuration and its collaborators
pub struct TrainPipeline<'a> {
    config: Configuration,
    source: &'a dyn DatasetSource,
    store: &'a dyn ArtifactStore,
    provider: &'a dyn ConfigProvider,
    registry: ModelRegistry,
}

impl<'a> TrainPipeline<'a> {
    pub fn new(
        config: Configuration,
        source: &'a dyn DatasetSource,
        store: &'a dyn ArtifactStore,
        provider: &'a dyn ConfigProvider,
    ) -> Self {
        Self {
            config,
            source,
            store,
            provider,
            registry: ModelRegistry::builtin(),
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn run(&self) -> PipelineOutcome {
        self.run_observed(&mut NoopObserver)
    }

    pub fn run_observed(&self, observer: &mut dyn PipelineObserver) -> PipelineOutcome {
        let mut state = PipelineState::Started;
        macro_rules! stage {
            ($stage:expr, $body:expr) => {
                match timed(observer, $stage, || $body) {
                    Ok(value) => value,
                    Err(error) => {
                        warn!(stage = %$stage, error = %error, "Pipeline stage failed");
                        return PipelineOutcome::Failed {
                            error: StageError {
                                stage: $stage,
                                error,
                            },
                            state,
                        };
                    }
                }
            };
        }

        let (train, test) = stage!(Stage::Ingestion, ingest(self.source, &self.config));
        state = PipelineState::Ingested;

        let report = stage!(Stage::Validation, self.validate_splits(&train, &test));
        observer.validated(&report);
        if !report.proceed() {
            let reason = AbortReason { report };
            warn!(reason = %reason, "Pipeline stopped after validation");
            return PipelineOutcome::Aborted(reason);
        }
        state = PipelineState::Validated(true);

        let data: TransformedData = stage!(
            Stage::Transformation,
            FeatureTransformer::new(&self.config, self.store).run(&train, &test)
        );
        drop((train, test));
        state = PipelineState::Transformed;

        observer.stage_started(Stage::Training);
        let start = Instant::now();
        let tuner = ModelTuner::new(&self.registry, &self.config.model_utils);
        let tuned = tuner.tune_with(&self.config.train_model, &data.train, &data.test, |c| {
            observer.candidate_scored(c)
        });
        let best = tuned.and_then(|candidates| {
            select_best(&candidates).cloned().ok_or_else(|| {
                PipelineError::tuning("*", "no model produced a finite test score")
            })
        });
        let best = match best {
            Ok(best) => {
                observer.stage_finished(Stage::Training, start.elapsed());
                best
            }
            Err(error) => {
                observer.stage_failed(Stage::Training, &error);
                warn!(stage = %Stage::Training, error = %error, "Pipeline stage failed");
                return PipelineOutcome::Failed {
                    error: StageError {
                        stage: Stage::Training,
                        error,
                    },
                    state,
                };
            }
        };
        info!(model = %best.model_name, score = best.score, "Selected best model");
        state = PipelineState::Trained;

        let promoter = ModelPromoter::new(self.store, self.provider);
        let report = stage!(Stage::Promotion, promoter.promote(best, &self.config));
        PipelineOutcome::Promoted(report)
    }

    /// Ingest and validate without transforming or training
    pub fn validate_only(&self) -> Result<ValidationReport, StageError> {
        let (train, test) = ingest(self.source, &self.config).map_err(|error| StageError {
            stage: Stage::Ingestion,
            error,
        })?;
        self.validate_splits(&train, &test).map_err(|error| StageError {
            stage: Stage::Validation,
            error,
        })
    }

    fn validate_splits(
        &self,
        train: &DataFrame,
        test: &DataFrame,
    ) -> crate::error::Result<ValidationReport> {
        SchemaValidator::new(&self.config.schema, &self.config.drift).validate(train, test)
    }
}

fn timed<T>(
    observer: &mut dyn PipelineObserver,
    stage: Stage,
    body: impl FnOnce() -> crate::error::Result<T>,
) -> crate::error::Result<T> {
    observer.stage_started(stage);
    info!(stage = %stage, "Stage started");
    let start = Instant::now();
    let result = body();
    let elapsed = start.elapsed();
    match &result {
        Ok(_) => {
            observer.stage_finished(stage, elapsed);
            info!(stage = %stage, elapsed_ms = elapsed.as_millis() as u64, "Stage finished");
        }
        Err(error) => observer.stage_failed(stage, error),
    }
    result
}
