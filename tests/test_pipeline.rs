//! End-to-end tests for the training pipeline

use std::time::Duration;

use tourism::error::PipelineError;
use tourism::pipeline::*;

mod common;

use common::*;

fn run(ws: &Workspace, observer: &mut dyn PipelineObserver) -> PipelineOutcome {
    let provider = JsonConfigProvider::new(ws.config_path());
    let config = provider.load().unwrap();
    let source = FileDatasetSource::new(ws.data_root());
    let store = LocalArtifactStore::new(ws.remote_root());
    TrainPipeline::new(config, &source, &store, &provider).run_observed(observer)
}

#[derive(Default)]
struct Recorder {
    events: Vec<String>,
    scored: Vec<String>,
}

impl PipelineObserver for Recorder {
    fn stage_started(&mut self, stage: Stage) {
        self.events.push(format!("start {:?}", stage));
    }

    fn stage_finished(&mut self, stage: Stage, _elapsed: Duration) {
        self.events.push(format!("finish {:?}", stage));
    }

    fn stage_failed(&mut self, stage: Stage, _error: &PipelineError) {
        self.events.push(format!("fail {:?}", stage));
    }

    fn candidate_scored(&mut self, candidate: &CandidateResult) {
        self.scored.push(candidate.model_name.clone());
    }
}

#[test]
fn test_clean_dataset_reaches_promoted() {
    let ws = Workspace::new();
    ws.write_dataset("Gender");
    ws.write_config(&tourism_config(&ws.artifacts_dir(), 0.5));

    let mut recorder = Recorder::default();
    let outcome = run(&ws, &mut recorder);

    assert_eq!(outcome.state(), PipelineState::Promoted);
    let report = match outcome {
        PipelineOutcome::Promoted(report) => report,
        other => panic!("expected promotion, got {:?}", other),
    };
    assert_eq!(report.model_name, "DecisionTreeRegressor");
    assert!(report.score > 0.99);
    assert_eq!(report.previous_baseline, 0.5);

    assert!(ws.preprocessor_path().exists());
    assert!(ws.model_path().exists());
    assert!(ws.archive_path().exists());

    let stored = ws.stored_config();
    assert_eq!(stored["version"], 2);
    assert!((stored["base_model_score"].as_f64().unwrap() - report.score).abs() < 1e-12);

    assert_eq!(
        recorder.scored,
        vec!["LinearRegression", "Ridge", "DecisionTreeRegressor"]
    );
    let expected: Vec<String> = Stage::ALL
        .iter()
        .flat_map(|s| [format!("start {:?}", s), format!("finish {:?}", s)])
        .collect();
    assert_eq!(recorder.events, expected);
}

#[test]
fn test_renamed_column_aborts_without_error() {
    let ws = Workspace::new();
    ws.write_dataset("Sex");
    ws.write_config(&tourism_config(&ws.artifacts_dir(), 0.5));

    let outcome = run(&ws, &mut NoopObserver);

    assert_eq!(outcome.state(), PipelineState::Validated(false));
    let reason = match outcome {
        PipelineOutcome::Aborted(reason) => reason,
        other => panic!("expected abort, got {:?}", other),
    };
    assert!(reason.report.train.is_some());
    assert!(reason
        .reasons()
        .iter()
        .any(|r| r.contains("missing categorical columns: Gender")));

    assert!(!ws.preprocessor_path().exists());
    assert!(!ws.model_path().exists());
    assert_eq!(ws.stored_config()["version"], 1);
}

#[test]
fn test_unreachable_baseline_fails_at_promotion() {
    let ws = Workspace::new();
    ws.write_dataset("Gender");
    ws.write_config(&tourism_config(&ws.artifacts_dir(), 1.5));

    let mut recorder = Recorder::default();
    let outcome = run(&ws, &mut recorder);

    let (error, state) = match outcome {
        PipelineOutcome::Failed { error, state } => (error, state),
        other => panic!("expected failure, got {:?}", other),
    };
    assert_eq!(error.stage, Stage::Promotion);
    assert_eq!(state, PipelineState::Trained);
    assert!(matches!(
        error.error,
        PipelineError::NoQualifyingModel { baseline, .. } if baseline == 1.5
    ));
    assert_eq!(recorder.events.last().unwrap(), "fail Promotion");

    assert!(!ws.model_path().exists());
    assert!(!ws.archive_path().exists());
    assert_eq!(ws.stored_config()["base_model_score"], 1.5);
}

#[test]
fn test_unknown_model_fails_at_training() {
    let ws = Workspace::new();
    ws.write_dataset("Gender");
    let mut config = tourism_config(&ws.artifacts_dir(), 0.5);
    config["train_model"]
        .as_array_mut()
        .unwrap()
        .push(serde_json::json!({ "name": "CatBoostRegressor" }));
    ws.write_config(&config);

    let mut recorder = Recorder::default();
    let outcome = run(&ws, &mut recorder);

    let (error, state) = match outcome {
        PipelineOutcome::Failed { error, state } => (error, state),
        other => panic!("expected failure, got {:?}", other),
    };
    assert_eq!(error.stage, Stage::Training);
    assert_eq!(state, PipelineState::Transformed);
    assert!(matches!(error.error, PipelineError::UnsupportedModel(ref name) if name == "CatBoostRegressor"));
    assert!(recorder.scored.is_empty(), "no model is tuned before every tag resolves");
}

#[test]
fn test_missing_dataset_fails_at_ingestion() {
    let ws = Workspace::new();
    ws.write_config(&tourism_config(&ws.artifacts_dir(), 0.5));

    let outcome = run(&ws, &mut NoopObserver);

    let (error, state) = match outcome {
        PipelineOutcome::Failed { error, state } => (error, state),
        other => panic!("expected failure, got {:?}", other),
    };
    assert_eq!(error.stage, Stage::Ingestion);
    assert_eq!(state, PipelineState::Started);
    assert!(matches!(error.error, PipelineError::DataSource { .. }));
    assert!(error.to_string().starts_with("Data Ingestion failed"));
}

#[test]
fn test_validate_only_reports_without_training() {
    let ws = Workspace::new();
    ws.write_dataset("Gender");
    ws.write_config(&tourism_config(&ws.artifacts_dir(), 0.5));

    let provider = JsonConfigProvider::new(ws.config_path());
    let config = provider.load().unwrap();
    let source = FileDatasetSource::new(ws.data_root());
    let store = LocalArtifactStore::new(ws.remote_root());
    let pipeline = TrainPipeline::new(config, &source, &store, &provider);

    let report = pipeline.validate_only().unwrap();
    assert!(report.proceed());
    assert!(!ws.artifacts_dir().exists());
}

#[test]
fn test_second_run_needs_to_beat_promoted_score() {
    let ws = Workspace::new();
    ws.write_dataset("Gender");
    ws.write_config(&tourism_config(&ws.artifacts_dir(), 0.5));

    assert!(run(&ws, &mut NoopObserver).is_promoted());
    let first = std::fs::metadata(ws.model_path()).unwrap().modified().unwrap();

    // Same data, same seed: the best score only ties the new baseline, which still qualifies
    let second = run(&ws, &mut NoopObserver);
    assert!(second.is_promoted(), "got {:?}", second);
    assert_eq!(ws.stored_config()["version"], 3);
    assert!(std::fs::metadata(ws.model_path()).unwrap().modified().unwrap() >= first);
}
