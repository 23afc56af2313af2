//! Best-model selection, the trained bundle and promotion
//!
//! Promotion runs in a fixed order: baseline gate, load the stored
//! preprocessor, save the bundle, upload the artifact directory and finally
//! persist the advanced baseline. Any failure before the last step leaves the
//! stored baseline untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ndarray::Array1;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::pipeline::config::{ConfigProvider, Configuration};
use crate::pipeline::estimators::{Estimator, ParamSet};
use crate::pipeline::store::{load_object, save_object, ArtifactStore};
use crate::pipeline::transform::Preprocessor;
use crate::pipeline::tuner::CandidateResult;

/// Highest-scoring candidate. The first evaluated wins ties and NaN never wins.
pub fn select_best(candidates: &[CandidateResult]) -> Option<&CandidateResult> {
    let mut best: Option<&CandidateResult> = None;
    for candidate in candidates {
        if candidate.score.is_nan() {
            continue;
        }
        if best.map_or(true, |b| candidate.score > b.score) {
            best = Some(candidate);
        }
    }
    best
}

/// Fitted preprocessor and model persisted together as the unit of promotion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedBundle {
    pub preprocessor: Preprocessor,
    pub model: Estimator,
    pub model_name: String,
    pub score: f64,
    pub best_params: ParamSet,
    pub trained_at: DateTime<Utc>,
}

impl TrainedBundle {
    pub fn new(preprocessor: Preprocessor, candidate: CandidateResult) -> Self {
        Self {
            preprocessor,
            model: candidate.model,
            model_name: candidate.model_name,
            score: candidate.score,
            best_params: candidate.best_params,
            trained_at: Utc::now(),
        }
    }

    pub fn load(store: &dyn ArtifactStore, path: &Path) -> Result<Self> {
        load_object(store, path)
    }

    /// Transform the raw feature columns of `df` and predict every row
    pub fn predict(&self, df: &DataFrame) -> Result<Array1<f64>> {
        let features = self.preprocessor.transform(df)?;
        self.model.predict(features.view())
    }

    /// Prediction for a single record of named feature values
    pub fn predict_record(&self, record: &FeatureRecord) -> Result<f64> {
        let df = record.to_frame()?;
        let prediction = self.predict(&df)?;
        prediction
            .get(0)
            .copied()
            .ok_or_else(|| PipelineError::transformation("record produced no prediction"))
    }
}

/// Named feature values of one record, as submitted by a caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRecord(pub BTreeMap<String, serde_json::Value>);

impl FeatureRecord {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| {
            PipelineError::transformation(format!("record is not a JSON object of feature values: {}", e))
        })
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// One-row frame with a column per feature.
    ///
    /// Integral numbers become Int64 columns so that numeric category codes
    /// render the same way they do in a loaded dataset.
    pub fn to_frame(&self) -> Result<DataFrame> {
        use serde_json::Value;

        let mut columns = Vec::with_capacity(self.0.len());
        for (name, value) in &self.0 {
            let name = PlSmallStr::from(name.as_str());
            let column = match value {
                Value::Null => Column::new(name, [None::<f64>]),
                Value::Bool(b) => Column::new(name, [*b]),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => Column::new(name, [i]),
                    None => Column::new(name, [n.as_f64().unwrap_or(f64::NAN)]),
                },
                Value::String(s) => Column::new(name, [s.as_str()]),
                other => {
                    return Err(PipelineError::transformation(format!(
                        "feature '{}' must be a scalar, got {}",
                        name, other
                    )))
                }
            };
            columns.push(column);
        }
        Ok(DataFrame::new(columns)?)
    }
}

/// What a successful promotion produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionReport {
    pub model_name: String,
    pub score: f64,
    pub previous_baseline: f64,
    pub bundle_path: PathBuf,
    pub uploaded_to: String,
    pub config_version: u64,
}

/// Persists the winning bundle, uploads the artifacts and advances the baseline
pub struct ModelPromoter<'a> {
    store: &'a dyn ArtifactStore,
    provider: &'a dyn ConfigProvider,
}

impl<'a> ModelPromoter<'a> {
    pub fn new(store: &'a dyn ArtifactStore, provider: &'a dyn ConfigProvider) -> Self {
        Self { store, provider }
    }

    /// Fails with [`PipelineError::NoQualifyingModel`] when `best` is below the baseline
    pub fn promote(&self, best: CandidateResult, config: &Configuration) -> Result<PromotionReport> {
        let baseline = config.base_model_score;
        if !(best.score >= baseline) {
            warn!(
                model = %best.model_name,
                score = best.score,
                baseline,
                "No model reached the baseline score"
            );
            return Err(PipelineError::NoQualifyingModel {
                best: best.score,
                baseline,
            });
        }

        let preprocessor: Preprocessor = load_object(self.store, &config.preprocessor_path())?;
        let bundle = TrainedBundle::new(preprocessor, best);
        let bundle_path = config.model_path();
        save_object(self.store, &bundle_path, &bundle)?;
        info!(model = %bundle.model_name, path = %bundle_path.display(), "Saved trained bundle");

        self.store
            .upload_directory(&config.artifacts_dir, &config.storage.bucket)?;

        let advanced = config.with_baseline(bundle.score);
        self.provider.persist(&advanced)?;
        info!(
            previous = baseline,
            baseline = advanced.base_model_score,
            version = advanced.version,
            "Advanced baseline score"
        );

        Ok(PromotionReport {
            model_name: bundle.model_name,
            score: bundle.score,
            previous_baseline: baseline,
            bundle_path,
            uploaded_to: config.storage.bucket.clone(),
            config_version: advanced.version,
        })
    }
}
