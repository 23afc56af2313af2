//! Per-model hyperparameter tuning and held-out scoring

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::pipeline::config::{ModelSpec, SearchConfig};
use crate::pipeline::estimators::{format_params, r2_score, Estimator, ModelRegistry, ParamSet};
use crate::pipeline::search::GridSearch;
use crate::pipeline::transform::split_features_target;

/// A tuned model and its score on the test split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    /// R² on the test split
    pub score: f64,
    pub model: Estimator,
    pub model_name: String,
    pub best_params: ParamSet,
    /// Mean cross-validated R² of the chosen parameters
    pub cv_score: f64,
}

/// Tunes every configured model type in order
pub struct ModelTuner<'a> {
    registry: &'a ModelRegistry,
    search: GridSearch,
}

impl<'a> ModelTuner<'a> {
    pub fn new(registry: &'a ModelRegistry, search: &SearchConfig) -> Self {
        Self {
            registry,
            search: GridSearch::new(search),
        }
    }

    /// One result per configured model, in configuration order
    pub fn tune_all(
        &self,
        specs: &[ModelSpec],
        train: &Array2<f64>,
        test: &Array2<f64>,
    ) -> Result<Vec<CandidateResult>> {
        self.tune_with(specs, train, test, |_| {})
    }

    /// Like [`tune_all`](Self::tune_all), reporting each result as soon as it is scored
    pub fn tune_with<F>(
        &self,
        specs: &[ModelSpec],
        train: &Array2<f64>,
        test: &Array2<f64>,
        mut on_scored: F,
    ) -> Result<Vec<CandidateResult>>
    where
        F: FnMut(&CandidateResult),
    {
        if train.ncols() != test.ncols() || train.ncols() < 2 {
            return Err(PipelineError::tuning(
                "*",
                format!(
                    "train has {} columns and test has {}; both need features plus a target",
                    train.ncols(),
                    test.ncols()
                ),
            ));
        }

        // Every tag is resolved before any search starts
        let bases = specs
            .iter()
            .map(|spec| self.registry.create(&spec.name))
            .collect::<Result<Vec<_>>>()?;

        let (x_train, y_train) = split_features_target(train);
        let (x_test, y_test) = split_features_target(test);

        let mut results = Vec::with_capacity(specs.len());
        for (spec, base) in specs.iter().zip(bases) {
            let search = self.search.fit(&base, &spec.params, x_train, y_train)?;
            let pred = search.model.predict(x_test)?;
            let score = r2_score(y_test, pred.view());

            info!(
                model = %spec.name,
                params = %format_params(&search.best_params),
                cv_score = search.best_score,
                score,
                "Tuned model"
            );

            let result = CandidateResult {
                score,
                model: search.model,
                model_name: spec.name.clone(),
                best_params: search.best_params,
                cv_score: search.best_score,
            };
            on_scored(&result);
            results.push(result);
        }
        Ok(results)
    }
}
