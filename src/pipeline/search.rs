//! Exhaustive hyperparameter search with K-fold cross-validation

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::pipeline::config::SearchConfig;
use crate::pipeline::estimators::{expand_grid, format_params, r2_score, Estimator, ParamGrid, ParamSet};

/// Cross-validated score of one grid point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub params: ParamSet,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

/// Outcome of a search: the best grid point refitted on all the data
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub best_params: ParamSet,
    pub best_score: f64,
    pub model: Estimator,
    pub candidates: Vec<CandidateScore>,
}

/// Grid search over every combination of a parameter grid
#[derive(Debug, Clone)]
pub struct GridSearch {
    cv: usize,
    n_jobs: i32,
}

impl GridSearch {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            cv: config.cv,
            n_jobs: config.n_jobs,
        }
    }

    /// Score every grid point, pick the highest mean R² (first wins ties) and refit it
    pub fn fit(
        &self,
        base: &Estimator,
        grid: &ParamGrid,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<SearchResult> {
        let model = base.name();
        if let Some((name, _)) = grid.iter().find(|(_, values)| values.is_empty()) {
            return Err(PipelineError::tuning(
                model,
                format!("hyperparameter '{}' has no candidate values", name),
            ));
        }
        if x.nrows() < self.cv {
            return Err(PipelineError::tuning(
                model,
                format!("{} rows cannot be split into {} folds", x.nrows(), self.cv),
            ));
        }

        let combos = expand_grid(grid);
        let folds = kfold_indices(x.nrows(), self.cv);
        let evaluate = |params: &ParamSet| self.evaluate(base, params, &folds, x, y);

        let candidates: Vec<CandidateScore> = match self.n_jobs {
            1 => combos.iter().map(evaluate).collect::<Result<_>>()?,
            n if n > 1 => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n as usize)
                    .build()
                    .map_err(|e| PipelineError::tuning(model, format!("failed to start workers: {}", e)))?;
                pool.install(|| combos.par_iter().map(evaluate).collect::<Result<_>>())?
            }
            _ => combos.par_iter().map(evaluate).collect::<Result<_>>()?,
        };

        let mut best: Option<usize> = None;
        for (i, candidate) in candidates.iter().enumerate() {
            if candidate.mean_score.is_nan() {
                continue;
            }
            if best.map_or(true, |b| candidate.mean_score > candidates[b].mean_score) {
                best = Some(i);
            }
        }
        let best = best.ok_or_else(|| {
            PipelineError::tuning(model, "no parameter combination produced a finite score")
        })?;
        let best_params = candidates[best].params.clone();
        let best_score = candidates[best].mean_score;

        let mut refit = base.with_params(&best_params)?;
        refit.fit(x, y)?;

        Ok(SearchResult {
            best_params,
            best_score,
            model: refit,
            candidates,
        })
    }

    fn evaluate(
        &self,
        base: &Estimator,
        params: &ParamSet,
        folds: &[(Vec<usize>, Vec<usize>)],
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<CandidateScore> {
        let template = base.with_params(params)?;
        let mut fold_scores = Vec::with_capacity(folds.len());
        for (train_idx, valid_idx) in folds {
            let (x_train, y_train) = take_rows(x, y, train_idx);
            let (x_valid, y_valid) = take_rows(x, y, valid_idx);

            let mut estimator = template.clone();
            estimator.fit(x_train.view(), y_train.view())?;
            let pred = estimator.predict(x_valid.view())?;
            fold_scores.push(r2_score(y_valid.view(), pred.view()));
        }
        let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
        debug!(
            model = base.name(),
            params = %format_params(params),
            score = mean_score,
            "Scored grid point"
        );
        Ok(CandidateScore {
            params: params.clone(),
            fold_scores,
            mean_score,
        })
    }
}

/// Contiguous folds; the first `n % k` folds hold one extra row
pub fn kfold_indices(n: usize, k: usize) -> Vec<(Vec<usize>, Vec<usize>)> {
    let base = n / k;
    let extra = n % k;
    let mut start = 0;
    (0..k)
        .map(|fold| {
            let size = base + usize::from(fold < extra);
            let valid: Vec<usize> = (start..start + size).collect();
            let train: Vec<usize> = (0..start).chain(start + size..n).collect();
            start += size;
            (train, valid)
        })
        .collect()
}

fn take_rows(x: ArrayView2<f64>, y: ArrayView1<f64>, rows: &[usize]) -> (Array2<f64>, Array1<f64>) {
    (x.select(Axis(0), rows), y.select(Axis(0), rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::estimators::{ModelRegistry, ParamValue};
    use ndarray::Array2;

    fn noisy_line() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| ((i * (j + 2)) % 11) as f64);
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, r)| 1.5 * r[0] - 0.5 * r[1] + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect();
        (x, y)
    }

    #[test]
    fn test_kfold_partitions_rows() {
        let folds = kfold_indices(10, 3);
        let sizes: Vec<usize> = folds.iter().map(|(_, v)| v.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(folds[1].1, vec![4, 5, 6]);
        for (train, valid) in &folds {
            assert_eq!(train.len() + valid.len(), 10);
            assert!(valid.iter().all(|v| !train.contains(v)));
        }
    }

    #[test]
    fn test_search_prefers_small_ridge_penalty() {
        let (x, y) = noisy_line();
        let base = ModelRegistry::builtin().create("Ridge").unwrap();
        let mut grid = ParamGrid::new();
        grid.insert(
            "alpha".into(),
            vec![ParamValue::Float(0.01), ParamValue::Float(10_000.0)],
        );

        let search = GridSearch::new(&SearchConfig { cv: 5, n_jobs: 1 });
        let result = search.fit(&base, &grid, x.view(), y.view()).unwrap();

        assert_eq!(result.candidates.len(), 2);
        assert_eq!(result.best_params["alpha"], ParamValue::Float(0.01));
        assert!(result.best_score > 0.9);
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let (x, y) = noisy_line();
        let base = ModelRegistry::builtin().create("KNeighborsRegressor").unwrap();
        let mut grid = ParamGrid::new();
        grid.insert(
            "n_neighbors".into(),
            vec![ParamValue::Int(1), ParamValue::Int(3), ParamValue::Int(5)],
        );

        let seq = GridSearch::new(&SearchConfig { cv: 4, n_jobs: 1 })
            .fit(&base, &grid, x.view(), y.view())
            .unwrap();
        let par = GridSearch::new(&SearchConfig { cv: 4, n_jobs: -1 })
            .fit(&base, &grid, x.view(), y.view())
            .unwrap();

        assert_eq!(seq.best_params, par.best_params);
        let seq_scores: Vec<f64> = seq.candidates.iter().map(|c| c.mean_score).collect();
        let par_scores: Vec<f64> = par.candidates.iter().map(|c| c.mean_score).collect();
        assert_eq!(seq_scores, par_scores);
    }

    #[test]
    fn test_ties_go_to_first_combination() {
        // In one dimension Manhattan and Euclidean neighbors coincide, so both score the same
        let x = Array2::from_shape_fn((12, 1), |(i, _)| i as f64);
        let y: Array1<f64> = (0..12).map(|i| (i * i) as f64).collect();
        let base = ModelRegistry::builtin().create("KNeighborsRegressor").unwrap();
        let mut grid = ParamGrid::new();
        grid.insert("p".into(), vec![ParamValue::Float(2.0), ParamValue::Float(1.0)]);

        let result = GridSearch::new(&SearchConfig { cv: 3, n_jobs: 1 })
            .fit(&base, &grid, x.view(), y.view())
            .unwrap();
        assert_eq!(result.candidates[0].mean_score, result.candidates[1].mean_score);
        assert_eq!(result.best_params["p"], ParamValue::Float(2.0));
    }

    #[test]
    fn test_unknown_hyperparameter_fails() {
        let (x, y) = noisy_line();
        let base = ModelRegistry::builtin().create("Ridge").unwrap();
        let mut grid = ParamGrid::new();
        grid.insert("depth".into(), vec![ParamValue::Int(3)]);

        let err = GridSearch::new(&SearchConfig { cv: 3, n_jobs: 1 })
            .fit(&base, &grid, x.view(), y.view())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Tuning { .. }));
    }
}
