//! Gradient-boosted regression trees with second-order leaf weights
//!
//! Squared-error loss has unit hessians, so each round fits a tree to the
//! current residuals with leaf weights `ΣG / (n + reg_lambda)` and adds it
//! scaled by the learning rate.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::linear::not_fitted;
use super::params::{unknown_param, ParamValue};
use super::tree::{check_shapes, check_width, grow_tree, GrowthParams, MaxFeatures, TreeNode};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XGBRegressor {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub reg_lambda: f64,
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub random_state: u64,
    base_score: f64,
    n_features: usize,
    trees: Vec<TreeNode>,
}

impl Default for XGBRegressor {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            reg_lambda: 1.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: 0,
            base_score: 0.0,
            n_features: 0,
            trees: Vec::new(),
        }
    }
}

impl XGBRegressor {
    pub const NAME: &'static str = "XGBRegressor";

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_estimators" => {
                let n = value.as_usize(Self::NAME, name)?;
                if n == 0 {
                    return Err(PipelineError::tuning(Self::NAME, "n_estimators must be at least 1"));
                }
                self.n_estimators = n;
            }
            "learning_rate" | "eta" => self.learning_rate = positive(name, value)?,
            "max_depth" => self.max_depth = value.as_usize(Self::NAME, name)?,
            "reg_lambda" | "lambda" => self.reg_lambda = non_negative(name, value)?,
            "gamma" => self.gamma = non_negative(name, value)?,
            "subsample" => self.subsample = fraction(name, value)?,
            "colsample_bytree" => self.colsample_bytree = fraction(name, value)?,
            "random_state" | "seed" => self.random_state = value.as_usize(Self::NAME, name)? as u64,
            _ => return Err(unknown_param(Self::NAME, name)),
        }
        Ok(())
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_shapes(Self::NAME, x, y)?;
        let n = x.nrows();
        let params = GrowthParams {
            max_depth: Some(self.max_depth),
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Fraction(self.colsample_bytree),
            lambda: self.reg_lambda,
            gamma: self.gamma,
        };
        let rows_per_round = ((n as f64 * self.subsample).ceil() as usize).clamp(1, n);
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);

        self.base_score = y.sum() / n as f64;
        let mut prediction = Array1::from_elem(n, self.base_score);
        let mut trees = Vec::with_capacity(self.n_estimators);

        for round in 0..self.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(prediction.iter()).map(|(t, p)| t - p).collect();
            let indices: Vec<usize> = if rows_per_round < n {
                let mut rows = sample(&mut rng, n, rows_per_round).into_vec();
                rows.sort_unstable();
                rows
            } else {
                (0..n).collect()
            };

            let seed = self.random_state.wrapping_add(round as u64);
            let tree = grow_tree(x, &residuals, indices, params, seed);
            for (p, row) in prediction.iter_mut().zip(x.rows()) {
                *p += self.learning_rate * tree.predict_row(row);
            }
            trees.push(tree);
        }

        self.trees = trees;
        self.n_features = x.ncols();
        Ok(())
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(not_fitted(Self::NAME));
        }
        check_width(Self::NAME, x, self.n_features)?;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| {
                self.base_score
                    + self.learning_rate
                        * self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
            })
            .collect())
    }
}

fn positive(name: &str, value: &ParamValue) -> Result<f64> {
    let v = value.as_f64(XGBRegressor::NAME, name)?;
    if v <= 0.0 {
        return Err(PipelineError::tuning(
            XGBRegressor::NAME,
            format!("{} must be positive, got {}", name, v),
        ));
    }
    Ok(v)
}

fn non_negative(name: &str, value: &ParamValue) -> Result<f64> {
    let v = value.as_f64(XGBRegressor::NAME, name)?;
    if v < 0.0 {
        return Err(PipelineError::tuning(
            XGBRegressor::NAME,
            format!("{} must be non-negative, got {}", name, v),
        ));
    }
    Ok(v)
}

fn fraction(name: &str, value: &ParamValue) -> Result<f64> {
    let v = value.as_f64(XGBRegressor::NAME, name)?;
    if !(v > 0.0 && v <= 1.0) {
        return Err(PipelineError::tuning(
            XGBRegressor::NAME,
            format!("{} must be in (0, 1], got {}", name, v),
        ));
    }
    Ok(v)
}
