//! Bagged ensemble of regression trees

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::linear::not_fitted;
use super::params::{unknown_param, ParamValue};
use super::tree::{check_shapes, check_width, grow_tree, GrowthParams, MaxFeatures, TreeNode};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub random_state: u64,
    n_features: usize,
    trees: Vec<TreeNode>,
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            bootstrap: true,
            random_state: 0,
            n_features: 0,
            trees: Vec::new(),
        }
    }
}

impl RandomForestRegressor {
    pub const NAME: &'static str = "RandomForestRegressor";

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_estimators" => {
                let n = value.as_usize(Self::NAME, name)?;
                if n == 0 {
                    return Err(PipelineError::tuning(Self::NAME, "n_estimators must be at least 1"));
                }
                self.n_estimators = n;
            }
            "max_depth" => self.max_depth = value.as_opt_usize(Self::NAME, name)?,
            "min_samples_split" => {
                self.min_samples_split = value.as_usize(Self::NAME, name)?.max(2)
            }
            "min_samples_leaf" => self.min_samples_leaf = value.as_usize(Self::NAME, name)?.max(1),
            "max_features" => self.max_features = MaxFeatures::from_param(Self::NAME, name, value)?,
            "bootstrap" => self.bootstrap = value.as_bool(Self::NAME, name)?,
            "random_state" => self.random_state = value.as_usize(Self::NAME, name)? as u64,
            _ => return Err(unknown_param(Self::NAME, name)),
        }
        Ok(())
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_shapes(Self::NAME, x, y)?;
        let n = x.nrows();
        let targets = y.to_vec();
        let params = GrowthParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
            lambda: 0.0,
            gamma: 0.0,
        };

        // Each tree owns its seed, so the ensemble does not depend on thread scheduling
        let base_seed = self.random_state;
        let bootstrap = self.bootstrap;
        self.trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|t| {
                let seed = base_seed.wrapping_mul(1_000_003).wrapping_add(t as u64);
                let indices: Vec<usize> = if bootstrap {
                    let mut rng = ChaCha8Rng::seed_from_u64(seed);
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                grow_tree(x, &targets, indices, params, seed.wrapping_add(1))
            })
            .collect();
        self.n_features = x.ncols();
        Ok(())
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(not_fitted(Self::NAME));
        }
        check_width(Self::NAME, x, self.n_features)?;
        let n_trees = self.trees.len() as f64;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees)
            .collect())
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
