//! Regression trees
//!
//! One growing routine serves every tree-based model. Splits maximize the
//! structure-score gain `G_L²/(n_L+λ) + G_R²/(n_R+λ) - G²/(n+λ)` over the
//! node targets `G`. With `λ = 0` this is exactly the reduction in squared
//! error used by CART; the boosted model grows its trees on residuals with a
//! positive `λ`.

use std::cmp::Ordering;

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::linear::not_fitted;
use super::params::{unknown_param, ParamValue};
use crate::error::{PipelineError, Result};

/// Tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Number of features considered at each split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    All,
    Sqrt,
    Log2,
    Fraction(f64),
    Fixed(usize),
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let k = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f) as usize,
            MaxFeatures::Fixed(k) => *k,
        };
        k.clamp(1, n_features.max(1))
    }

    pub fn from_param(model: &str, name: &str, value: &ParamValue) -> Result<Self> {
        match value {
            ParamValue::Null => Ok(MaxFeatures::All),
            ParamValue::Int(k) if *k > 0 => Ok(MaxFeatures::Fixed(*k as usize)),
            ParamValue::Float(f) if *f > 0.0 && *f <= 1.0 => Ok(MaxFeatures::Fraction(*f)),
            ParamValue::Text(s) if s == "sqrt" => Ok(MaxFeatures::Sqrt),
            ParamValue::Text(s) if s == "log2" => Ok(MaxFeatures::Log2),
            other => Err(PipelineError::tuning(
                model,
                format!(
                    "hyperparameter '{}' must be null, a positive integer, a fraction in (0, 1], \"sqrt\" or \"log2\", got {}",
                    name, other
                ),
            )),
        }
    }
}

/// Stopping rules and regularization for tree growth
#[derive(Debug, Clone, Copy)]
pub(crate) struct GrowthParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    /// L2 penalty on leaf values
    pub lambda: f64,
    /// Minimum gain for a split to be kept
    pub gamma: f64,
}

struct Grower<'a> {
    x: ArrayView2<'a, f64>,
    targets: &'a [f64],
    params: GrowthParams,
    rng: ChaCha8Rng,
}

/// Grow a tree on the rows in `indices`
pub(crate) fn grow_tree(
    x: ArrayView2<f64>,
    targets: &[f64],
    indices: Vec<usize>,
    params: GrowthParams,
    seed: u64,
) -> TreeNode {
    let mut grower = Grower {
        x: x.reborrow(),
        targets,
        params,
        rng: ChaCha8Rng::seed_from_u64(seed),
    };
    grower.grow(indices, 0)
}

impl Grower<'_> {
    fn leaf(&self, indices: &[usize]) -> TreeNode {
        let sum: f64 = indices.iter().map(|&i| self.targets[i]).sum();
        let denom = indices.len() as f64 + self.params.lambda;
        TreeNode::Leaf {
            value: if denom > 0.0 { sum / denom } else { 0.0 },
        }
    }

    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> TreeNode {
        let n = indices.len();
        let at_max_depth = self.params.max_depth.is_some_and(|d| depth >= d);
        if n < self.params.min_samples_split || n < 2 * self.params.min_samples_leaf || at_max_depth
        {
            return self.leaf(&indices);
        }

        let Some((feature, threshold)) = self.best_split(&indices) else {
            return self.leaf(&indices);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[[i, feature]] <= threshold);

        TreeNode::Split {
            feature,
            threshold,
            left: Box::new(self.grow(left, depth + 1)),
            right: Box::new(self.grow(right, depth + 1)),
        }
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let p = self.x.ncols();
        let k = self.params.max_features.resolve(p);
        if k >= p {
            return (0..p).collect();
        }
        let mut chosen = sample(&mut self.rng, p, k).into_vec();
        chosen.sort_unstable();
        chosen
    }

    fn best_split(&mut self, indices: &[usize]) -> Option<(usize, f64)> {
        let lambda = self.params.lambda;
        let min_leaf = self.params.min_samples_leaf.max(1);
        let n = indices.len();
        let total: f64 = indices.iter().map(|&i| self.targets[i]).sum();
        let parent_score = total * total / (n as f64 + lambda);

        let mut best: Option<(usize, f64, f64)> = None;
        let mut order = indices.to_vec();

        for feature in self.candidate_features() {
            let x = self.x;
            order.sort_by(|&a, &b| {
                x[[a, feature]]
                    .partial_cmp(&x[[b, feature]])
                    .unwrap_or(Ordering::Equal)
            });

            let mut left_sum = 0.0;
            for pos in 0..n - 1 {
                left_sum += self.targets[order[pos]];
                let n_left = pos + 1;
                let n_right = n - n_left;
                let here = x[[order[pos], feature]];
                let next = x[[order[pos + 1], feature]];
                if here == next || n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / (n_left as f64 + lambda)
                    + right_sum * right_sum / (n_right as f64 + lambda)
                    - parent_score;

                if gain > self.params.gamma + 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, (here + next) / 2.0, gain));
                }
            }
        }

        best.map(|(feature, threshold, _)| (feature, threshold))
    }
}

/// CART regression tree minimizing squared error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub random_state: u64,
    n_features: usize,
    root: Option<TreeNode>,
}

impl Default for DecisionTreeRegressor {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            random_state: 0,
            n_features: 0,
            root: None,
        }
    }
}

impl DecisionTreeRegressor {
    pub const NAME: &'static str = "DecisionTreeRegressor";

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "max_depth" => self.max_depth = value.as_opt_usize(Self::NAME, name)?,
            "min_samples_split" => {
                self.min_samples_split = value.as_usize(Self::NAME, name)?.max(2)
            }
            "min_samples_leaf" => self.min_samples_leaf = value.as_usize(Self::NAME, name)?.max(1),
            "max_features" => self.max_features = MaxFeatures::from_param(Self::NAME, name, value)?,
            "random_state" => self.random_state = value.as_usize(Self::NAME, name)? as u64,
            _ => return Err(unknown_param(Self::NAME, name)),
        }
        Ok(())
    }

    pub(crate) fn growth_params(&self) -> GrowthParams {
        GrowthParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
            lambda: 0.0,
            gamma: 0.0,
        }
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_shapes(Self::NAME, x, y)?;
        let targets = y.to_vec();
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.root = Some(grow_tree(x, &targets, indices, self.growth_params(), self.random_state));
        self.n_features = x.ncols();
        Ok(())
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or_else(|| not_fitted(Self::NAME))?;
        check_width(Self::NAME, x, self.n_features)?;
        Ok(x.rows().into_iter().map(|row| root.predict_row(row)).collect())
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }
}

pub(crate) fn check_shapes(model: &str, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
    if x.nrows() == 0 || x.nrows() != y.len() {
        return Err(PipelineError::tuning(
            model,
            format!("cannot fit {} rows against {} targets", x.nrows(), y.len()),
        ));
    }
    Ok(())
}

pub(crate) fn check_width(model: &str, x: ArrayView2<f64>, expected: usize) -> Result<()> {
    if x.ncols() != expected {
        return Err(PipelineError::tuning(
            model,
            format!("expected {} features, got {}", expected, x.ncols()),
        ));
    }
    Ok(())
}
