//! k-nearest-neighbors regression

use std::cmp::Ordering;

use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::linear::not_fitted;
use super::params::{unknown_param, ParamValue};
use super::tree::{check_shapes, check_width};
use crate::error::{PipelineError, Result};

/// How neighbor targets are averaged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborWeights {
    Uniform,
    /// Inverse distance; exact matches take the whole weight
    Distance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNeighborsRegressor {
    pub n_neighbors: usize,
    pub weights: NeighborWeights,
    /// Minkowski power: 1 is Manhattan, 2 is Euclidean
    pub p: f64,
    x_train: Vec<Vec<f64>>,
    y_train: Vec<f64>,
}

impl Default for KNeighborsRegressor {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            weights: NeighborWeights::Uniform,
            p: 2.0,
            x_train: Vec::new(),
            y_train: Vec::new(),
        }
    }
}

impl KNeighborsRegressor {
    pub const NAME: &'static str = "KNeighborsRegressor";

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_neighbors" => {
                let k = value.as_usize(Self::NAME, name)?;
                if k == 0 {
                    return Err(PipelineError::tuning(Self::NAME, "n_neighbors must be at least 1"));
                }
                self.n_neighbors = k;
            }
            "weights" => {
                self.weights = match value.as_str(Self::NAME, name)? {
                    "uniform" => NeighborWeights::Uniform,
                    "distance" => NeighborWeights::Distance,
                    other => {
                        return Err(PipelineError::tuning(
                            Self::NAME,
                            format!("weights must be \"uniform\" or \"distance\", got \"{}\"", other),
                        ))
                    }
                }
            }
            "p" => {
                let p = value.as_f64(Self::NAME, name)?;
                if p < 1.0 {
                    return Err(PipelineError::tuning(Self::NAME, format!("p must be >= 1, got {}", p)));
                }
                self.p = p;
            }
            _ => return Err(unknown_param(Self::NAME, name)),
        }
        Ok(())
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        check_shapes(Self::NAME, x, y)?;
        if x.nrows() < self.n_neighbors {
            return Err(PipelineError::tuning(
                Self::NAME,
                format!(
                    "n_neighbors = {} exceeds the {} training rows",
                    self.n_neighbors,
                    x.nrows()
                ),
            ));
        }
        self.x_train = x.rows().into_iter().map(|r| r.to_vec()).collect();
        self.y_train = y.to_vec();
        Ok(())
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let Some(first) = self.x_train.first() else {
            return Err(not_fitted(Self::NAME));
        };
        check_width(Self::NAME, x, first.len())?;

        let rows: Vec<Vec<f64>> = x.rows().into_iter().map(|r| r.to_vec()).collect();
        let predictions: Vec<f64> = rows
            .par_iter()
            .map(|row| self.predict_one(row))
            .collect();
        Ok(Array1::from_vec(predictions))
    }

    fn predict_one(&self, point: &[f64]) -> f64 {
        let mut neighbors: Vec<(f64, usize)> = self
            .x_train
            .iter()
            .enumerate()
            .map(|(i, row)| (self.distance(point, row), i))
            .collect();
        // Equal distances resolve to the earlier training row
        neighbors.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal).then(a.1.cmp(&b.1)));
        neighbors.truncate(self.n_neighbors);

        match self.weights {
            NeighborWeights::Uniform => {
                neighbors.iter().map(|&(_, i)| self.y_train[i]).sum::<f64>() / neighbors.len() as f64
            }
            NeighborWeights::Distance => {
                let exact: Vec<f64> = neighbors
                    .iter()
                    .filter(|(d, _)| *d == 0.0)
                    .map(|&(_, i)| self.y_train[i])
                    .collect();
                if !exact.is_empty() {
                    return exact.iter().sum::<f64>() / exact.len() as f64;
                }
                let (num, den) = neighbors.iter().fold((0.0, 0.0), |(num, den), &(d, i)| {
                    (num + self.y_train[i] / d, den + 1.0 / d)
                });
                num / den
            }
        }
    }

    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        if self.p == 2.0 {
            a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
        } else if self.p == 1.0 {
            a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
        } else {
            a.iter()
                .zip(b)
                .map(|(x, y)| (x - y).abs().powf(self.p))
                .sum::<f64>()
                .powf(1.0 / self.p)
        }
    }
}
