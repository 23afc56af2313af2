//! Regression estimators and the closed registry of supported model types

mod boosting;
mod forest;
mod knn;
mod linear;
mod params;
mod tree;

use std::collections::BTreeMap;

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub use boosting::XGBRegressor;
pub use forest::RandomForestRegressor;
pub use knn::{KNeighborsRegressor, NeighborWeights};
pub use linear::{LinearFit, LinearRegression, Ridge};
pub use params::{expand_grid, format_params, ParamGrid, ParamSet, ParamValue};
pub use tree::{DecisionTreeRegressor, MaxFeatures, TreeNode};

/// A configured, possibly fitted, regression model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model")]
pub enum Estimator {
    LinearRegression(LinearRegression),
    Ridge(Ridge),
    KNeighborsRegressor(KNeighborsRegressor),
    DecisionTreeRegressor(DecisionTreeRegressor),
    RandomForestRegressor(RandomForestRegressor),
    XGBRegressor(XGBRegressor),
}

impl Estimator {
    /// Model type tag used in configuration
    pub fn name(&self) -> &'static str {
        match self {
            Estimator::LinearRegression(_) => LinearRegression::NAME,
            Estimator::Ridge(_) => Ridge::NAME,
            Estimator::KNeighborsRegressor(_) => KNeighborsRegressor::NAME,
            Estimator::DecisionTreeRegressor(_) => DecisionTreeRegressor::NAME,
            Estimator::RandomForestRegressor(_) => RandomForestRegressor::NAME,
            Estimator::XGBRegressor(_) => XGBRegressor::NAME,
        }
    }

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match self {
            Estimator::LinearRegression(m) => m.set_param(name, value),
            Estimator::Ridge(m) => m.set_param(name, value),
            Estimator::KNeighborsRegressor(m) => m.set_param(name, value),
            Estimator::DecisionTreeRegressor(m) => m.set_param(name, value),
            Estimator::RandomForestRegressor(m) => m.set_param(name, value),
            Estimator::XGBRegressor(m) => m.set_param(name, value),
        }
    }

    /// Copy of this estimator with every parameter in `params` applied
    pub fn with_params(&self, params: &ParamSet) -> Result<Self> {
        let mut estimator = self.clone();
        for (name, value) in params {
            estimator.set_param(name, value)?;
        }
        Ok(estimator)
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        match self {
            Estimator::LinearRegression(m) => m.fit(x, y),
            Estimator::Ridge(m) => m.fit(x, y),
            Estimator::KNeighborsRegressor(m) => m.fit(x, y),
            Estimator::DecisionTreeRegressor(m) => m.fit(x, y),
            Estimator::RandomForestRegressor(m) => m.fit(x, y),
            Estimator::XGBRegressor(m) => m.fit(x, y),
        }
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        match self {
            Estimator::LinearRegression(m) => m.predict(x),
            Estimator::Ridge(m) => m.predict(x),
            Estimator::KNeighborsRegressor(m) => m.predict(x),
            Estimator::DecisionTreeRegressor(m) => m.predict(x),
            Estimator::RandomForestRegressor(m) => m.predict(x),
            Estimator::XGBRegressor(m) => m.predict(x),
        }
    }
}

/// Library family a model type belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelFamily {
    Classic,
    Boosting,
}

struct RegistryEntry {
    family: ModelFamily,
    construct: fn() -> Estimator,
}

/// Closed mapping from model type tag to constructor, built once at startup
pub struct ModelRegistry {
    entries: BTreeMap<&'static str, RegistryEntry>,
}

impl ModelRegistry {
    pub fn builtin() -> Self {
        let mut registry = Self {
            entries: BTreeMap::new(),
        };
        registry.register(LinearRegression::NAME, ModelFamily::Classic, || {
            Estimator::LinearRegression(LinearRegression::default())
        });
        registry.register(Ridge::NAME, ModelFamily::Classic, || Estimator::Ridge(Ridge::default()));
        registry.register(KNeighborsRegressor::NAME, ModelFamily::Classic, || {
            Estimator::KNeighborsRegressor(KNeighborsRegressor::default())
        });
        registry.register(DecisionTreeRegressor::NAME, ModelFamily::Classic, || {
            Estimator::DecisionTreeRegressor(DecisionTreeRegressor::default())
        });
        registry.register(RandomForestRegressor::NAME, ModelFamily::Classic, || {
            Estimator::RandomForestRegressor(RandomForestRegressor::default())
        });
        registry.register(XGBRegressor::NAME, ModelFamily::Boosting, || {
            Estimator::XGBRegressor(XGBRegressor::default())
        });
        registry
    }

    fn register(&mut self, name: &'static str, family: ModelFamily, construct: fn() -> Estimator) {
        self.entries.insert(name, RegistryEntry { family, construct });
    }

    /// Fresh base estimator for `name`
    pub fn create(&self, name: &str) -> Result<Estimator> {
        self.entries
            .get(name)
            .map(|entry| (entry.construct)())
            .ok_or_else(|| PipelineError::UnsupportedModel(name.to_string()))
    }

    pub fn family(&self, name: &str) -> Option<ModelFamily> {
        self.entries.get(name).map(|entry| entry.family)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }
}

/// Coefficient of determination.
///
/// A zero-variance target scores 1.0 when predicted exactly and 0.0 otherwise.
pub fn r2_score(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> f64 {
    let n = y_true.len();
    if n == 0 || n != y_pred.len() {
        return f64::NAN;
    }
    let mean = y_true.sum() / n as f64;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}
