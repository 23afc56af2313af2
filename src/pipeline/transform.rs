//! Feature transformation
//!
//! A [`Preprocessor`] is fitted once on the training split and applied
//! unchanged to every other frame. It produces three blocks of columns in a
//! fixed order: one-hot encoded categories, binary encoded categories and
//! scaled numerical columns. Columns in none of those groups are dropped.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use ndarray::{s, Array2, ArrayView1, ArrayView2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::pipeline::config::{Configuration, Schema};
use crate::pipeline::frame::{category_values, numeric_values};
use crate::pipeline::store::{save_object, ArtifactStore};

/// Which preprocessing steps the pipeline carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineShape {
    /// Encode and scale only; missing values are an error
    #[default]
    Simple,
    /// Impute, power-transform the configured columns, then encode and scale
    Imputed,
}

/// Fitted encoding of one categorical column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CategoryEncoder {
    column: String,
    /// Known categories. One-hot keeps them sorted, binary keeps first-seen order.
    categories: Vec<String>,
    /// Replacement for missing values
    fill: Option<String>,
}

impl CategoryEncoder {
    fn position(&self, value: &str) -> Option<usize> {
        self.categories.iter().position(|c| c == value)
    }

    /// Digits needed to write every ordinal `1..=n` in base 2
    fn binary_width(&self) -> usize {
        (usize::BITS - self.categories.len().leading_zeros()) as usize
    }
}

/// Fitted numeric pipeline of one column: impute, optional power transform, scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct NumericStep {
    column: String,
    fill: Option<f64>,
    /// Yeo-Johnson lambda
    power: Option<f64>,
    mean: f64,
    scale: f64,
}

impl NumericStep {
    fn apply(&self, value: f64) -> f64 {
        let value = match self.power {
            Some(lambda) => yeo_johnson(value, lambda),
            None => value,
        };
        (value - self.mean) / self.scale
    }
}

/// Preprocessing pipeline fitted on the training split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    shape: PipelineShape,
    onehot: Vec<CategoryEncoder>,
    binary: Vec<CategoryEncoder>,
    numeric: Vec<NumericStep>,
}

impl Preprocessor {
    /// Fit on the feature columns of `df`.
    ///
    /// `continuous` names the numerical columns imputed with the median; the
    /// other numerical columns take their most frequent value.
    pub fn fit(
        df: &DataFrame,
        schema: &Schema,
        shape: PipelineShape,
        continuous: &[String],
    ) -> Result<Self> {
        let impute = shape == PipelineShape::Imputed;

        let mut onehot = Vec::with_capacity(schema.onehot_columns.len());
        for column in &schema.onehot_columns {
            let values = category_values(df, column)?;
            let fill = if impute { most_frequent(&values) } else { None };
            let mut categories: Vec<String> = values
                .iter()
                .flatten()
                .cloned()
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect();
            if categories.is_empty() {
                categories.extend(fill.clone());
            }
            check_complete(column, &values, shape)?;
            onehot.push(CategoryEncoder {
                column: column.clone(),
                categories,
                fill,
            });
        }

        let mut binary = Vec::with_capacity(schema.binary_columns.len());
        for column in &schema.binary_columns {
            let values = category_values(df, column)?;
            check_complete(column, &values, shape)?;
            let fill = if impute { most_frequent(&values) } else { None };
            let mut categories: Vec<String> = Vec::new();
            for v in values.iter().flatten() {
                if !categories.contains(v) {
                    categories.push(v.clone());
                }
            }
            binary.push(CategoryEncoder {
                column: column.clone(),
                categories,
                fill,
            });
        }

        let mut numeric = Vec::with_capacity(schema.numerical_columns.len());
        for column in &schema.numerical_columns {
            let raw = numeric_values(df, column)?;
            check_complete(column, &raw, shape)?;

            let fill = if impute {
                let present: Vec<f64> = raw.iter().flatten().copied().collect();
                if continuous.contains(column) {
                    median(&present)
                } else {
                    most_frequent_number(&present)
                }
            } else {
                None
            };
            let filled: Vec<f64> = raw.iter().filter_map(|v| v.or(fill)).collect();

            let power = if impute && schema.power_columns.contains(column) {
                Some(fit_yeo_johnson(&filled))
            } else {
                None
            };
            let transformed: Vec<f64> = match power {
                Some(lambda) => filled.iter().map(|&x| yeo_johnson(x, lambda)).collect(),
                None => filled,
            };
            let (mean, std) = mean_std_population(&transformed);

            debug!(column = %column, ?fill, ?power, mean, std, "Fitted numeric step");
            numeric.push(NumericStep {
                column: column.clone(),
                fill,
                power,
                mean,
                scale: if std > 0.0 { std } else { 1.0 },
            });
        }

        Ok(Self {
            shape,
            onehot,
            binary,
            numeric,
        })
    }

    pub fn shape(&self) -> PipelineShape {
        self.shape
    }

    /// Output column names in order
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.n_features());
        for enc in &self.onehot {
            names.extend(enc.categories.iter().map(|c| format!("{}_{}", enc.column, c)));
        }
        for enc in &self.binary {
            names.extend((0..enc.binary_width()).map(|i| format!("{}_{}", enc.column, i)));
        }
        names.extend(self.numeric.iter().map(|n| n.column.clone()));
        names
    }

    pub fn n_features(&self) -> usize {
        self.onehot.iter().map(|e| e.categories.len()).sum::<usize>()
            + self.binary.iter().map(|e| e.binary_width()).sum::<usize>()
            + self.numeric.len()
    }

    /// Apply the fitted steps to `df`. Unseen categories encode as zeros.
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        let n = df.height();
        let mut out = Array2::<f64>::zeros((n, self.n_features()));
        let mut offset = 0;

        for enc in &self.onehot {
            let values = self.category_column(df, enc)?;
            for (row, value) in values.iter().enumerate() {
                if let Some(pos) = value.as_deref().and_then(|v| enc.position(v)) {
                    out[[row, offset + pos]] = 1.0;
                }
            }
            offset += enc.categories.len();
        }

        for enc in &self.binary {
            let width = enc.binary_width();
            let values = self.category_column(df, enc)?;
            for (row, value) in values.iter().enumerate() {
                if let Some(pos) = value.as_deref().and_then(|v| enc.position(v)) {
                    let ordinal = pos + 1;
                    for bit in 0..width {
                        if (ordinal >> (width - 1 - bit)) & 1 == 1 {
                            out[[row, offset + bit]] = 1.0;
                        }
                    }
                }
            }
            offset += width;
        }

        for step in &self.numeric {
            let values = numeric_values(df, &step.column)?;
            for (row, value) in values.into_iter().enumerate() {
                let value = value.or(step.fill).ok_or_else(|| missing_values(&step.column))?;
                out[[row, offset]] = step.apply(value);
            }
            offset += 1;
        }

        Ok(out)
    }

    fn category_column(&self, df: &DataFrame, enc: &CategoryEncoder) -> Result<Vec<Option<String>>> {
        let values = category_values(df, &enc.column)?;
        if enc.fill.is_none() && values.iter().any(Option::is_none) {
            return Err(missing_values(&enc.column));
        }
        Ok(values
            .into_iter()
            .map(|v| v.or_else(|| enc.fill.clone()))
            .collect())
    }
}

/// Train and test matrices with the target as the last column
#[derive(Debug, Clone)]
pub struct TransformedData {
    pub train: Array2<f64>,
    pub test: Array2<f64>,
    pub feature_names: Vec<String>,
    pub preprocessor_path: PathBuf,
}

/// Split a transformed matrix into features and the trailing target column
pub fn split_features_target(data: &Array2<f64>) -> (ArrayView2<'_, f64>, ArrayView1<'_, f64>) {
    let last = data.ncols().saturating_sub(1);
    (data.slice(s![.., ..last]), data.column(last))
}

/// Fits the preprocessor, transforms both splits and persists the fitted preprocessor
pub struct FeatureTransformer<'a> {
    config: &'a Configuration,
    store: &'a dyn ArtifactStore,
}

impl<'a> FeatureTransformer<'a> {
    pub fn new(config: &'a Configuration, store: &'a dyn ArtifactStore) -> Self {
        Self { config, store }
    }

    /// Numerical columns with enough distinct training values to count as continuous
    pub fn continuous_columns(&self, train: &DataFrame) -> Result<Vec<String>> {
        let min_unique = self.config.transform.continuous_min_unique;
        let mut continuous = Vec::new();
        for column in &self.config.schema.numerical_columns {
            let distinct: HashSet<u64> = numeric_values(train, column)?
                .into_iter()
                .flatten()
                .map(f64::to_bits)
                .collect();
            if distinct.len() >= min_unique {
                continuous.push(column.clone());
            }
        }
        Ok(continuous)
    }

    /// Fit on `train`, apply to both splits and return the fitted preprocessor
    pub fn fit_transform(
        &self,
        train: &DataFrame,
        test: &DataFrame,
    ) -> Result<(Array2<f64>, Array2<f64>, Preprocessor)> {
        let schema = &self.config.schema;
        let policy = self.config.transform.outlier_policy;

        let continuous = self.continuous_columns(train)?;
        let bounds = policy.fit(train, &continuous)?;
        let train = policy.apply(train, &bounds)?;
        let test = policy.apply(test, &bounds)?;
        info!(
            continuous = continuous.len(),
            policy = ?policy,
            train_rows = train.height(),
            test_rows = test.height(),
            "Handled outliers in continuous columns"
        );

        let preprocessor =
            Preprocessor::fit(&train, schema, self.config.transform.pipeline_shape, &continuous)?;

        let train_arr = with_target(preprocessor.transform(&train)?, &train, &schema.target_column)?;
        let test_arr = with_target(preprocessor.transform(&test)?, &test, &schema.target_column)?;
        Ok((train_arr, test_arr, preprocessor))
    }

    /// Full transformation step: fit, transform and persist the preprocessor
    pub fn run(&self, train: &DataFrame, test: &DataFrame) -> Result<TransformedData> {
        let (train_arr, test_arr, preprocessor) = self.fit_transform(train, test)?;

        let path = self.config.preprocessor_path();
        save_object(self.store, &path, &preprocessor)?;
        info!(
            features = preprocessor.n_features(),
            path = %path.display(),
            "Saved preprocessor"
        );

        Ok(TransformedData {
            train: train_arr,
            test: test_arr,
            feature_names: preprocessor.feature_names(),
            preprocessor_path: path,
        })
    }
}

fn with_target(features: Array2<f64>, df: &DataFrame, target: &str) -> Result<Array2<f64>> {
    let values = numeric_values(df, target)?;
    if values.iter().any(Option::is_none) {
        return Err(PipelineError::transformation(format!(
            "target column '{}' has missing values",
            target
        )));
    }
    let (n, p) = features.dim();
    let mut out = Array2::<f64>::zeros((n, p + 1));
    out.slice_mut(s![.., ..p]).assign(&features);
    for (row, value) in values.into_iter().flatten().enumerate() {
        out[[row, p]] = value;
    }
    Ok(out)
}

fn check_complete<T>(column: &str, values: &[Option<T>], shape: PipelineShape) -> Result<()> {
    if shape == PipelineShape::Simple && values.iter().any(Option::is_none) {
        return Err(missing_values(column));
    }
    Ok(())
}

fn missing_values(column: &str) -> PipelineError {
    PipelineError::transformation(format!(
        "column '{}' has missing values; the imputed pipeline shape handles them",
        column
    ))
}

/// Most frequent value; ties go to the smallest
fn most_frequent(values: &[Option<String>]) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values.iter().flatten() {
        *counts.entry(v.as_str()).or_default() += 1;
    }
    let max = counts.values().copied().max()?;
    counts
        .into_iter()
        .find(|(_, c)| *c == max)
        .map(|(v, _)| v.to_string())
}

fn most_frequent_number(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mut best: Option<(f64, usize)> = None;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j < sorted.len() && sorted[j] == sorted[i] {
            j += 1;
        }
        if best.map_or(true, |(_, c)| j - i > c) {
            best = Some((sorted[i], j - i));
        }
        i = j;
    }
    best.map(|(v, _)| v)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

fn mean_std_population(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn yeo_johnson(x: f64, lambda: f64) -> f64 {
    const EPS: f64 = 1e-8;
    if x >= 0.0 {
        if lambda.abs() < EPS {
            x.ln_1p()
        } else {
            ((x + 1.0).powf(lambda) - 1.0) / lambda
        }
    } else if (lambda - 2.0).abs() < EPS {
        -(-x).ln_1p()
    } else {
        -((1.0 - x).powf(2.0 - lambda) - 1.0) / (2.0 - lambda)
    }
}

/// Lambda in [-2, 2] maximizing the Yeo-Johnson profile log-likelihood
fn fit_yeo_johnson(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 1.0;
    }
    let n = values.len() as f64;
    let log_jacobian: f64 = values.iter().map(|x| x.signum() * x.abs().ln_1p()).sum();

    let mut best = (1.0, f64::NEG_INFINITY);
    for step in 0..=400 {
        let lambda = -2.0 + step as f64 * 0.01;
        let transformed: Vec<f64> = values.iter().map(|&x| yeo_johnson(x, lambda)).collect();
        let (_, std) = mean_std_population(&transformed);
        let var = std * std;
        if !(var > 0.0) || !var.is_finite() {
            continue;
        }
        let ll = -0.5 * n * var.ln() + (lambda - 1.0) * log_jacobian;
        if ll > best.1 {
            best = (lambda, ll);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema {
            columns: vec![
                "Age".into(),
                "Gender".into(),
                "Occupation".into(),
                "ProdTaken".into(),
            ],
            numerical_columns: vec!["Age".into()],
            categorical_columns: vec!["Gender".into(), "Occupation".into()],
            drop_columns: vec![],
            target_column: "ProdTaken".into(),
            onehot_columns: vec!["Gender".into()],
            binary_columns: vec!["Occupation".into()],
            power_columns: vec!["Age".into()],
        }
    }

    fn frame() -> DataFrame {
        df! {
            "Age" => [20.0, 30.0, 40.0, 50.0],
            "Gender" => ["Male", "Female", "Male", "Female"],
            "Occupation" => ["Salaried", "Small Business", "Large Business", "Salaried"],
            "ProdTaken" => [0i64, 1, 0, 1],
        }
        .unwrap()
    }

    #[test]
    fn test_output_layout() {
        let pre = Preprocessor::fit(&frame(), &schema(), PipelineShape::Simple, &[]).unwrap();
        assert_eq!(
            pre.feature_names(),
            vec!["Gender_Female", "Gender_Male", "Occupation_0", "Occupation_1", "Age"]
        );

        let x = pre.transform(&frame()).unwrap();
        assert_eq!(x.dim(), (4, 5));
        // Male -> [0, 1]; Salaried is ordinal 1 -> 01; Small Business 2 -> 10; Large Business 3 -> 11
        assert_eq!(x.row(0).to_vec()[..4], [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(x.row(1).to_vec()[..4], [1.0, 0.0, 1.0, 0.0]);
        assert_eq!(x.row(2).to_vec()[2..4], [1.0, 1.0]);
        // Standardized age has zero mean
        assert!(x.column(4).sum().abs() < 1e-12);
    }

    #[test]
    fn test_unseen_category_is_all_zeros() {
        let pre = Preprocessor::fit(&frame(), &schema(), PipelineShape::Simple, &[]).unwrap();
        let other = df! {
            "Age" => [35.0],
            "Gender" => ["Unknown"],
            "Occupation" => ["Free Lancer"],
            "ProdTaken" => [0i64],
        }
        .unwrap();
        let x = pre.transform(&other).unwrap();
        assert_eq!(x.row(0).to_vec()[..4], [0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_simple_shape_rejects_missing_values() {
        let df = df! {
            "Age" => [Some(20.0), None, Some(40.0), Some(50.0)],
            "Gender" => ["Male", "Female", "Male", "Female"],
            "Occupation" => ["Salaried", "Salaried", "Salaried", "Salaried"],
            "ProdTaken" => [0i64, 1, 0, 1],
        }
        .unwrap();
        let err = Preprocessor::fit(&df, &schema(), PipelineShape::Simple, &[]).unwrap_err();
        assert!(matches!(err, PipelineError::Transformation(_)));
    }

    #[test]
    fn test_imputed_shape_fills_missing_values() {
        let df = df! {
            "Age" => [Some(20.0), None, Some(40.0), Some(60.0)],
            "Gender" => [Some("Male"), Some("Male"), None, Some("Female")],
            "Occupation" => ["Salaried", "Salaried", "Salaried", "Salaried"],
            "ProdTaken" => [0i64, 1, 0, 1],
        }
        .unwrap();
        let continuous = vec!["Age".to_string()];
        let pre = Preprocessor::fit(&df, &schema(), PipelineShape::Imputed, &continuous).unwrap();
        let x = pre.transform(&df).unwrap();

        // Missing gender takes the most frequent value
        assert_eq!(x.row(2).to_vec()[..2], [0.0, 1.0]);
        // Missing age takes the median and lands where 40 does
        assert!((x[[1, 3]] - x[[2, 3]]).abs() < 1e-12);
    }

    #[test]
    fn test_yeo_johnson_identity_at_one() {
        for x in [-3.0, -0.5, 0.0, 2.5] {
            assert!((yeo_johnson(x, 1.0) - x).abs() < 1e-12);
        }
    }

    #[test]
    fn test_yeo_johnson_fit_compresses_skew() {
        let skewed: Vec<f64> = (0..50).map(|i| (i as f64 / 5.0).exp()).collect();
        let lambda = fit_yeo_johnson(&skewed);
        assert!(lambda < 1.0);
    }

    #[test]
    fn test_split_features_target() {
        let data = ndarray::array![[1.0, 2.0, 9.0], [3.0, 4.0, 8.0]];
        let (x, y) = split_features_target(&data);
        assert_eq!(x.dim(), (2, 2));
        assert_eq!(y.to_vec(), vec![9.0, 8.0]);
    }
}
