//! Dataset drift detection between the train and test splits
//!
//! Each shared column is tested on its own: numeric columns with the two-sample
//! Kolmogorov-Smirnov test, everything else with a chi-square goodness-of-fit
//! test of test-split category counts against train-split proportions. The
//! dataset counts as drifted once the share of drifted columns reaches the
//! configured threshold.

use std::collections::BTreeMap;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::pipeline::config::DriftConfig;
use crate::pipeline::frame::{category_values, column_names, is_numeric, numeric_values};

/// Statistical test applied to a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriftTest {
    KolmogorovSmirnov,
    ChiSquare,
}

/// Drift result for a single column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDrift {
    pub column: String,
    pub test: DriftTest,
    pub statistic: f64,
    pub threshold: f64,
    pub drift_detected: bool,
}

/// Drift results for every compared column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub features: Vec<FeatureDrift>,
    pub n_drifted: usize,
    pub dataset_drift: bool,
}

impl DriftReport {
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    /// Fraction of compared columns that drifted
    pub fn drift_share(&self) -> f64 {
        if self.features.is_empty() {
            0.0
        } else {
            self.n_drifted as f64 / self.features.len() as f64
        }
    }

    pub fn drifted_columns(&self) -> Vec<&str> {
        self.features
            .iter()
            .filter(|f| f.drift_detected)
            .map(|f| f.column.as_str())
            .collect()
    }
}

/// Compare the distributions of `reference` and `current` column by column
pub fn detect_dataset_drift(
    reference: &DataFrame,
    current: &DataFrame,
    config: &DriftConfig,
) -> Result<DriftReport> {
    let current_cols = column_names(current);
    let mut features = Vec::new();

    for name in column_names(reference) {
        if !current_cols.contains(&name) {
            continue;
        }

        let numeric = is_numeric(reference, &name) && is_numeric(current, &name);
        let result = if numeric {
            let r: Vec<f64> = numeric_values(reference, &name)?.into_iter().flatten().collect();
            let c: Vec<f64> = numeric_values(current, &name)?.into_iter().flatten().collect();
            ks_test(&name, &r, &c, config.alpha)
        } else {
            let r: Vec<String> = category_values(reference, &name)?.into_iter().flatten().collect();
            let c: Vec<String> = category_values(current, &name)?.into_iter().flatten().collect();
            chi_square_test(&name, &r, &c, config.alpha)
        };

        if let Some(result) = result {
            debug!(
                column = %result.column,
                statistic = result.statistic,
                threshold = result.threshold,
                drift = result.drift_detected,
                "Drift test"
            );
            features.push(result);
        }
    }

    let n_drifted = features.iter().filter(|f| f.drift_detected).count();
    let share = if features.is_empty() {
        0.0
    } else {
        n_drifted as f64 / features.len() as f64
    };

    Ok(DriftReport {
        dataset_drift: !features.is_empty() && share >= config.drift_share,
        n_drifted,
        features,
    })
}

/// Two-sample KS statistic against its asymptotic critical value
fn ks_test(column: &str, reference: &[f64], current: &[f64], alpha: f64) -> Option<FeatureDrift> {
    let mut r: Vec<f64> = reference.iter().copied().filter(|x| !x.is_nan()).collect();
    let mut c: Vec<f64> = current.iter().copied().filter(|x| !x.is_nan()).collect();
    if r.is_empty() || c.is_empty() {
        return None;
    }

    r.sort_by(|a, b| a.total_cmp(b));
    c.sort_by(|a, b| a.total_cmp(b));

    // Walk both sorted samples once, evaluating the ECDF gap after each distinct value
    let (n1, n2) = (r.len(), c.len());
    let (mut i, mut j) = (0usize, 0usize);
    let mut statistic: f64 = 0.0;
    while i < n1 && j < n2 {
        let x = if r[i] <= c[j] { r[i] } else { c[j] };
        while i < n1 && r[i] <= x {
            i += 1;
        }
        while j < n2 && c[j] <= x {
            j += 1;
        }
        let gap = (i as f64 / n1 as f64 - j as f64 / n2 as f64).abs();
        statistic = statistic.max(gap);
    }

    let c_alpha = (-0.5 * (alpha / 2.0).ln()).sqrt();
    let threshold = c_alpha * ((n1 + n2) as f64 / (n1 * n2) as f64).sqrt();

    Some(FeatureDrift {
        column: column.to_string(),
        test: DriftTest::KolmogorovSmirnov,
        statistic,
        threshold,
        drift_detected: statistic > threshold,
    })
}

/// Chi-square goodness of fit of `current` counts against `reference` proportions
fn chi_square_test(
    column: &str,
    reference: &[String],
    current: &[String],
    alpha: f64,
) -> Option<FeatureDrift> {
    if reference.is_empty() || current.is_empty() {
        return None;
    }

    let mut ref_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in reference {
        *ref_counts.entry(v.as_str()).or_default() += 1;
    }
    let mut cur_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in current {
        *cur_counts.entry(v.as_str()).or_default() += 1;
    }

    let mut categories: Vec<&str> = ref_counts.keys().copied().collect();
    for k in cur_counts.keys() {
        if !ref_counts.contains_key(k) {
            categories.push(*k);
        }
    }
    if categories.len() < 2 {
        return Some(FeatureDrift {
            column: column.to_string(),
            test: DriftTest::ChiSquare,
            statistic: 0.0,
            threshold: 0.0,
            drift_detected: false,
        });
    }

    // Categories absent from the reference get a tiny expected share
    let n_ref = reference.len() as f64;
    let n_cur = current.len() as f64;
    let statistic: f64 = categories
        .iter()
        .map(|k| {
            let p = ref_counts.get(k).map(|&n| n as f64 / n_ref).unwrap_or(1e-4);
            let expected = p * n_cur;
            let observed = cur_counts.get(k).copied().unwrap_or(0) as f64;
            (observed - expected).powi(2) / expected
        })
        .sum();

    let threshold = chi_square_critical(categories.len() - 1, alpha);

    Some(FeatureDrift {
        column: column.to_string(),
        test: DriftTest::ChiSquare,
        statistic,
        threshold,
        drift_detected: statistic > threshold,
    })
}

/// Upper `alpha` critical value of the chi-square distribution (Wilson-Hilferty)
fn chi_square_critical(df: usize, alpha: f64) -> f64 {
    let k = df as f64;
    let z = upper_normal_quantile(alpha);
    let h = 2.0 / (9.0 * k);
    k * (1.0 - h + z * h.sqrt()).powi(3)
}

/// Upper-tail standard normal quantile (Abramowitz-Stegun 26.2.23)
fn upper_normal_quantile(alpha: f64) -> f64 {
    let p = alpha.clamp(1e-10, 0.5);
    let t = (-2.0 * p.ln()).sqrt();
    t - (2.515517 + 0.802853 * t + 0.010328 * t * t)
        / (1.0 + 1.432788 * t + 0.189269 * t * t + 0.001308 * t * t * t)
}
