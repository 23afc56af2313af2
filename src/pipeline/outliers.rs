//! Outlier handling for continuous columns
//!
//! Bounds are fitted on the training split only and then applied unchanged to
//! both splits.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::pipeline::frame::{numeric_values, replace_numeric};

/// Strategy for values far from the bulk of a continuous column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierPolicy {
    /// Clip to `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]`
    #[default]
    IqrCap,
    /// Drop rows outside `mean ± 3σ`
    ZScoreDrop,
}

/// Fitted admissible range of one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnBounds {
    pub column: String,
    pub lower: f64,
    pub upper: f64,
}

impl ColumnBounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

impl OutlierPolicy {
    /// Fit bounds for each column from the non-null values of `df`
    pub fn fit(&self, df: &DataFrame, columns: &[String]) -> Result<Vec<ColumnBounds>> {
        let mut bounds = Vec::with_capacity(columns.len());
        for column in columns {
            let mut values: Vec<f64> = numeric_values(df, column)?.into_iter().flatten().collect();
            if values.is_empty() {
                continue;
            }
            let (lower, upper) = match self {
                OutlierPolicy::IqrCap => {
                    values.sort_by(|a, b| a.total_cmp(b));
                    let q1 = quantile(&values, 0.25);
                    let q3 = quantile(&values, 0.75);
                    let iqr = q3 - q1;
                    (q1 - 1.5 * iqr, q3 + 1.5 * iqr)
                }
                OutlierPolicy::ZScoreDrop => {
                    let (mean, std) = mean_std(&values);
                    (mean - 3.0 * std, mean + 3.0 * std)
                }
            };
            debug!(column = %column, lower, upper, policy = ?self, "Fitted outlier bounds");
            bounds.push(ColumnBounds {
                column: column.clone(),
                lower,
                upper,
            });
        }
        Ok(bounds)
    }

    /// Apply fitted bounds. Nulls are left alone.
    pub fn apply(&self, df: &DataFrame, bounds: &[ColumnBounds]) -> Result<DataFrame> {
        match self {
            OutlierPolicy::IqrCap => {
                let mut out = df.clone();
                for b in bounds {
                    let capped: Vec<Option<f64>> = numeric_values(df, &b.column)?
                        .into_iter()
                        .map(|v| v.map(|x| x.clamp(b.lower, b.upper)))
                        .collect();
                    replace_numeric(&mut out, &b.column, capped)?;
                }
                Ok(out)
            }
            OutlierPolicy::ZScoreDrop => {
                let mut keep = vec![true; df.height()];
                for b in bounds {
                    for (flag, value) in keep.iter_mut().zip(numeric_values(df, &b.column)?) {
                        if let Some(x) = value {
                            *flag &= b.contains(x);
                        }
                    }
                }
                let dropped = keep.iter().filter(|k| !**k).count();
                if dropped == df.height() && dropped > 0 {
                    return Err(PipelineError::transformation(
                        "z-score outlier removal dropped every row",
                    ));
                }
                let mask = BooleanChunked::from_slice("keep".into(), &keep);
                let out = df.filter(&mask)?;
                debug!(dropped, remaining = out.height(), "Dropped outlier rows");
                Ok(out)
            }
        }
    }
}

/// Linearly interpolated quantile of sorted values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Mean and sample standard deviation
fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        df! {
            "income" => [10.0, 12.0, 11.0, 13.0, 12.0, 11.0, 500.0, 10.0],
            "city" => ["a", "b", "a", "b", "a", "b", "a", "b"],
        }
        .unwrap()
    }

    fn cols() -> Vec<String> {
        vec!["income".to_string()]
    }

    #[test]
    fn test_quantile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&v, 0.25), 1.75);
        assert_eq!(quantile(&v, 0.75), 3.25);
    }

    #[test]
    fn test_iqr_cap_clips_extreme_values() {
        let df = frame();
        let bounds = OutlierPolicy::IqrCap.fit(&df, &cols()).unwrap();
        let capped = OutlierPolicy::IqrCap.apply(&df, &bounds).unwrap();

        assert_eq!(capped.height(), df.height());
        let values = numeric_values(&capped, "income").unwrap();
        assert_eq!(values[6], Some(bounds[0].upper));
        assert_eq!(values[0], Some(10.0));
    }

    #[test]
    fn test_iqr_cap_is_idempotent() {
        let df = frame();
        let bounds = OutlierPolicy::IqrCap.fit(&df, &cols()).unwrap();
        let once = OutlierPolicy::IqrCap.apply(&df, &bounds).unwrap();
        let twice = OutlierPolicy::IqrCap.apply(&once, &bounds).unwrap();
        assert!(once.equals(&twice));
    }

    #[test]
    fn test_zscore_drop_removes_rows() {
        let mut values: Vec<f64> = (0..30).map(|i| 50.0 + (i % 5) as f64).collect();
        values.push(10_000.0);
        let df = df! { "income" => values }.unwrap();

        let bounds = OutlierPolicy::ZScoreDrop.fit(&df, &cols()).unwrap();
        let kept = OutlierPolicy::ZScoreDrop.apply(&df, &bounds).unwrap();
        assert_eq!(kept.height(), 30);
    }

    #[test]
    fn test_nulls_are_preserved() {
        let df = df! { "income" => [Some(1.0), None, Some(3.0), Some(2.0)] }.unwrap();
        let bounds = OutlierPolicy::IqrCap.fit(&df, &cols()).unwrap();
        let capped = OutlierPolicy::IqrCap.apply(&df, &bounds).unwrap();
        assert_eq!(numeric_values(&capped, "income").unwrap()[1], None);
    }

    #[test]
    fn test_iqr_cap_with_nan_cells() {
        let df = df! { "income" => [1.0, 2.0, f64::NAN, f64::NAN, 3.0, f64::NAN] }.unwrap();
        let bounds = OutlierPolicy::IqrCap.fit(&df, &cols()).unwrap();
        assert!(bounds[0].lower.is_finite() && bounds[0].upper.is_finite());

        let capped = OutlierPolicy::IqrCap.apply(&df, &bounds).unwrap();
        assert_eq!(
            numeric_values(&capped, "income").unwrap(),
            vec![Some(1.0), Some(2.0), None, None, Some(3.0), None]
        );
    }

    #[test]
    fn test_policy_serde_names() {
        let p: OutlierPolicy = serde_json::from_str("\"z_score_drop\"").unwrap();
        assert_eq!(p, OutlierPolicy::ZScoreDrop);
        assert_eq!(serde_json::to_string(&OutlierPolicy::IqrCap).unwrap(), "\"iqr_cap\"");
    }
}
