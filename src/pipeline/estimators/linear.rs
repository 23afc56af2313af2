//! Ordinary least squares and ridge regression

use faer::prelude::*;
use faer::Mat;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::params::{unknown_param, ParamValue};
use crate::error::{PipelineError, Result};

/// Diagonal jitter that keeps the normal equations solvable for collinear features
const OLS_JITTER: f64 = 1e-10;

/// Fitted coefficients shared by both linear models
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearFit {
    fn predict(&self, x: ArrayView2<f64>, model: &str) -> Result<Array1<f64>> {
        if x.ncols() != self.coefficients.len() {
            return Err(PipelineError::tuning(
                model,
                format!(
                    "expected {} features, got {}",
                    self.coefficients.len(),
                    x.ncols()
                ),
            ));
        }
        Ok(x
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .zip(&self.coefficients)
                    .map(|(a, b)| a * b)
                    .sum::<f64>()
                    + self.intercept
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    pub fit_intercept: bool,
    fitted: Option<LinearFit>,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self {
            fit_intercept: true,
            fitted: None,
        }
    }
}

impl LinearRegression {
    pub const NAME: &'static str = "LinearRegression";

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "fit_intercept" => self.fit_intercept = value.as_bool(Self::NAME, name)?,
            _ => return Err(unknown_param(Self::NAME, name)),
        }
        Ok(())
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        self.fitted = Some(solve_penalized(x, y, OLS_JITTER, self.fit_intercept, Self::NAME)?);
        Ok(())
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        self.fitted
            .as_ref()
            .ok_or_else(|| not_fitted(Self::NAME))?
            .predict(x, Self::NAME)
    }

    pub fn coefficients(&self) -> Option<&LinearFit> {
        self.fitted.as_ref()
    }
}

/// L2-penalized least squares. The intercept is never penalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ridge {
    pub alpha: f64,
    pub fit_intercept: bool,
    fitted: Option<LinearFit>,
}

impl Default for Ridge {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            fit_intercept: true,
            fitted: None,
        }
    }
}

impl Ridge {
    pub const NAME: &'static str = "Ridge";

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "alpha" => {
                let alpha = value.as_f64(Self::NAME, name)?;
                if alpha < 0.0 {
                    return Err(PipelineError::tuning(
                        Self::NAME,
                        format!("alpha must be non-negative, got {}", alpha),
                    ));
                }
                self.alpha = alpha;
            }
            "fit_intercept" => self.fit_intercept = value.as_bool(Self::NAME, name)?,
            _ => return Err(unknown_param(Self::NAME, name)),
        }
        Ok(())
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        let penalty = self.alpha.max(OLS_JITTER);
        self.fitted = Some(solve_penalized(x, y, penalty, self.fit_intercept, Self::NAME)?);
        Ok(())
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        self.fitted
            .as_ref()
            .ok_or_else(|| not_fitted(Self::NAME))?
            .predict(x, Self::NAME)
    }
}

/// Solve `(XcᵀXc + λI) w = Xcᵀyc` on centered data
fn solve_penalized(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    lambda: f64,
    fit_intercept: bool,
    model: &str,
) -> Result<LinearFit> {
    let (n, p) = x.dim();
    if n == 0 || n != y.len() {
        return Err(PipelineError::tuning(
            model,
            format!("cannot fit {} rows against {} targets", n, y.len()),
        ));
    }

    let (x_mean, y_mean) = if fit_intercept {
        let x_mean: Vec<f64> = x.columns().into_iter().map(|c| c.sum() / n as f64).collect();
        (x_mean, y.sum() / n as f64)
    } else {
        (vec![0.0; p], 0.0)
    };

    let mut design = Mat::<f64>::zeros(n, p);
    let mut target = Mat::<f64>::zeros(n, 1);
    for i in 0..n {
        for j in 0..p {
            design[(i, j)] = x[[i, j]] - x_mean[j];
        }
        target[(i, 0)] = y[i] - y_mean;
    }

    let mut gram = design.transpose() * &design;
    for j in 0..p {
        gram[(j, j)] += lambda;
    }
    let rhs = design.transpose() * &target;
    let solution = gram.partial_piv_lu().solve(&rhs);

    let coefficients: Vec<f64> = (0..p).map(|j| solution[(j, 0)]).collect();
    if coefficients.iter().any(|c| !c.is_finite()) {
        return Err(PipelineError::tuning(model, "least-squares solve did not converge"));
    }

    let intercept = y_mean
        - x_mean
            .iter()
            .zip(&coefficients)
            .map(|(m, c)| m * c)
            .sum::<f64>();

    Ok(LinearFit {
        coefficients,
        intercept,
    })
}

pub(crate) fn not_fitted(model: &str) -> PipelineError {
    PipelineError::tuning(model, "model has not been fitted")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn line_data() -> (Array2<f64>, Array1<f64>) {
        // y = 3 + 2 a - b
        let x = array![[0.0, 1.0], [1.0, 0.0], [2.0, 2.0], [3.0, 1.0], [4.0, 5.0], [5.0, 3.0]];
        let y: Array1<f64> = x.rows().into_iter().map(|r| 3.0 + 2.0 * r[0] - r[1]).collect();
        (x, y)
    }

    #[test]
    fn test_ols_recovers_exact_line() {
        let (x, y) = line_data();
        let mut model = LinearRegression::default();
        model.fit(x.view(), y.view()).unwrap();

        let fit = model.coefficients().unwrap();
        assert!((fit.coefficients[0] - 2.0).abs() < 1e-6);
        assert!((fit.coefficients[1] + 1.0).abs() < 1e-6);
        assert!((fit.intercept - 3.0).abs() < 1e-6);

        let pred = model.predict(x.view()).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-6);
        }
    }

    #[test]
    fn test_ridge_shrinks_coefficients() {
        let (x, y) = line_data();
        let mut weak = Ridge::default();
        weak.set_param("alpha", &ParamValue::Float(0.001)).unwrap();
        weak.fit(x.view(), y.view()).unwrap();
        let mut strong = Ridge::default();
        strong.set_param("alpha", &ParamValue::Float(1000.0)).unwrap();
        strong.fit(x.view(), y.view()).unwrap();

        let norm = |m: &Ridge| {
            m.fitted
                .as_ref()
                .unwrap()
                .coefficients
                .iter()
                .map(|c| c * c)
                .sum::<f64>()
        };
        assert!(norm(&strong) < norm(&weak));
    }

    #[test]
    fn test_collinear_columns_still_solve() {
        let x = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0], [4.0, 8.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let mut model = LinearRegression::default();
        model.fit(x.view(), y.view()).unwrap();
        let pred = model.predict(x.view()).unwrap();
        assert!((pred[3] - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let model = Ridge::default();
        assert!(model.predict(array![[1.0]].view()).is_err());
    }

    #[test]
    fn test_unknown_param_rejected() {
        let mut model = LinearRegression::default();
        let err = model.set_param("alpha", &ParamValue::Float(1.0)).unwrap_err();
        assert!(err.to_string().contains("unknown hyperparameter 'alpha'"));
    }
}
