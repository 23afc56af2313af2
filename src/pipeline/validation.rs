//! Schema and drift validation of the train/test splits
//!
//! Drift is checked first. A drifted dataset stops validation immediately and
//! the schema checks never run. Otherwise each split is checked for the
//! configured column count and for the presence of every configured
//! categorical and numerical column.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::pipeline::config::{DriftConfig, Schema};
use crate::pipeline::drift::{detect_dataset_drift, DriftReport};
use crate::pipeline::frame::column_names;

/// Schema check results for one split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaCheck {
    pub column_count: usize,
    pub expected_column_count: usize,
    pub missing_categorical: Vec<String>,
    pub missing_numerical: Vec<String>,
}

impl SchemaCheck {
    pub fn columns_ok(&self) -> bool {
        self.column_count == self.expected_column_count
    }

    pub fn categorical_ok(&self) -> bool {
        self.missing_categorical.is_empty()
    }

    pub fn numerical_ok(&self) -> bool {
        self.missing_numerical.is_empty()
    }

    pub fn passed(&self) -> bool {
        self.columns_ok() && self.categorical_ok() && self.numerical_ok()
    }
}

/// Outcome of validating both splits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// `None` when drift detection is disabled
    pub drift: Option<DriftReport>,
    /// `None` when drift stopped validation before the schema checks
    pub train: Option<SchemaCheck>,
    pub test: Option<SchemaCheck>,
}

impl ValidationReport {
    pub fn drift_detected(&self) -> bool {
        self.drift.as_ref().map(|d| d.dataset_drift).unwrap_or(false)
    }

    /// True only when there is no drift and every schema check passed on both splits
    pub fn proceed(&self) -> bool {
        if self.drift_detected() {
            return false;
        }
        match (&self.train, &self.test) {
            (Some(train), Some(test)) => train.passed() && test.passed(),
            _ => false,
        }
    }

    /// Human-readable reasons the run cannot proceed
    pub fn failures(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        if let Some(drift) = self.drift.as_ref().filter(|d| d.dataset_drift) {
            reasons.push(format!(
                "data drift detected in {}/{} columns ({})",
                drift.n_drifted,
                drift.n_features(),
                drift.drifted_columns().join(", ")
            ));
        }
        for (split, check) in [("train", &self.train), ("test", &self.test)] {
            let Some(check) = check else { continue };
            if !check.columns_ok() {
                reasons.push(format!(
                    "{} split has {} columns, schema expects {}",
                    split, check.column_count, check.expected_column_count
                ));
            }
            if !check.categorical_ok() {
                reasons.push(format!(
                    "{} split is missing categorical columns: {}",
                    split,
                    check.missing_categorical.join(", ")
                ));
            }
            if !check.numerical_ok() {
                reasons.push(format!(
                    "{} split is missing numerical columns: {}",
                    split,
                    check.missing_numerical.join(", ")
                ));
            }
        }
        reasons
    }
}

/// Validates train/test splits against the configured schema
pub struct SchemaValidator<'a> {
    schema: &'a Schema,
    drift: &'a DriftConfig,
}

impl<'a> SchemaValidator<'a> {
    pub fn new(schema: &'a Schema, drift: &'a DriftConfig) -> Self {
        Self { schema, drift }
    }

    /// Column count of the frame matches the schema
    pub fn validate_columns(&self, df: &DataFrame) -> bool {
        df.width() == self.schema.column_count()
    }

    /// Every configured categorical column is present
    pub fn validate_categorical(&self, df: &DataFrame) -> bool {
        missing(df, &self.schema.categorical_columns).is_empty()
    }

    /// Every configured numerical column is present
    pub fn validate_numerical(&self, df: &DataFrame) -> bool {
        missing(df, &self.schema.numerical_columns).is_empty()
    }

    pub fn check(&self, df: &DataFrame) -> SchemaCheck {
        SchemaCheck {
            column_count: df.width(),
            expected_column_count: self.schema.column_count(),
            missing_categorical: missing(df, &self.schema.categorical_columns),
            missing_numerical: missing(df, &self.schema.numerical_columns),
        }
    }

    pub fn validate(&self, train: &DataFrame, test: &DataFrame) -> Result<ValidationReport> {
        let drift = if self.drift.enabled {
            let report = detect_dataset_drift(train, test, self.drift)?;
            if report.dataset_drift {
                warn!(
                    drifted = report.n_drifted,
                    features = report.n_features(),
                    "Data drift detected, validation stopped"
                );
                return Ok(ValidationReport {
                    drift: Some(report),
                    train: None,
                    test: None,
                });
            }
            Some(report)
        } else {
            None
        };

        let report = ValidationReport {
            drift,
            train: Some(self.check(train)),
            test: Some(self.check(test)),
        };

        if report.proceed() {
            info!("Dataset schema validation completed");
        } else {
            warn!(reasons = ?report.failures(), "Dataset schema validation failed");
        }
        Ok(report)
    }
}

fn missing(df: &DataFrame, expected: &[String]) -> Vec<String> {
    let present = column_names(df);
    expected
        .iter()
        .filter(|c| !present.contains(c))
        .cloned()
        .collect()
}
