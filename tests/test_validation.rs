//! Integration tests for schema and drift validation

use polars::prelude::*;
use tourism::pipeline::*;

mod common;

use common::*;

fn splits(gender_column: &str) -> (DataFrame, DataFrame) {
    let df = create_tourism_dataframe_with(100, 7, gender_column)
        .drop("CustomerID")
        .unwrap();
    split_train_test(&df, 0.2, 42).unwrap()
}

#[test]
fn test_clean_splits_proceed() {
    let dir = tempfile::tempdir().unwrap();
    let config = tourism_configuration(&dir.path().join("artifacts"), 0.5);
    let (train, test) = splits("Gender");

    let report = SchemaValidator::new(&config.schema, &config.drift)
        .validate(&train, &test)
        .unwrap();

    assert!(!report.drift_detected(), "same-distribution splits should not drift");
    assert!(report.proceed(), "failures: {:?}", report.failures());
    assert!(report.failures().is_empty());
    assert_eq!(report.train.as_ref().unwrap().column_count, 11);
}

#[test]
fn test_column_count_mismatch_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = tourism_configuration(&dir.path().join("artifacts"), 0.5);
    let validator = SchemaValidator::new(&config.schema, &config.drift);

    // CustomerID left in place gives one column too many
    let df = create_tourism_dataframe(30, 3);
    assert!(!validator.validate_columns(&df));
    assert!(validator.validate_categorical(&df));
    assert!(validator.validate_numerical(&df));

    let trimmed = df.drop("CustomerID").unwrap().drop("CityTier").unwrap();
    assert!(!validator.validate_columns(&trimmed));
    assert!(!validator.validate_numerical(&trimmed));
}

#[test]
fn test_one_missing_column_fails_whole_check() {
    let dir = tempfile::tempdir().unwrap();
    let config = tourism_configuration(&dir.path().join("artifacts"), 0.5);
    let (train, test) = splits("Sex");

    let report = SchemaValidator::new(&config.schema, &config.drift)
        .validate(&train, &test)
        .unwrap();

    assert!(!report.proceed());
    let train_check = report.train.as_ref().unwrap();
    // The count still matches; only the presence check notices the rename
    assert!(train_check.columns_ok());
    assert!(!train_check.categorical_ok());
    assert!(train_check.numerical_ok());
    assert_eq!(train_check.missing_categorical, vec!["Gender".to_string()]);
    assert!(report
        .failures()
        .iter()
        .any(|f| f.contains("missing categorical columns: Gender")));
}

#[test]
fn test_drift_stops_validation_before_schema_checks() {
    let dir = tempfile::tempdir().unwrap();
    let config = tourism_configuration(&dir.path().join("artifacts"), 0.5);

    let reference = df! {
        "Age" => (0..80).map(|i| 20.0 + (i % 20) as f64).collect::<Vec<_>>(),
        "MonthlyIncome" => (0..80).map(|i| 15_000.0 + 100.0 * i as f64).collect::<Vec<_>>(),
    }
    .unwrap();
    let current = df! {
        "Age" => (0..40).map(|i| 60.0 + (i % 20) as f64).collect::<Vec<_>>(),
        "MonthlyIncome" => (0..40).map(|i| 90_000.0 + 100.0 * i as f64).collect::<Vec<_>>(),
    }
    .unwrap();

    let report = SchemaValidator::new(&config.schema, &config.drift)
        .validate(&reference, &current)
        .unwrap();

    assert!(report.drift_detected());
    assert!(report.train.is_none() && report.test.is_none());
    assert!(!report.proceed());
    assert!(report.failures()[0].starts_with("data drift detected in 2/2 columns"));
}

#[test]
fn test_disabled_drift_runs_schema_checks_only() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = tourism_configuration(&dir.path().join("artifacts"), 0.5);
    config.drift.enabled = false;
    let (train, test) = splits("Gender");

    let report = SchemaValidator::new(&config.schema, &config.drift)
        .validate(&train, &test)
        .unwrap();
    assert!(report.drift.is_none());
    assert!(report.proceed());
}

#[test]
fn test_nan_cells_from_csv_are_treated_as_missing() {
    let ws = Workspace::new();
    let mut df = create_tourism_dataframe(100, 7);
    let income: Vec<f64> = df
        .column("MonthlyIncome")
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .enumerate()
        .map(|(i, v)| if i % 10 == 0 { f64::NAN } else { v })
        .collect();
    df.with_column(Column::new("MonthlyIncome".into(), income)).unwrap();
    write_csv(&mut df, &ws.data_root(), DATASET);

    let config = tourism_configuration(&ws.artifacts_dir(), 0.5);
    let source = FileDatasetSource::new(ws.data_root());
    let (train, test) = ingest(&source, &config).unwrap();

    let report = SchemaValidator::new(&config.schema, &config.drift)
        .validate(&train, &test)
        .unwrap();
    assert!(report.proceed(), "failures: {:?}", report.failures());

    let columns = vec!["MonthlyIncome".to_string()];
    let bounds = OutlierPolicy::IqrCap.fit(&train, &columns).unwrap();
    assert!(bounds[0].lower.is_finite() && bounds[0].upper.is_finite());
    let capped = OutlierPolicy::IqrCap.apply(&train, &bounds).unwrap();
    assert_eq!(capped.height(), train.height());
}
