//! Shared test utilities and fixture generators

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use polars::prelude::*;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};
use tempfile::TempDir;

pub const DATASET: &str = "tourism.csv";
pub const TARGET: &str = "ProdTaken";
pub const BUCKET: &str = "tourism-io-files";

pub const NUMERICAL: [&str; 6] = [
    "Age",
    "CityTier",
    "DurationOfPitch",
    "NumberOfTrips",
    "Passport",
    "MonthlyIncome",
];
pub const CATEGORICAL: [&str; 4] = ["TypeofContact", "Occupation", "Gender", "MaritalStatus"];

/// Synthetic tourism dataset with a known rule for the target.
///
/// `ProdTaken` is 1 exactly when the customer holds a passport and lives in
/// a tier 1 or tier 2 city, so a tree of depth two recovers it. `CustomerID` is an
/// identifier the schema drops before validation.
pub fn create_tourism_dataframe(rows: usize, seed: u64) -> DataFrame {
    create_tourism_dataframe_with(rows, seed, "Gender")
}

/// Same dataset with the gender column stored under `gender_column`
pub fn create_tourism_dataframe_with(rows: usize, seed: u64, gender_column: &str) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let contacts = ["Self Enquiry", "Company Invited"];
    let occupations = ["Salaried", "Small Business", "Large Business", "Free Lancer"];
    let genders = ["Male", "Female"];
    let marital = ["Single", "Married", "Divorced", "Unmarried"];

    let mut customer_id = Vec::with_capacity(rows);
    let mut age = Vec::with_capacity(rows);
    let mut contact = Vec::with_capacity(rows);
    let mut city_tier = Vec::with_capacity(rows);
    let mut pitch = Vec::with_capacity(rows);
    let mut occupation = Vec::with_capacity(rows);
    let mut gender = Vec::with_capacity(rows);
    let mut status = Vec::with_capacity(rows);
    let mut trips = Vec::with_capacity(rows);
    let mut passport = Vec::with_capacity(rows);
    let mut income = Vec::with_capacity(rows);
    let mut target = Vec::with_capacity(rows);

    for i in 0..rows {
        let tier: i64 = rng.gen_range(1..4);
        let p: i64 = rng.gen_range(0..2);
        customer_id.push(200_000 + i as i64);
        age.push(rng.gen_range(18..61i64));
        contact.push(contacts[rng.gen_range(0..contacts.len())]);
        city_tier.push(tier);
        pitch.push(rng.gen_range(5.0..36.0f64).round());
        occupation.push(occupations[rng.gen_range(0..occupations.len())]);
        gender.push(genders[rng.gen_range(0..genders.len())]);
        status.push(marital[rng.gen_range(0..marital.len())]);
        trips.push(rng.gen_range(1..9i64));
        passport.push(p);
        income.push((rng.gen_range(15_000.0..40_000.0f64) * 100.0).round() / 100.0);
        target.push(i64::from(p == 1 && tier < 3));
    }

    DataFrame::new(vec![
        Column::new("CustomerID".into(), customer_id),
        Column::new("Age".into(), age),
        Column::new("TypeofContact".into(), contact),
        Column::new("CityTier".into(), city_tier),
        Column::new("DurationOfPitch".into(), pitch),
        Column::new("Occupation".into(), occupation),
        Column::new(gender_column.into(), gender),
        Column::new("MaritalStatus".into(), status),
        Column::new("NumberOfTrips".into(), trips),
        Column::new("Passport".into(), passport),
        Column::new("MonthlyIncome".into(), income),
        Column::new(TARGET.into(), target),
    ])
    .unwrap()
}

/// Write `df` as CSV to `dir/name`
pub fn write_csv(df: &mut DataFrame, dir: &Path, name: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();
    path
}

/// Workspace of one pipeline run: data, artifacts, remote storage and config
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn data_root(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.dir.path().join("artifacts")
    }

    pub fn remote_root(&self) -> PathBuf {
        self.dir.path().join("remote")
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.json")
    }

    pub fn model_path(&self) -> PathBuf {
        self.artifacts_dir().join("model.json")
    }

    pub fn preprocessor_path(&self) -> PathBuf {
        self.artifacts_dir().join("preprocessor.json")
    }

    pub fn archive_path(&self) -> PathBuf {
        self.remote_root().join(BUCKET).join("artifacts.zip")
    }

    /// Write the 100-row dataset with a renamed gender column when `gender_column` differs
    pub fn write_dataset(&self, gender_column: &str) -> PathBuf {
        let mut df = create_tourism_dataframe_with(100, 7, gender_column);
        write_csv(&mut df, &self.data_root(), DATASET)
    }

    pub fn write_config(&self, config: &Value) -> PathBuf {
        let path = self.config_path();
        std::fs::write(&path, serde_json::to_string_pretty(config).unwrap()).unwrap();
        path
    }

    pub fn stored_config(&self) -> Value {
        serde_json::from_str(&std::fs::read_to_string(self.config_path()).unwrap()).unwrap()
    }
}

/// Configuration document for the synthetic dataset
pub fn tourism_config(artifacts_dir: &Path, baseline: f64) -> Value {
    json!({
        "version": 1,
        "artifacts_dir": artifacts_dir,
        "base_model_score": baseline,
        "data_source": { "source_id": DATASET },
        "split": { "test_size": 0.2, "random_state": 42 },
        "storage": { "bucket": BUCKET },
        "drift": { "enabled": true, "alpha": 0.05, "drift_share": 0.5 },
        "model_utils": { "cv": 3, "n_jobs": 1 },
        "train_model": [
            { "name": "LinearRegression" },
            { "name": "Ridge", "params": { "alpha": [0.1, 1.0] } },
            { "name": "DecisionTreeRegressor", "params": { "max_depth": [2, 4] } }
        ],
        "transform": {
            "outlier_policy": "iqr_cap",
            "pipeline_shape": "simple",
            "continuous_min_unique": 25
        },
        "schema": {
            "columns": [
                "Age", "TypeofContact", "CityTier", "DurationOfPitch", "Occupation",
                "Gender", "MaritalStatus", "NumberOfTrips", "Passport", "MonthlyIncome",
                TARGET
            ],
            "numerical_columns": NUMERICAL,
            "categorical_columns": CATEGORICAL,
            "drop_columns": ["CustomerID"],
            "target_column": TARGET,
            "onehot_columns": ["TypeofContact", "Gender", "MaritalStatus"],
            "binary_columns": ["Occupation"],
            "power_columns": ["MonthlyIncome"]
        }
    })
}

/// Parsed configuration for the synthetic dataset
pub fn tourism_configuration(artifacts_dir: &Path, baseline: f64) -> tourism::pipeline::Configuration {
    let raw = tourism_config(artifacts_dir, baseline).to_string();
    tourism::pipeline::Configuration::from_json(&raw).unwrap()
}
