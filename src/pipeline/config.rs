//! Pipeline configuration and the provider that loads and persists it
//!
//! The configuration is a single JSON document read once per run. The only
//! field a run ever changes is the baseline score, and it does so by producing
//! a new versioned record that the provider writes back in one replace.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::pipeline::estimators::ParamGrid;
use crate::pipeline::outliers::OutlierPolicy;
use crate::pipeline::store::write_atomically;
use crate::pipeline::transform::PipelineShape;

/// Complete configuration for one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Monotonic record version, bumped every time the baseline advances
    #[serde(default = "default_version")]
    pub version: u64,
    /// Directory receiving the fitted preprocessor and the trained bundle
    pub artifacts_dir: PathBuf,
    #[serde(default = "default_preprocessor_file_name")]
    pub preprocessor_file_name: String,
    #[serde(default = "default_model_file_name")]
    pub model_file_name: String,
    /// Minimum score a model needs to be promoted
    pub base_model_score: f64,
    pub data_source: DataSourceConfig,
    #[serde(default)]
    pub split: SplitConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub drift: DriftConfig,
    #[serde(default)]
    pub model_utils: SearchConfig,
    /// Candidate models, tuned in this order
    pub train_model: Vec<ModelSpec>,
    #[serde(default)]
    pub transform: TransformConfig,
    pub schema: Schema,
}

/// Where the raw dataset lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub source_id: String,
}

/// Train/test split settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_random_state")]
    pub random_state: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: default_test_size(),
            random_state: default_random_state(),
        }
    }
}

/// Remote storage destination for promoted artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub bucket: String,
}

/// Dataset drift detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Significance level of the per-feature tests
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Share of drifted features at which the whole dataset counts as drifted
    #[serde(default = "default_drift_share")]
    pub drift_share: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alpha: default_alpha(),
            drift_share: default_drift_share(),
        }
    }
}

/// Grid search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of cross-validation folds
    #[serde(default = "default_cv")]
    pub cv: usize,
    /// 1 evaluates candidates sequentially, anything else uses the rayon pool
    #[serde(default = "default_n_jobs")]
    pub n_jobs: i32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cv: default_cv(),
            n_jobs: default_n_jobs(),
        }
    }
}

/// One candidate model and its hyperparameter grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    #[serde(default)]
    pub params: ParamGrid,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: ParamGrid::new(),
        }
    }
}

/// Feature transformation strategy selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    #[serde(default)]
    pub outlier_policy: OutlierPolicy,
    #[serde(default)]
    pub pipeline_shape: PipelineShape,
    /// Numerical columns with at least this many distinct training values are continuous
    #[serde(default = "default_continuous_min_unique")]
    pub continuous_min_unique: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            outlier_policy: OutlierPolicy::default(),
            pipeline_shape: PipelineShape::default(),
            continuous_min_unique: default_continuous_min_unique(),
        }
    }
}

/// Expected dataset layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// All columns expected after `drop_columns` are removed, target included
    pub columns: Vec<String>,
    pub numerical_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    #[serde(default)]
    pub drop_columns: Vec<String>,
    pub target_column: String,
    #[serde(default)]
    pub onehot_columns: Vec<String>,
    #[serde(default)]
    pub binary_columns: Vec<String>,
    #[serde(default)]
    pub power_columns: Vec<String>,
}

impl Configuration {
    /// Read a configuration from a JSON file and validate it
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| PipelineError::Configuration {
            message: format!("failed to read {}", path.display()),
            source: Some(e.into()),
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate a configuration document
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Configuration =
            serde_json::from_str(raw).map_err(|e| PipelineError::Configuration {
                message: "malformed configuration document".to_string(),
                source: Some(e.into()),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PipelineError::Configuration {
            message: "failed to serialize configuration".to_string(),
            source: Some(e.into()),
        })
    }

    pub fn preprocessor_path(&self) -> PathBuf {
        self.artifacts_dir.join(&self.preprocessor_file_name)
    }

    pub fn model_path(&self) -> PathBuf {
        self.artifacts_dir.join(&self.model_file_name)
    }

    /// New record with an advanced baseline score and the next version
    pub fn with_baseline(&self, score: f64) -> Self {
        Self {
            version: self.version + 1,
            base_model_score: score,
            ..self.clone()
        }
    }

    /// Check internal consistency of the settings
    pub fn validate(&self) -> Result<()> {
        if self.train_model.is_empty() {
            return Err(PipelineError::configuration(
                "train_model must list at least one model",
            ));
        }
        if !(self.split.test_size > 0.0 && self.split.test_size < 1.0) {
            return Err(PipelineError::configuration(format!(
                "split.test_size must be between 0 and 1, got {}",
                self.split.test_size
            )));
        }
        if self.model_utils.cv < 2 {
            return Err(PipelineError::configuration(format!(
                "model_utils.cv must be at least 2, got {}",
                self.model_utils.cv
            )));
        }
        if !self.base_model_score.is_finite() {
            return Err(PipelineError::configuration(
                "base_model_score must be a finite number",
            ));
        }
        if !(0.0..=1.0).contains(&self.drift.drift_share) {
            return Err(PipelineError::configuration(format!(
                "drift.drift_share must be between 0 and 1, got {}",
                self.drift.drift_share
            )));
        }
        self.schema.validate()
    }
}

impl Schema {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.columns.contains(&self.target_column) {
            return Err(PipelineError::configuration(format!(
                "target column '{}' is not listed in schema.columns",
                self.target_column
            )));
        }
        if self.numerical_columns.contains(&self.target_column)
            || self.categorical_columns.contains(&self.target_column)
        {
            return Err(PipelineError::configuration(format!(
                "target column '{}' must not be listed as a feature",
                self.target_column
            )));
        }
        for col in self.onehot_columns.iter().chain(self.binary_columns.iter()) {
            if !self.categorical_columns.contains(col) {
                return Err(PipelineError::configuration(format!(
                    "encoded column '{}' is not a categorical column",
                    col
                )));
            }
        }
        for col in &self.power_columns {
            if !self.numerical_columns.contains(col) {
                return Err(PipelineError::configuration(format!(
                    "power column '{}' is not a numerical column",
                    col
                )));
            }
        }
        Ok(())
    }
}

/// Loads the configuration at run start and persists advanced baselines
pub trait ConfigProvider {
    fn load(&self) -> Result<Configuration>;

    /// Replace the stored document with `config` in a single write
    fn persist(&self, config: &Configuration) -> Result<()>;
}

/// Configuration provider backed by a JSON file
#[derive(Debug, Clone)]
pub struct JsonConfigProvider {
    path: PathBuf,
}

impl JsonConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigProvider for JsonConfigProvider {
    fn load(&self) -> Result<Configuration> {
        let config = Configuration::from_file(&self.path)?;
        info!(
            path = %self.path.display(),
            version = config.version,
            baseline = config.base_model_score,
            "Loaded configuration"
        );
        Ok(config)
    }

    fn persist(&self, config: &Configuration) -> Result<()> {
        // Refuse to overwrite a record that moved on since this run loaded it
        if self.path.exists() {
            let stored = Configuration::from_file(&self.path)?;
            if stored.version + 1 != config.version {
                return Err(PipelineError::configuration(format!(
                    "version conflict: stored version {} cannot be replaced by version {}",
                    stored.version, config.version
                )));
            }
        }

        let body = config.to_json()?;
        write_atomically(&self.path, body.as_bytes()).map_err(|e| {
            PipelineError::Configuration {
                message: format!("failed to write {}", self.path.display()),
                source: Some(e.into()),
            }
        })?;
        debug!(path = %self.path.display(), version = config.version, "Persisted configuration");
        Ok(())
    }
}

fn default_version() -> u64 {
    1
}

fn default_preprocessor_file_name() -> String {
    "preprocessor.json".to_string()
}

fn default_model_file_name() -> String {
    "model.json".to_string()
}

fn default_test_size() -> f64 {
    0.2
}

fn default_random_state() -> u64 {
    42
}

fn default_true() -> bool {
    true
}

fn default_alpha() -> f64 {
    0.05
}

fn default_drift_share() -> f64 {
    0.5
}

fn default_cv() -> usize {
    5
}

fn default_n_jobs() -> i32 {
    -1
}

fn default_continuous_min_unique() -> usize {
    25
}
