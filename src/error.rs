//! Error types for the training pipeline.
//!
//! Every stage maps the failures of the libraries it calls onto one of the
//! variants below. A failed schema or drift check is not an error: the
//! orchestrator reports it as an aborted run.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed cause attached to errors that wrap another failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised by the training pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration is missing, malformed, or inconsistent.
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The dataset source could not deliver the requested dataset.
    #[error("failed to fetch dataset '{source_id}': {message}")]
    DataSource {
        source_id: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A dataframe operation failed.
    #[error("dataset error: {0}")]
    Data(#[from] polars::error::PolarsError),

    /// Fitting or applying the preprocessing pipeline failed.
    #[error("transformation failed: {0}")]
    Transformation(String),

    /// A configured model tag has no constructor in the registry.
    #[error("unsupported model type '{0}'")]
    UnsupportedModel(String),

    /// Hyperparameter search or fitting failed for a model.
    #[error("tuning {model} failed: {message}")]
    Tuning { model: String, message: String },

    /// The best candidate did not reach the stored baseline score.
    #[error("no model found with score above the baseline: best {best:.4} < baseline {baseline:.4}")]
    NoQualifyingModel { best: f64, baseline: f64 },

    /// Reading, writing, or uploading an artifact failed.
    #[error("artifact error at {}: {message}", path.display())]
    Artifact {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl PipelineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        PipelineError::Configuration {
            message: message.into(),
            source: None,
        }
    }

    pub fn data_source(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::DataSource {
            source_id: source_id.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn transformation(message: impl Into<String>) -> Self {
        PipelineError::Transformation(message.into())
    }

    pub fn tuning(model: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Tuning {
            model: model.into(),
            message: message.into(),
        }
    }

    pub fn artifact<E>(path: impl Into<PathBuf>, message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        PipelineError::Artifact {
            path: path.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }
}
