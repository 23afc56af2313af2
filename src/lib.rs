//! Tourism: Model Training Pipeline
//!
//! A library for training tourism-package purchase models: ingest a dataset,
//! validate it against a schema and for drift, fit a preprocessing pipeline,
//! tune several regressors and promote the best one when it beats the stored
//! baseline score.

pub mod cli;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod utils;
