//! Pipeline module - ingest, validate, transform, tune and promote

pub mod config;
pub mod drift;
pub mod estimators;
pub mod frame;
pub mod loader;
pub mod orchestrator;
pub mod outliers;
pub mod search;
pub mod selector;
pub mod store;
pub mod transform;
pub mod tuner;
pub mod validation;

pub use config::*;
pub use drift::*;
pub use estimators::{Estimator, ModelFamily, ModelRegistry, ParamGrid, ParamSet, ParamValue};
pub use loader::*;
pub use orchestrator::*;
pub use outliers::OutlierPolicy;
pub use search::*;
pub use selector::*;
pub use store::*;
pub use transform::*;
pub use tuner::*;
pub use validation::*;
