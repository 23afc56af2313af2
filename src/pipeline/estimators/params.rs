//! Hyperparameter values and grids

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// A single hyperparameter value as written in the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Candidate values per hyperparameter name
pub type ParamGrid = BTreeMap<String, Vec<ParamValue>>;

/// One concrete assignment of hyperparameters
pub type ParamSet = BTreeMap<String, ParamValue>;

impl ParamValue {
    pub fn as_f64(&self, model: &str, name: &str) -> Result<f64> {
        match self {
            ParamValue::Int(v) => Ok(*v as f64),
            ParamValue::Float(v) => Ok(*v),
            other => Err(ill_typed(model, name, "a number", other)),
        }
    }

    pub fn as_usize(&self, model: &str, name: &str) -> Result<usize> {
        match self {
            ParamValue::Int(v) if *v >= 0 => Ok(*v as usize),
            other => Err(ill_typed(model, name, "a non-negative integer", other)),
        }
    }

    /// `null` maps to `None`, anything else must be a non-negative integer
    pub fn as_opt_usize(&self, model: &str, name: &str) -> Result<Option<usize>> {
        match self {
            ParamValue::Null => Ok(None),
            other => other.as_usize(model, name).map(Some),
        }
    }

    pub fn as_bool(&self, model: &str, name: &str) -> Result<bool> {
        match self {
            ParamValue::Bool(v) => Ok(*v),
            other => Err(ill_typed(model, name, "a boolean", other)),
        }
    }

    pub fn as_str(&self, model: &str, name: &str) -> Result<&str> {
        match self {
            ParamValue::Text(v) => Ok(v.as_str()),
            other => Err(ill_typed(model, name, "a string", other)),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// Cartesian product of the grid in lexicographic parameter order.
///
/// Parameter names are visited in sorted order and the last name varies
/// fastest. An empty grid yields a single empty assignment.
pub fn expand_grid(grid: &ParamGrid) -> Vec<ParamSet> {
    let mut combos = vec![ParamSet::new()];
    for (name, values) in grid {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut extended = combo.clone();
                extended.insert(name.clone(), value.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

/// Render an assignment as `a=1, b=0.5` for logs and tables
pub fn format_params(params: &ParamSet) -> String {
    if params.is_empty() {
        return "defaults".to_string();
    }
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn unknown_param(model: &str, name: &str) -> PipelineError {
    PipelineError::tuning(model, format!("unknown hyperparameter '{}'", name))
}

fn ill_typed(model: &str, name: &str, expected: &str, got: &ParamValue) -> PipelineError {
    PipelineError::tuning(
        model,
        format!("hyperparameter '{}' must be {}, got {}", name, expected, got),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_values_parse() {
        let grid: ParamGrid =
            serde_json::from_str(r#"{"max_depth": [null, 3], "alpha": [0.5], "bootstrap": [true], "weights": ["distance"]}"#)
                .unwrap();
        assert_eq!(grid["max_depth"], vec![ParamValue::Null, ParamValue::Int(3)]);
        assert_eq!(grid["alpha"], vec![ParamValue::Float(0.5)]);
        assert_eq!(grid["bootstrap"], vec![ParamValue::Bool(true)]);
        assert_eq!(grid["weights"], vec![ParamValue::Text("distance".into())]);
    }

    #[test]
    fn test_expand_grid_order() {
        let mut grid = ParamGrid::new();
        grid.insert("b".into(), vec![1i64.into(), 2i64.into()]);
        grid.insert("a".into(), vec![0.1.into(), 0.2.into()]);

        let combos = expand_grid(&grid);
        let rendered: Vec<String> = combos.iter().map(format_params).collect();
        assert_eq!(
            rendered,
            vec!["a=0.1, b=1", "a=0.1, b=2", "a=0.2, b=1", "a=0.2, b=2"]
        );
    }

    #[test]
    fn test_empty_grid_is_single_default_assignment() {
        let combos = expand_grid(&ParamGrid::new());
        assert_eq!(combos.len(), 1);
        assert!(combos[0].is_empty());
        assert_eq!(format_params(&combos[0]), "defaults");
    }

    #[test]
    fn test_typed_accessors() {
        assert_eq!(ParamValue::Int(3).as_f64("Ridge", "alpha").unwrap(), 3.0);
        assert!(ParamValue::Int(-1).as_usize("KNN", "n_neighbors").is_err());
        assert_eq!(ParamValue::Null.as_opt_usize("Tree", "max_depth").unwrap(), None);
        assert!(ParamValue::Text("x".into()).as_bool("RF", "bootstrap").is_err());
    }
}
