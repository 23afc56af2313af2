//! Column extraction helpers shared by validation and transformation

use polars::prelude::*;

use crate::error::{PipelineError, Result};

/// Names of all columns in the frame, in order
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}

/// Whether the column holds numbers
pub fn is_numeric(df: &DataFrame, name: &str) -> bool {
    df.column(name)
        .map(|c| c.dtype().is_primitive_numeric() || matches!(c.dtype(), DataType::Boolean))
        .unwrap_or(false)
}

/// Values of a column cast to `f64`. Nulls and NaN both come back as `None`.
pub fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name).map_err(|_| missing_column(name))?;
    let dtype = column.dtype();
    if !(dtype.is_primitive_numeric() || matches!(dtype, DataType::Boolean | DataType::Null)) {
        return Err(PipelineError::transformation(format!(
            "column '{}' of type {} is not numeric",
            name, dtype
        )));
    }
    let cast = column.cast(&DataType::Float64)?;
    Ok(cast
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Values of a column rendered as strings, nulls preserved as `None`
pub fn category_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(name).map_err(|_| missing_column(name))?;
    let cast = column.cast(&DataType::String)?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect())
}

/// Replace (or add) a Float64 column with the given values
pub fn replace_numeric(df: &mut DataFrame, name: &str, values: Vec<Option<f64>>) -> Result<()> {
    let series = Series::new(name.into(), values);
    df.with_column(series)?;
    Ok(())
}

fn missing_column(name: &str) -> PipelineError {
    PipelineError::transformation(format!("column '{}' not found", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_values_casts_integers() {
        let df = df! {
            "a" => [Some(1i32), None, Some(3)],
        }
        .unwrap();
        assert_eq!(numeric_values(&df, "a").unwrap(), vec![Some(1.0), None, Some(3.0)]);
    }

    #[test]
    fn test_numeric_values_treats_nan_as_missing() {
        let df = df! {
            "income" => [Some(1.5), Some(f64::NAN), None, Some(2.5)],
        }
        .unwrap();
        assert_eq!(
            numeric_values(&df, "income").unwrap(),
            vec![Some(1.5), None, None, Some(2.5)]
        );
    }

    #[test]
    fn test_category_values_renders_numbers() {
        let df = df! {
            "tier" => [1i64, 2, 3],
        }
        .unwrap();
        let values = category_values(&df, "tier").unwrap();
        assert_eq!(values, vec![Some("1".to_string()), Some("2".to_string()), Some("3".to_string())]);
    }

    #[test]
    fn test_string_column_is_not_numeric() {
        let df = df! {
            "gender" => ["Male", "Female"],
        }
        .unwrap();
        assert!(!is_numeric(&df, "gender"));
        assert!(numeric_values(&df, "gender").is_err());
    }
}
