use std::path::Path;

use crate::error::{Result, TrendError};

/// Checks that `value` lies strictly inside `(min, max)`.
pub fn check_open_interval(value: f64, min: f64, max: f64, name: &str) -> Result<()> {
    if !value.is_finite() {
        return Err(TrendError::InvalidArgument(format!(
            "Value of {name} should be finite"
        )));
    }
    if value <= min {
        return Err(TrendError::InvalidArgument(format!(
            "Value of {name} should be above {min}"
        )));
    }
    if value >= max {
        return Err(TrendError::InvalidArgument(format!(
            "Value of {name} should be below {max}"
        )));
    }
    Ok(())
}

pub fn check_positive(value: usize, name: &str) -> Result<()> {
    if value == 0 {
        return Err(TrendError::InvalidArgument(format!(
            "Value of {name} should be positive"
        )));
    }
    Ok(())
}

pub fn check_file_exists(path: &Path, name: &str) -> Result<()> {
    if !path.exists() {
        return Err(TrendError::InvalidArgument(format!(
            "File {path:?} passed to {name} does not exist"
        )));
    }
    Ok(())
}

/// Rejects values that cannot enter `log10(x + 1)`.
pub fn check_non_negative(value: f64, column: &str) -> Result<()> {
    if value.is_nan() || value < 0.0 {
        return Err(TrendError::NumericDomain {
            column: column.to_string(),
            value,
        });
    }
    Ok(())
}

/// Rejects values that cannot enter `log10(x)`.
pub fn check_strictly_positive(value: f64, column: &str) -> Result<()> {
    if value.is_nan() || value <= 0.0 {
        return Err(TrendError::NumericDomain {
            column: column.to_string(),
            value,
        });
    }
    Ok(())
}
