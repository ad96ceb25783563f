use anyhow::Result;
use ndarray::{Array1, Array2};

/// Builds an `n x (k + 1)` design matrix with a leading intercept column from
/// `k` predictor columns of equal length.
pub fn design_with_intercept(columns: &[&[f64]]) -> Result<Array2<f64>> {
    let n = columns.first().map(|c| c.len()).unwrap_or(0);
    for (j, col) in columns.iter().enumerate() {
        if col.len() != n {
            return Err(anyhow::anyhow!(
                "predictor column {j} length {} does not match {n}",
                col.len()
            ));
        }
    }
    let k = columns.len() + 1;
    let mut x = Array2::<f64>::ones((n, k));
    for (j, col) in columns.iter().enumerate() {
        for (i, value) in col.iter().enumerate() {
            x[(i, j + 1)] = *value;
        }
    }
    Ok(x)
}

pub fn column_means(columns: &[&[f64]]) -> Vec<f64> {
    columns.iter().map(|c| mean(c)).collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Linear-interpolated sample quantile (R type 7).
pub fn quantile(values: &[f64], p: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let w = pos - lo as f64;
        sorted[lo] * (1.0 - w) + sorted[hi] * w
    }
}

pub fn sum_of_squares_about_mean(y: &Array1<f64>) -> f64 {
    let m = y.mean().unwrap_or(f64::NAN);
    y.iter().map(|v| (v - m).powi(2)).sum()
}
