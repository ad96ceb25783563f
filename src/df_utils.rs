use std::borrow::Cow;
use std::fmt;

use anyhow::Result;
use polars::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoercionKind {
    NotNumeric,
    NotInteger,
}

impl CoercionKind {
    fn describe(self) -> &'static str {
        match self {
            CoercionKind::NotNumeric => "non-numeric",
            CoercionKind::NotInteger => "non-integer",
        }
    }
}

/// A numeric column in which some values were unusable and were nulled.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionWarning {
    pub source: String,
    pub column: String,
    pub kind: CoercionKind,
    pub nulled: usize,
    pub examples: Vec<String>,
}

impl fmt::Display for CoercionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} value(s) in column {} of {} were set to missing (e.g. {})",
            self.nulled,
            self.kind.describe(),
            self.column,
            self.source,
            self.examples.join(", ")
        )
    }
}

const MAX_EXAMPLES: usize = 3;

/// Casts the named columns to `Float64`. Text tokens that do not parse become
/// null; a decimal comma is accepted.
pub fn coerce_numeric(
    mut df: DataFrame,
    cols: &[&str],
    source: &str,
) -> Result<(DataFrame, Vec<CoercionWarning>)> {
    let mut warnings = Vec::new();
    for col in cols {
        let Ok(column) = df.column(col) else {
            continue;
        };
        let series = column.as_materialized_series();
        if series.dtype() == &DataType::Float64 {
            continue;
        }
        let mut casted = if series.dtype() == &DataType::String {
            let text = series
                .str()?
                .apply(|v| v.map(|s| Cow::Owned(s.replace(',', "."))));
            let parsed = text.cast(&DataType::Float64)?;
            let examples: Vec<String> = text
                .into_iter()
                .zip(parsed.f64()?)
                .filter_map(|(raw, value)| match (raw, value) {
                    (Some(raw), None) => Some(raw.to_string()),
                    _ => None,
                })
                .collect();
            if !examples.is_empty() {
                warnings.push(CoercionWarning {
                    source: source.to_string(),
                    column: (*col).to_string(),
                    kind: CoercionKind::NotNumeric,
                    nulled: examples.len(),
                    examples: examples.into_iter().take(MAX_EXAMPLES).collect(),
                });
            }
            parsed
        } else {
            series.cast(&DataType::Float64)?
        };
        casted.rename((*col).into());
        df.with_column(Column::from(casted))?;
    }
    Ok((df, warnings))
}

/// Nulls values of an already numeric column that are not whole numbers.
pub fn null_non_integers(
    mut df: DataFrame,
    col: &str,
    source: &str,
) -> Result<(DataFrame, Option<CoercionWarning>)> {
    if df.column(col).is_err() {
        return Ok((df, None));
    }
    let mut examples = Vec::new();
    let values: Vec<Option<f64>> = f64_values(&df, col)?
        .into_iter()
        .map(|v| match v {
            Some(x) if x.fract() != 0.0 => {
                examples.push(x.to_string());
                None
            }
            other => other,
        })
        .collect();
    if examples.is_empty() {
        return Ok((df, None));
    }
    df.with_column(Column::new(col.into(), values))?;
    let warning = CoercionWarning {
        source: source.to_string(),
        column: col.to_string(),
        kind: CoercionKind::NotInteger,
        nulled: examples.len(),
        examples: examples.into_iter().take(MAX_EXAMPLES).collect(),
    };
    Ok((df, Some(warning)))
}

/// Column values as `f64`, with null and NaN both mapped to `None`.
pub fn f64_values(df: &DataFrame, col: &str) -> Result<Vec<Option<f64>>> {
    let series = df
        .column(col)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Like [`f64_values`], but an absent column yields all-missing values.
pub fn f64_values_or_missing(df: &DataFrame, col: &str) -> Result<Vec<Option<f64>>> {
    if df.column(col).is_err() {
        return Ok(vec![None; df.height()]);
    }
    f64_values(df, col)
}

pub fn str_values(df: &DataFrame, col: &str) -> Result<Vec<Option<String>>> {
    if df.column(col).is_err() {
        return Ok(vec![None; df.height()]);
    }
    let series = df
        .column(col)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string).filter(|s| !s.is_empty()))
        .collect())
}

/// Drops rows with a null or NaN in any of `cols`. Returns the removed count.
pub fn filter_missing_any(df: DataFrame, cols: &[&str]) -> Result<(DataFrame, usize)> {
    let before = df.height();
    let mut keep = vec![true; before];
    for col in cols {
        if df.column(col).is_err() {
            continue;
        }
        let column = df.column(col)?.as_materialized_series();
        let present: Vec<bool> = match column.dtype() {
            DataType::Float64 => column
                .f64()?
                .into_iter()
                .map(|v| v.is_some_and(|x| !x.is_nan()))
                .collect(),
            _ => column.is_not_null().into_iter().map(|v| v.unwrap_or(false)).collect(),
        };
        for (k, p) in keep.iter_mut().zip(present) {
            *k &= p;
        }
    }
    let mask: BooleanChunked = keep.into_iter().map(Some).collect();
    let df = df.filter(&mask)?;
    let removed = before.saturating_sub(df.height());
    Ok((df, removed))
}
