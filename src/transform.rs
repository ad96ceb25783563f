//! Variance-stabilising transforms applied before modelling.

use crate::clean::CleanedTable;
use crate::error::Result;
use crate::qc::{check_non_negative, check_strictly_positive};
use crate::types::{Contaminant, LongRow, Species};

/// `log10(x + 1)`; keeps zero concentrations at zero.
pub fn log10p1(x: f64) -> f64 {
    (x + 1.0).log10()
}

/// Inverse of [`log10p1`]: `10^y - 1`.
pub fn inv_log10p1(y: f64) -> f64 {
    10f64.powf(y) - 1.0
}

/// Relative annual change implied by a year coefficient on the
/// `log10(x + 1)` scale, as a fraction (`0.05` is +5 % per year).
pub fn annual_change(estimate: f64) -> f64 {
    10f64.powf(estimate) - 1.0
}

pub fn annual_change_pct(estimate: f64) -> f64 {
    annual_change(estimate) * 100.0
}

/// The long table with responses on the `log10(x + 1)` scale and length on
/// the `log10` scale. Read-only once built.
#[derive(Debug, Clone)]
pub struct TransformedTable {
    rows: Vec<LongRow>,
}

impl TransformedTable {
    /// Wraps rows that are already on the model scale.
    pub fn from_transformed_rows(rows: Vec<LongRow>) -> Self {
        TransformedTable { rows }
    }

    pub fn rows(&self) -> &[LongRow] {
        &self.rows
    }

    pub fn group_rows(
        &self,
        species: Species,
        variable: Contaminant,
    ) -> impl Iterator<Item = &LongRow> {
        self.rows
            .iter()
            .filter(move |r| r.species == species && r.variable == variable)
    }

    pub fn group_len(&self, species: Species, variable: Contaminant) -> usize {
        self.group_rows(species, variable).count()
    }
}

pub fn transform_row(row: &LongRow) -> Result<LongRow> {
    check_non_negative(row.value, row.variable.column())?;
    let length_cm = match row.length_cm {
        Some(length) => {
            check_strictly_positive(length, "length_cm")?;
            Some(length.log10())
        }
        None => None,
    };
    Ok(LongRow {
        length_cm,
        value: log10p1(row.value),
        ..row.clone()
    })
}

/// Applies the response and length transforms to every long row. Fails on
/// the first value outside the transform's domain.
pub fn transform(table: &CleanedTable) -> Result<TransformedTable> {
    let rows = table
        .long_rows()
        .iter()
        .map(transform_row)
        .collect::<Result<Vec<_>>>()?;
    Ok(TransformedTable { rows })
}
