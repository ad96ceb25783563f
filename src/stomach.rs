//! Stomach-content composition per species.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;
use tracing::warn;

use crate::df_utils::{coerce_numeric, f64_values, str_values};
use crate::io::read_table;
use crate::schema::{ColumnSchema, resolve_column_map};
use crate::types::Species;

/// Share of prey weight (%) by prey group, one value per entry of `species`.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub species: Vec<Species>,
    pub shares: Vec<(String, Vec<f64>)>,
}

impl Composition {
    pub fn share(&self, species: Species, prey_group: &str) -> Option<f64> {
        let idx = self.species.iter().position(|s| *s == species)?;
        self.shares
            .iter()
            .find(|(g, _)| g == prey_group)
            .map(|(_, v)| v[idx])
    }

    pub fn to_frame(&self) -> Result<DataFrame> {
        let mut columns = vec![Column::new(
            "species".into(),
            self.species.iter().map(|s| s.name()).collect::<Vec<_>>(),
        )];
        for (group, values) in &self.shares {
            columns.push(Column::new(group.as_str().into(), values.clone()));
        }
        Ok(DataFrame::from_iter(columns))
    }
}

pub fn read_composition(path: &Path) -> Result<Composition> {
    let df = read_table(path).context("read stomach-content table")?;
    composition_from_frame(&df, &path.display().to_string())
}

pub fn composition_from_frame(df: &DataFrame, source: &str) -> Result<Composition> {
    let headers: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let map = resolve_column_map(&headers, &ColumnSchema::stomach(), source)?;
    let species_col = &map.resolved["species"];
    let prey_col = &map.resolved["prey_group"];
    let weight_col = &map.resolved["weight"];

    let (df, coercion) = coerce_numeric(df.clone(), &[weight_col.as_str()], source)?;
    for w in &coercion {
        warn!("{w}");
    }
    let species = str_values(&df, species_col)?;
    let prey = str_values(&df, prey_col)?;
    let weight = f64_values(&df, weight_col)?;

    let mut totals: BTreeMap<(Species, String), f64> = BTreeMap::new();
    let mut skipped = 0usize;
    for ((s, p), w) in species.into_iter().zip(prey).zip(weight) {
        let (Some(s), Some(p), Some(w)) = (s, p, w) else {
            skipped += 1;
            continue;
        };
        let Ok(s) = s.parse::<Species>() else {
            skipped += 1;
            continue;
        };
        if w < 0.0 {
            skipped += 1;
            continue;
        }
        *totals.entry((s, p)).or_insert(0.0) += w;
    }
    if skipped > 0 {
        warn!("{source}: {skipped} stomach row(s) skipped (missing, unknown species, or negative weight)");
    }
    Ok(aggregate(&totals))
}

/// Converts summed prey weights to per-species percentages.
pub fn aggregate(totals: &BTreeMap<(Species, String), f64>) -> Composition {
    let species: Vec<Species> = Species::ALL
        .into_iter()
        .filter(|s| totals.keys().any(|(k, _)| k == s))
        .collect();
    let mut groups: Vec<String> = totals.keys().map(|(_, g)| g.clone()).collect();
    groups.sort();
    groups.dedup();

    let species_total: Vec<f64> = species
        .iter()
        .map(|s| {
            totals
                .iter()
                .filter(|((k, _), _)| k == s)
                .map(|(_, w)| *w)
                .sum()
        })
        .collect();

    let shares = groups
        .into_iter()
        .map(|g| {
            let values = species
                .iter()
                .zip(&species_total)
                .map(|(s, total)| {
                    let w = totals.get(&(*s, g.clone())).copied().unwrap_or(0.0);
                    if *total > 0.0 { 100.0 * w / total } else { 0.0 }
                })
                .collect();
            (g, values)
        })
        .collect();

    Composition { species, shares }
}
