//! Data loading and cleaning.
//!
//! Turns one raw table per species into a [`CleanedTable`]: headers resolved
//! through the declarative schema, numeric columns coerced, documented LSI
//! corrections applied, and incomplete rows dropped.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;
use tracing::{info, warn};

use crate::df_utils::{
    CoercionWarning, coerce_numeric, f64_values, f64_values_or_missing, filter_missing_any,
    null_non_integers, str_values,
};
use crate::error::TrendError;
use crate::io::read_table;
use crate::schema::{ColumnMap, ColumnSchema, resolve_column_map};
use crate::types::{Contaminant, LongRow, Observation, Species};

/// Fields a row must carry to enter any model. Species is implied by the sheet.
pub const REQUIRED_FIELDS: [&str; 4] = ["year", "length_cm", "fat_pc", "lsi_pc"];

/// One species' raw table as read from disk.
#[derive(Debug, Clone)]
pub struct RawSheet {
    pub species: Species,
    pub source: String,
    pub df: DataFrame,
}

impl RawSheet {
    pub fn new(species: Species, source: impl Into<String>, df: DataFrame) -> Self {
        RawSheet {
            species,
            source: source.into(),
            df,
        }
    }

    pub fn read(species: Species, path: &Path) -> Result<Self> {
        let df = read_table(path).with_context(|| format!("read {species} sheet"))?;
        Ok(RawSheet::new(species, path.display().to_string(), df))
    }
}

/// A manual LSI correction for one sample. Without a species the
/// correction applies to the sample id in whichever sheet carries it.
#[derive(Debug, Clone, PartialEq)]
pub struct LsiOverride {
    pub sample_id: String,
    pub species: Option<Species>,
    pub lsi_pc: f64,
}

impl LsiOverride {
    pub fn label(&self) -> String {
        match self.species {
            Some(species) => format!("{species}/{}", self.sample_id),
            None => self.sample_id.clone(),
        }
    }
}

/// Documented data-entry corrections to LSI, keyed by sample identifier.
///
/// These are fixed patches for known transcription errors, applied once
/// during cleaning. Nothing here detects outliers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LsiOverrides {
    entries: Vec<LsiOverride>,
}

impl LsiOverrides {
    pub fn new(entries: Vec<LsiOverride>) -> Self {
        LsiOverrides { entries }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let df = read_table(path)?;
        Self::from_frame(&df, &path.display().to_string())
    }

    /// Builds the table from a frame with `sample_id` and `lsi_pc` columns
    /// and an optional `species` column (header synonyms allowed).
    pub fn from_frame(df: &DataFrame, source: &str) -> Result<Self> {
        let headers: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let schema = ColumnSchema::standard();
        let ids_col = find_header(&headers, &schema, "sample_id").ok_or_else(|| {
            TrendError::schema(source, "LSI override table needs a sample_id column")
        })?;
        let lsi_col = find_header(&headers, &schema, "lsi_pc").ok_or_else(|| {
            TrendError::schema(source, "LSI override table needs an lsi_pc column")
        })?;
        let (df, _) = coerce_numeric(df.clone(), &[lsi_col.as_str()], source)?;
        let ids = str_values(&df, &ids_col)?;
        let values = f64_values(&df, &lsi_col)?;
        let species = match find_header(&headers, &schema, "species") {
            Some(col) => str_values(&df, &col)?
                .into_iter()
                .map(|label| label.map(|text| text.parse::<Species>()).transpose())
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| format!("species column of {source}"))?,
            None => vec![None; ids.len()],
        };
        let mut entries = Vec::with_capacity(ids.len());
        for ((id, value), species) in ids.into_iter().zip(values).zip(species) {
            match (id, value) {
                (Some(sample_id), Some(lsi_pc)) => entries.push(LsiOverride {
                    sample_id,
                    species,
                    lsi_pc,
                }),
                (id, _) => {
                    return Err(TrendError::InvalidArgument(format!(
                        "incomplete LSI override row for sample {:?} in {source}",
                        id
                    ))
                    .into());
                }
            }
        }
        Ok(LsiOverrides { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Corrected LSI for a sample of `species`. An entry naming the species
    /// wins over one without.
    pub fn get(&self, species: Species, sample_id: &str) -> Option<f64> {
        self.lookup(species, sample_id).map(|(_, e)| e.lsi_pc)
    }

    fn lookup(&self, species: Species, sample_id: &str) -> Option<(usize, &LsiOverride)> {
        let mut candidates = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.sample_id == sample_id);
        let scoped = candidates
            .clone()
            .find(|(_, e)| e.species == Some(species));
        scoped.or_else(|| candidates.find(|(_, e)| e.species.is_none()))
    }

    pub fn entries(&self) -> &[LsiOverride] {
        &self.entries
    }
}

fn find_header(headers: &[String], schema: &ColumnSchema, canonical: &str) -> Option<String> {
    let field = schema.field(canonical)?;
    field.patterns.iter().find_map(|pattern| {
        headers
            .iter()
            .find(|h| crate::schema::normalize_header(h) == *pattern)
            .cloned()
    })
}

#[derive(Debug, Clone)]
pub struct CleanConfig {
    pub schema: ColumnSchema,
    pub required: Vec<&'static str>,
    pub lsi_overrides: LsiOverrides,
}

impl Default for CleanConfig {
    fn default() -> Self {
        CleanConfig {
            schema: ColumnSchema::standard(),
            required: REQUIRED_FIELDS.to_vec(),
            lsi_overrides: LsiOverrides::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppliedOverride {
    /// Position of the entry in the override table.
    pub entry: usize,
    pub sample_id: String,
    pub species: Species,
    pub previous: Option<f64>,
    pub corrected: f64,
}

#[derive(Debug, Clone)]
pub struct SheetReport {
    pub species: Species,
    pub source: String,
    pub rows_read: usize,
    pub dropped_species_mismatch: usize,
    pub dropped_missing_required: usize,
    pub without_response: usize,
    pub lsi_derived: usize,
    pub schema_info: Vec<String>,
    pub schema_warnings: Vec<String>,
    pub coercion_warnings: Vec<CoercionWarning>,
    pub overrides_applied: Vec<AppliedOverride>,
}

impl SheetReport {
    pub fn rows_kept(&self) -> usize {
        self.rows_read - self.dropped_species_mismatch - self.dropped_missing_required
    }
}

#[derive(Debug, Clone, Default)]
pub struct CleaningReport {
    pub sheets: Vec<SheetReport>,
    /// Overrides that matched no sample in any sheet, as `species/id` or `id`.
    pub unused_overrides: Vec<String>,
}

impl CleaningReport {
    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        for sheet in &self.sheets {
            out.push(format!(
                "{} ({}): {} row(s) read, {} kept, {} dropped for missing required fields, {} dropped for species mismatch, {} without any contaminant value",
                sheet.species,
                sheet.source,
                sheet.rows_read,
                sheet.rows_kept(),
                sheet.dropped_missing_required,
                sheet.dropped_species_mismatch,
                sheet.without_response
            ));
            out.extend(sheet.schema_info.iter().cloned());
            out.extend(sheet.schema_warnings.iter().cloned());
            out.extend(sheet.coercion_warnings.iter().map(|w| w.to_string()));
            if sheet.lsi_derived > 0 {
                out.push(format!(
                    "{} LSI value(s) derived from liver and fish weight",
                    sheet.lsi_derived
                ));
            }
            for o in &sheet.overrides_applied {
                out.push(format!(
                    "LSI for sample {} ({}) corrected from {} to {}",
                    o.sample_id,
                    o.species,
                    o.previous
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "missing".to_string()),
                    o.corrected
                ));
            }
        }
        for id in &self.unused_overrides {
            out.push(format!("LSI override for sample {id} matched no row"));
        }
        out
    }
}

/// The canonical wide table: one [`Observation`] per sampled fish.
#[derive(Debug, Clone)]
pub struct CleanedTable {
    observations: Vec<Observation>,
    report: CleaningReport,
}

impl CleanedTable {
    pub fn from_observations(observations: Vec<Observation>) -> Self {
        CleanedTable {
            observations,
            report: CleaningReport::default(),
        }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn report(&self) -> &CleaningReport {
        &self.report
    }

    pub fn species_present(&self) -> Vec<Species> {
        let present: HashSet<Species> = self.observations.iter().map(|o| o.species).collect();
        Species::ALL
            .into_iter()
            .filter(|s| present.contains(s))
            .collect()
    }

    /// Unpivots contaminant values: one row per observation and measured
    /// contaminant, for observations with at least one main response.
    pub fn long_rows(&self) -> Vec<LongRow> {
        let mut rows = Vec::new();
        for obs in self.observations.iter().filter(|o| o.has_any_response()) {
            for (variable, value) in &obs.contaminants {
                rows.push(LongRow {
                    sample_id: obs.sample_id.clone(),
                    species: obs.species,
                    year: obs.year,
                    length_cm: obs.length_cm,
                    fat_pc: obs.fat_pc,
                    lsi_pc: obs.lsi_pc,
                    variable: *variable,
                    value: *value,
                });
            }
        }
        rows
    }

    /// Number of long rows for one model group.
    pub fn long_count(&self, species: Species, variable: Contaminant) -> usize {
        self.observations
            .iter()
            .filter(|o| o.species == species && o.contaminants.contains_key(&variable))
            .count()
    }

    pub fn wide_frame(&self) -> Result<DataFrame> {
        let obs = &self.observations;
        let mut columns: Vec<Column> = vec![
            Column::new(
                "sample_id".into(),
                obs.iter().map(|o| o.sample_id.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "species".into(),
                obs.iter().map(|o| o.species.name()).collect::<Vec<_>>(),
            ),
            Column::new("year".into(), obs.iter().map(|o| o.year).collect::<Vec<_>>()),
            Column::new(
                "length_cm".into(),
                obs.iter().map(|o| o.length_cm).collect::<Vec<_>>(),
            ),
            Column::new("fat_pc".into(), obs.iter().map(|o| o.fat_pc).collect::<Vec<_>>()),
            Column::new("lsi_pc".into(), obs.iter().map(|o| o.lsi_pc).collect::<Vec<_>>()),
            Column::new(
                "fish_weight_g".into(),
                obs.iter().map(|o| o.fish_weight_g).collect::<Vec<_>>(),
            ),
            Column::new(
                "liver_weight_g".into(),
                obs.iter().map(|o| o.liver_weight_g).collect::<Vec<_>>(),
            ),
            Column::new("age".into(), obs.iter().map(|o| o.age).collect::<Vec<_>>()),
        ];
        for contaminant in Contaminant::ALL {
            columns.push(Column::new(
                contaminant.column().into(),
                obs.iter()
                    .map(|o| o.contaminants.get(&contaminant).copied())
                    .collect::<Vec<_>>(),
            ));
        }
        Ok(DataFrame::from_iter(columns))
    }

    pub fn long_frame(&self) -> Result<DataFrame> {
        let rows = self.long_rows();
        let df = DataFrame::from_iter([
            Column::new(
                "sample_id".into(),
                rows.iter().map(|r| r.sample_id.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "species".into(),
                rows.iter().map(|r| r.species.name()).collect::<Vec<_>>(),
            ),
            Column::new("year".into(), rows.iter().map(|r| r.year).collect::<Vec<_>>()),
            Column::new(
                "length_cm".into(),
                rows.iter().map(|r| r.length_cm).collect::<Vec<_>>(),
            ),
            Column::new("fat_pc".into(), rows.iter().map(|r| r.fat_pc).collect::<Vec<_>>()),
            Column::new("lsi_pc".into(), rows.iter().map(|r| r.lsi_pc).collect::<Vec<_>>()),
            Column::new(
                "variable".into(),
                rows.iter().map(|r| r.variable.name()).collect::<Vec<_>>(),
            ),
            Column::new("value".into(), rows.iter().map(|r| r.value).collect::<Vec<_>>()),
        ]);
        Ok(df)
    }
}

pub fn clean(sheets: &[RawSheet], config: &CleanConfig) -> Result<CleanedTable> {
    let mut observations = Vec::new();
    let mut report = CleaningReport::default();
    let mut matched: BTreeMap<usize, BTreeSet<Species>> = BTreeMap::new();

    for sheet in sheets {
        let (obs, sheet_report) = clean_sheet(sheet, config)?;
        for o in &sheet_report.overrides_applied {
            matched.entry(o.entry).or_default().insert(o.species);
        }
        info!(
            "{}: kept {} of {} row(s)",
            sheet.species,
            sheet_report.rows_kept(),
            sheet_report.rows_read
        );
        observations.extend(obs);
        report.sheets.push(sheet_report);
    }

    for (i, entry) in config.lsi_overrides.entries().iter().enumerate() {
        match matched.get(&i) {
            None => {
                warn!("LSI override for sample {} matched no row", entry.label());
                report.unused_overrides.push(entry.label());
            }
            Some(species) if species.len() > 1 => {
                let names: Vec<&str> = species.iter().map(|s| s.name()).collect();
                return Err(TrendError::InvalidArgument(format!(
                    "LSI override for sample {} matches rows in {}; give the override a species",
                    entry.sample_id,
                    names.join(" and ")
                ))
                .into());
            }
            Some(_) => {}
        }
    }

    Ok(CleanedTable {
        observations,
        report,
    })
}

fn clean_sheet(sheet: &RawSheet, config: &CleanConfig) -> Result<(Vec<Observation>, SheetReport)> {
    let headers: Vec<String> = sheet
        .df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let map = resolve_column_map(&headers, &config.schema, &sheet.source)?;
    for msg in &map.warnings {
        warn!("{msg}");
    }

    let df = canonical_frame(&sheet.df, &map, &config.schema)?;
    let rows_read = df.height();

    let numeric: Vec<&str> = config
        .schema
        .fields
        .iter()
        .filter(|f| !f.identifier && map.has(f.canonical))
        .map(|f| f.canonical)
        .collect();
    let (df, mut coercion_warnings) = coerce_numeric(df, &numeric, &sheet.source)?;
    let (df, fractional_years) = null_non_integers(df, "year", &sheet.source)?;
    coercion_warnings.extend(fractional_years);
    for w in &coercion_warnings {
        warn!("{w}");
    }

    let (df, dropped_species_mismatch) = filter_species(df, sheet.species, &sheet.source)?;
    let (df, lsi_derived) = derive_lsi(df)?;
    let (df, overrides_applied) = apply_lsi_overrides(df, sheet.species, &config.lsi_overrides)?;
    let (df, dropped_missing_required) = filter_missing_any(df, &config.required)?;

    let observations = to_observations(&df, sheet.species)?;
    let without_response = observations
        .iter()
        .filter(|o| !o.has_any_response())
        .count();

    let report = SheetReport {
        species: sheet.species,
        source: sheet.source.clone(),
        rows_read,
        dropped_species_mismatch,
        dropped_missing_required,
        without_response,
        lsi_derived,
        schema_info: map.info,
        schema_warnings: map.warnings,
        coercion_warnings,
        overrides_applied,
    };
    Ok((observations, report))
}

/// Keeps only the resolved columns, renamed to their canonical names.
fn canonical_frame(df: &DataFrame, map: &ColumnMap, schema: &ColumnSchema) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(map.resolved.len());
    for field in &schema.fields {
        if let Some(original) = map.resolved.get(field.canonical) {
            let mut series = df.column(original)?.as_materialized_series().clone();
            series.rename(field.canonical.into());
            columns.push(series);
        }
    }
    Ok(DataFrame::from_iter(columns))
}

fn filter_species(df: DataFrame, species: Species, source: &str) -> Result<(DataFrame, usize)> {
    if df.column("species").is_err() {
        return Ok((df, 0));
    }
    let labels = str_values(&df, "species")?;
    let mask: BooleanChunked = labels
        .iter()
        .map(|label| match label {
            None => Some(true),
            Some(text) => Some(text.parse::<Species>().map(|s| s == species).unwrap_or(false)),
        })
        .collect();
    let before = df.height();
    let df = df.filter(&mask)?;
    let removed = before - df.height();
    if removed > 0 {
        warn!("{removed} row(s) in {source} are labelled with another species and were dropped");
    }
    Ok((df, removed))
}

/// Fills missing LSI as `100 * liver_weight_g / fish_weight_g` where both
/// weights are present.
fn derive_lsi(mut df: DataFrame) -> Result<(DataFrame, usize)> {
    if df.column("fish_weight_g").is_err() || df.column("liver_weight_g").is_err() {
        return Ok((df, 0));
    }
    let fish = f64_values(&df, "fish_weight_g")?;
    let liver = f64_values(&df, "liver_weight_g")?;
    let existing = f64_values_or_missing(&df, "lsi_pc")?;
    let mut derived = 0usize;
    let lsi: Vec<Option<f64>> = existing
        .into_iter()
        .zip(fish.into_iter().zip(liver))
        .map(|(lsi, (fish, liver))| match (lsi, fish, liver) {
            (Some(v), _, _) => Some(v),
            (None, Some(f), Some(l)) if f > 0.0 => {
                derived += 1;
                Some(100.0 * l / f)
            }
            _ => None,
        })
        .collect();
    df.with_column(Column::new("lsi_pc".into(), lsi))?;
    Ok((df, derived))
}

fn apply_lsi_overrides(
    mut df: DataFrame,
    species: Species,
    overrides: &LsiOverrides,
) -> Result<(DataFrame, Vec<AppliedOverride>)> {
    if overrides.is_empty() {
        return Ok((df, Vec::new()));
    }
    if df.column("sample_id").is_err() {
        warn!("{species}: no sample identifier column; LSI overrides cannot be applied");
        return Ok((df, Vec::new()));
    }
    let ids = str_values(&df, "sample_id")?;
    let mut lsi = f64_values_or_missing(&df, "lsi_pc")?;
    let mut applied = Vec::new();
    for (id, value) in ids.iter().zip(lsi.iter_mut()) {
        let Some(id) = id else { continue };
        if let Some((entry, o)) = overrides.lookup(species, id) {
            let corrected = o.lsi_pc;
            info!("{species}: LSI for sample {id} corrected to {corrected}");
            applied.push(AppliedOverride {
                entry,
                sample_id: id.clone(),
                species,
                previous: *value,
                corrected,
            });
            *value = Some(corrected);
        }
    }
    df.with_column(Column::new("lsi_pc".into(), lsi))?;
    Ok((df, applied))
}

fn to_observations(df: &DataFrame, species: Species) -> Result<Vec<Observation>> {
    let n = df.height();
    let ids = str_values(df, "sample_id")?;
    let year = f64_values(df, "year")?;
    let length = f64_values_or_missing(df, "length_cm")?;
    let fat = f64_values_or_missing(df, "fat_pc")?;
    let lsi = f64_values_or_missing(df, "lsi_pc")?;
    let fish_weight = f64_values_or_missing(df, "fish_weight_g")?;
    let liver_weight = f64_values_or_missing(df, "liver_weight_g")?;
    let age = f64_values_or_missing(df, "age")?;
    let mut contaminant_values: BTreeMap<Contaminant, Vec<Option<f64>>> = BTreeMap::new();
    for c in Contaminant::ALL {
        contaminant_values.insert(c, f64_values_or_missing(df, c.column())?);
    }

    let mut out = Vec::with_capacity(n);
    let mut skipped_year = 0usize;
    for i in 0..n {
        // Year can only be missing here when it was removed from the
        // required set; such rows cannot be placed in time.
        let Some(year) = year[i] else {
            skipped_year += 1;
            continue;
        };
        let contaminants = contaminant_values
            .iter()
            .filter_map(|(c, values)| values[i].map(|v| (*c, v)))
            .collect();
        out.push(Observation {
            sample_id: ids[i].clone(),
            species,
            year: year as i32,
            length_cm: length[i],
            fat_pc: fat[i],
            lsi_pc: lsi[i],
            fish_weight_g: fish_weight[i],
            liver_weight_g: liver_weight[i],
            age: age[i],
            contaminants,
        });
    }
    if skipped_year > 0 {
        warn!("{species}: {skipped_year} row(s) without a sampling year skipped");
    }
    Ok(out)
}
