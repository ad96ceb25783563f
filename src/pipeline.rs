//! End-to-end analysis run: clean, transform, fit, diagnose, report.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use polars::prelude::*;

use crate::clean::{CleanConfig, CleanedTable, LsiOverrides, RawSheet, clean};
use crate::diagnostics::diagnose;
use crate::io::{write_dataframe, write_text};
use crate::logging::{log_line, open_log_file, warn_line, write_session_info};
use crate::model::{GroupOutcome, MODEL_FORMULA, ModelGroupResult, all_groups};
use crate::plot_utils::{
    ensure_output_dirs, write_composition_plot, write_diagnostic_plots, write_trend_plot,
};
use crate::qc::{check_file_exists, check_open_interval, check_positive};
use crate::report::{SignificanceStyle, conditional_trend, summary_table, summary_table_html};
use crate::stomach::{Composition, read_composition};
use crate::transform::transform;
use crate::types::Species;

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub sheets: Vec<(Species, PathBuf)>,
    pub lsi_overrides: Option<PathBuf>,
    pub stomach: Option<PathBuf>,
    pub style: SignificanceStyle,
    pub cores: Option<usize>,
    pub out_dir: PathBuf,
    pub diagnostic_plots: bool,
    pub log_name: String,
}

impl AnalysisConfig {
    pub fn new(sheets: Vec<(Species, PathBuf)>, out_dir: impl Into<PathBuf>) -> Self {
        AnalysisConfig {
            sheets,
            lsi_overrides: None,
            stomach: None,
            style: SignificanceStyle::default(),
            cores: None,
            out_dir: out_dir.into(),
            diagnostic_plots: false,
            log_name: "pop_trends".to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sheets.is_empty() {
            anyhow::bail!("at least one species sheet is required");
        }
        for (i, (species, _)) in self.sheets.iter().enumerate() {
            if self.sheets[..i].iter().any(|(s, _)| s == species) {
                anyhow::bail!("species {species} was given more than one sheet");
            }
        }
        for (species, path) in &self.sheets {
            check_file_exists(path, &format!("the {species} sheet"))?;
        }
        if let Some(path) = &self.lsi_overrides {
            check_file_exists(path, "lsi_overrides")?;
        }
        if let Some(path) = &self.stomach {
            check_file_exists(path, "stomach")?;
        }
        check_open_interval(self.style.alpha, 0.0, 1.0, "alpha")?;
        if let Some(cores) = self.cores {
            check_positive(cores, "cores")?;
        }
        if self.log_name.trim().is_empty() {
            anyhow::bail!("log_name must not be empty");
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct AnalysisOutput {
    pub table: CleanedTable,
    pub outcomes: Vec<GroupOutcome>,
    pub composition: Option<Composition>,
    pub tables: Vec<PathBuf>,
    pub plots: Vec<PathBuf>,
    pub log_path: PathBuf,
}

impl AnalysisOutput {
    pub fn fitted(&self) -> impl Iterator<Item = &ModelGroupResult> {
        self.outcomes.iter().filter_map(GroupOutcome::fitted)
    }

    pub fn failed(&self) -> impl Iterator<Item = &GroupOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

pub fn run_analysis(config: &AnalysisConfig) -> Result<AnalysisOutput> {
    config.validate()?;
    let (plots_dir, tables_dir) = ensure_output_dirs(&config.out_dir)?;
    let log_path = config.out_dir.join(format!("{}.log", config.log_name));
    let mut log = open_log_file(&config.out_dir, &config.log_name)?;

    let mut inputs: Vec<(String, String)> = config
        .sheets
        .iter()
        .map(|(s, p)| (s.to_string(), p.display().to_string()))
        .collect();
    if let Some(p) = &config.lsi_overrides {
        inputs.push(("LSI overrides".to_string(), p.display().to_string()));
    }
    if let Some(p) = &config.stomach {
        inputs.push(("stomach contents".to_string(), p.display().to_string()));
    }
    inputs.push(("alpha".to_string(), config.style.alpha.to_string()));
    write_session_info(&mut log, &inputs)?;

    log_line(
        &mut log,
        &format!("Reading {} species sheet(s)", config.sheets.len()),
        true,
    )?;
    let sheets = config
        .sheets
        .iter()
        .map(|(species, path)| RawSheet::read(*species, path))
        .collect::<Result<Vec<_>>>()?;
    let lsi_overrides = match &config.lsi_overrides {
        Some(path) => LsiOverrides::read(path).context("read LSI override table")?,
        None => LsiOverrides::default(),
    };
    let clean_config = CleanConfig {
        lsi_overrides,
        ..CleanConfig::default()
    };
    let table = clean(&sheets, &clean_config)?;
    for line in table.report().lines() {
        log_line(&mut log, &line, false)?;
    }
    log_line(
        &mut log,
        &format!(
            "{} observation(s) kept after cleaning",
            table.observations().len()
        ),
        true,
    )?;

    let mut tables = Vec::new();
    let long_path = tables_dir.join("long_table.tsv");
    write_dataframe(&table.long_frame()?, &long_path)?;
    tables.push(long_path);

    let transformed = transform(&table)?;
    log_line(
        &mut log,
        &format!(
            "Fitting {} model group(s) of {MODEL_FORMULA} on {} long row(s)",
            Species::ALL.len() * crate::types::Contaminant::ALL.len(),
            transformed.rows().len()
        ),
        true,
    )?;
    let outcomes = all_groups(&transformed, config.cores)?;

    for outcome in &outcomes {
        match &outcome.result {
            Ok(group) => {
                let effect = group.year_effect();
                log_line(
                    &mut log,
                    &format!(
                        "{}/{}: n = {} ({} incomplete), year = {:.4} (p = {:.4}), adj. R2 = {:.3}",
                        group.species,
                        group.variable,
                        group.summary.n_used,
                        group.summary.n_incomplete(),
                        effect.estimate,
                        effect.p_value,
                        group.summary.adj_r_squared
                    ),
                    false,
                )?;
            }
            Err(err) if err.is_group_local() => {
                warn_line(&mut log, &format!("Skipping group: {err}"))?;
            }
            Err(err) => {
                anyhow::bail!("{}/{}: {err}", outcome.species, outcome.variable);
            }
        }
    }

    tables.push(write_group_overview(&outcomes, &tables_dir)?);

    let mut plots = Vec::new();
    for species in Species::ALL {
        let groups: Vec<&ModelGroupResult> = outcomes
            .iter()
            .filter(|o| o.species == species)
            .filter_map(GroupOutcome::fitted)
            .collect();
        if groups.is_empty() {
            continue;
        }
        let stem = species.name().to_lowercase();
        let tsv = tables_dir.join(format!("{stem}_regression.tsv"));
        write_dataframe(&summary_table(&groups)?, &tsv)?;
        let html = tables_dir.join(format!("{stem}_regression.html"));
        write_text(&summary_table_html(species, &groups, &config.style), &html)?;
        tables.push(tsv);
        tables.push(html);

        for group in &groups {
            let trend = conditional_trend(group, &config.style);
            plots.push(write_trend_plot(&trend, &plots_dir)?);
            if config.diagnostic_plots {
                let diag = diagnose(group);
                plots.extend(write_diagnostic_plots(group, &diag, &plots_dir)?);
            }
        }
    }

    let composition = match &config.stomach {
        Some(path) => {
            let composition = read_composition(path)?;
            plots.push(write_composition_plot(&composition, &plots_dir)?);
            let out = tables_dir.join("stomach_composition.tsv");
            write_dataframe(&composition.to_frame()?, &out)?;
            tables.push(out);
            Some(composition)
        }
        None => None,
    };

    log_line(
        &mut log,
        &format!(
            "Wrote {} table(s) and {} plot(s) to {}",
            tables.len(),
            plots.len(),
            config.out_dir.display()
        ),
        true,
    )?;

    Ok(AnalysisOutput {
        table,
        outcomes,
        composition,
        tables,
        plots,
        log_path,
    })
}

/// Status of every model group, fitted or not.
fn write_group_overview(outcomes: &[GroupOutcome], dir: &Path) -> Result<PathBuf> {
    let species: Vec<&str> = outcomes.iter().map(|o| o.species.name()).collect();
    let variable: Vec<&str> = outcomes.iter().map(|o| o.variable.name()).collect();
    let status: Vec<String> = outcomes
        .iter()
        .map(|o| match &o.result {
            Ok(_) => "fitted".to_string(),
            Err(err) => err.to_string(),
        })
        .collect();
    let n_used: Vec<Option<u32>> = outcomes
        .iter()
        .map(|o| o.fitted().map(|g| g.summary.n_used as u32))
        .collect();
    let n_raw: Vec<Option<u32>> = outcomes
        .iter()
        .map(|o| o.fitted().map(|g| g.summary.n_raw as u32))
        .collect();
    let df = DataFrame::from_iter([
        Column::new("species".into(), species),
        Column::new("variable".into(), variable),
        Column::new("status".into(), status),
        Column::new("n_used".into(), n_used),
        Column::new("n_raw".into(), n_raw),
    ]);
    let path = dir.join("model_groups.tsv");
    write_dataframe(&df, &path)?;
    Ok(path)
}
