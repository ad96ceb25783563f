//! Per-group ordinary least squares.
//!
//! Every (species, contaminant) pair is fitted independently as
//! `value ~ year + length_cm + fat_pc + lsi_pc` on the transformed table.

use std::fmt;

use ndarray::{Array1, Array2, Axis};
use ndarray_linalg::Inverse;
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};
use tracing::{debug, warn};

use crate::error::{Result, TrendError};
use crate::matrix::{column_means, design_with_intercept, median, sum_of_squares_about_mean};
use crate::parallel::map_in_pool;
use crate::transform::{TransformedTable, annual_change};
use crate::types::{Contaminant, LongRow, Predictor, Species};

pub const MODEL_FORMULA: &str = "value ~ year + length_cm + fat_pc + lsi_pc";

/// Number of estimated coefficients, intercept included.
pub const N_PARAMS: usize = Predictor::ALL.len() + 1;

const SINGULAR_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    Intercept,
    Predictor(Predictor),
}

impl Term {
    pub const ALL: [Term; N_PARAMS] = [
        Term::Intercept,
        Term::Predictor(Predictor::Year),
        Term::Predictor(Predictor::LengthCm),
        Term::Predictor(Predictor::FatPc),
        Term::Predictor(Predictor::LsiPc),
    ];

    pub fn name(self) -> &'static str {
        match self {
            Term::Intercept => "(Intercept)",
            Term::Predictor(p) => p.term(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Coefficient {
    pub term: Term,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub r_squared: f64,
    pub adj_r_squared: f64,
    /// Residual standard error.
    pub sigma: f64,
    pub f_statistic: f64,
    pub f_p_value: f64,
    pub df_model: usize,
    pub df_residual: usize,
    /// Rows entering the fit.
    pub n_used: usize,
    /// Long-table rows of the group before listwise deletion.
    pub n_raw: usize,
}

impl ModelSummary {
    pub fn n_incomplete(&self) -> usize {
        self.n_raw - self.n_used
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FittedObservation {
    pub sample_id: Option<String>,
    /// Predictor values in [`Predictor::ALL`] order, on the model scale.
    pub predictors: [f64; 4],
    pub observed: f64,
    pub fitted: f64,
    pub residual: f64,
    pub std_residual: f64,
    pub leverage: f64,
    /// `residual + b_j * (x_j - mean(x_j))` per predictor.
    pub partial: [f64; 4],
}

impl FittedObservation {
    pub fn predictor(&self, predictor: Predictor) -> f64 {
        self.predictors[predictor.index()]
    }

    pub fn partial_residual(&self, predictor: Predictor) -> f64 {
        self.partial[predictor.index()]
    }

    pub fn year(&self) -> f64 {
        self.predictor(Predictor::Year)
    }
}

/// Year effect on the reporting scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YearEffect {
    pub estimate: f64,
    pub p_value: f64,
    /// `10^estimate - 1`.
    pub annual_change: f64,
}

impl YearEffect {
    pub fn annual_change_pct(&self) -> f64 {
        self.annual_change * 100.0
    }
}

/// Immutable result of one fitted model group.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelGroupResult {
    pub species: Species,
    pub variable: Contaminant,
    pub coefficients: Vec<Coefficient>,
    pub summary: ModelSummary,
    pub observations: Vec<FittedObservation>,
    /// Variance inflation factor per predictor, [`Predictor::ALL`] order.
    pub vif: [f64; 4],
    pub means: [f64; 4],
    pub medians: [f64; 4],
}

impl ModelGroupResult {
    pub fn coefficient(&self, term: Term) -> &Coefficient {
        let idx = Term::ALL
            .iter()
            .position(|t| *t == term)
            .unwrap_or_default();
        &self.coefficients[idx]
    }

    pub fn intercept(&self) -> f64 {
        self.coefficient(Term::Intercept).estimate
    }

    pub fn slope(&self, predictor: Predictor) -> f64 {
        self.coefficient(Term::Predictor(predictor)).estimate
    }

    pub fn year_effect(&self) -> YearEffect {
        let c = self.coefficient(Term::Predictor(Predictor::Year));
        YearEffect {
            estimate: c.estimate,
            p_value: c.p_value,
            annual_change: annual_change(c.estimate),
        }
    }

    pub fn vif(&self, predictor: Predictor) -> f64 {
        self.vif[predictor.index()]
    }

    pub fn median(&self, predictor: Predictor) -> f64 {
        self.medians[predictor.index()]
    }
}

/// Outcome of one group in a batch fit; failures stay local to the group.
#[derive(Debug)]
pub struct GroupOutcome {
    pub species: Species,
    pub variable: Contaminant,
    pub result: Result<ModelGroupResult>,
}

impl GroupOutcome {
    pub fn fitted(&self) -> Option<&ModelGroupResult> {
        self.result.as_ref().ok()
    }
}

struct OlsFit {
    beta: Array1<f64>,
    /// `(X'X)^-1`.
    xtx_inv: Array2<f64>,
    fitted: Array1<f64>,
    residuals: Array1<f64>,
    rss: f64,
}

fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

/// Largest deviation of `a * b` from the identity.
fn identity_error(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    let product = a.dot(b);
    product
        .indexed_iter()
        .map(|((i, j), v)| if i == j { (v - 1.0).abs() } else { v.abs() })
        .fold(0.0, f64::max)
}

fn ols(x: &Array2<f64>, y: &Array1<f64>) -> Option<OlsFit> {
    let xt = x.t();
    let xtx = xt.dot(x);
    let xtx_inv = xtx.inv().ok()?;
    // Numerically singular systems invert without error but lose the identity.
    if identity_error(&xtx, &xtx_inv) > SINGULAR_TOLERANCE {
        return None;
    }
    let beta = xtx_inv.dot(&xt.dot(y));
    if beta.iter().any(|b| !b.is_finite()) {
        return None;
    }
    let fitted = x.dot(&beta);
    let residuals = y - &fitted;
    let rss = residuals.iter().map(|e| e * e).sum();
    Some(OlsFit {
        beta,
        xtx_inv,
        fitted,
        residuals,
        rss,
    })
}

/// Fits one model group on the transformed table.
pub fn fit_group(
    table: &TransformedTable,
    species: Species,
    variable: Contaminant,
) -> Result<ModelGroupResult> {
    let rows: Vec<&LongRow> = table.group_rows(species, variable).collect();
    fit_rows(species, variable, &rows)
}

/// Fits one model group from its rows. Rows missing any predictor are
/// dropped here, for this group only.
pub fn fit_rows(
    species: Species,
    variable: Contaminant,
    rows: &[&LongRow],
) -> Result<ModelGroupResult> {
    let n_raw = rows.len();
    let complete: Vec<(&LongRow, [f64; 4])> = rows
        .iter()
        .filter(|r| r.value.is_finite())
        .filter_map(|r| r.predictors().map(|p| (*r, p)))
        .filter(|(_, p)| p.iter().all(|v| v.is_finite()))
        .collect();
    let n = complete.len();
    let required = N_PARAMS + 1;
    if n < required {
        return Err(TrendError::InsufficientData {
            species,
            variable,
            observations: n,
            required,
        });
    }
    if n < n_raw {
        debug!(
            "{species}/{variable}: {} of {n_raw} row(s) dropped for missing predictors",
            n_raw - n
        );
    }

    let columns: Vec<Vec<f64>> = Predictor::ALL
        .iter()
        .map(|p| complete.iter().map(|(_, x)| x[p.index()]).collect())
        .collect();
    if let Some(p) = Predictor::ALL
        .iter()
        .find(|p| is_constant(&columns[p.index()]))
    {
        debug!("{species}/{variable}: {p} is constant");
        return Err(TrendError::SingularDesign { species, variable });
    }
    let column_refs: Vec<&[f64]> = columns.iter().map(|c| c.as_slice()).collect();
    let x = design_with_intercept(&column_refs)
        .map_err(|e| TrendError::InvalidArgument(e.to_string()))?;
    let y = Array1::from_iter(complete.iter().map(|(r, _)| r.value));

    let fit = ols(&x, &y).ok_or(TrendError::SingularDesign { species, variable })?;

    let df_residual = n - N_PARAMS;
    let df_model = N_PARAMS - 1;
    let sigma2 = fit.rss / df_residual as f64;
    let sigma = sigma2.sqrt();

    let t_dist = StudentsT::new(0.0, 1.0, df_residual as f64)
        .map_err(|e| TrendError::InvalidArgument(e.to_string()))?;
    let coefficients: Vec<Coefficient> = Term::ALL
        .iter()
        .enumerate()
        .map(|(i, term)| {
            let estimate = fit.beta[i];
            let std_error = (sigma2 * fit.xtx_inv[(i, i)]).sqrt();
            let t_value = estimate / std_error;
            let p_value = if t_value.is_finite() {
                2.0 * t_dist.sf(t_value.abs())
            } else {
                f64::NAN
            };
            Coefficient {
                term: *term,
                estimate,
                std_error,
                t_value,
                p_value,
            }
        })
        .collect();

    let tss = sum_of_squares_about_mean(&y);
    let r_squared = 1.0 - fit.rss / tss;
    let adj_r_squared =
        1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / df_residual as f64;
    let f_statistic = ((tss - fit.rss) / df_model as f64) / sigma2;
    let f_p_value = FisherSnedecor::new(df_model as f64, df_residual as f64)
        .map(|d| d.sf(f_statistic))
        .unwrap_or(f64::NAN);

    let means_vec = column_means(&column_refs);
    let means: [f64; 4] = [means_vec[0], means_vec[1], means_vec[2], means_vec[3]];
    let medians: [f64; 4] = [
        median(&columns[0]),
        median(&columns[1]),
        median(&columns[2]),
        median(&columns[3]),
    ];
    let slopes: [f64; 4] = [fit.beta[1], fit.beta[2], fit.beta[3], fit.beta[4]];

    let leverage: Vec<f64> = x
        .axis_iter(Axis(0))
        .map(|row| row.dot(&fit.xtx_inv.dot(&row)))
        .collect();

    let observations = complete
        .iter()
        .enumerate()
        .map(|(i, (row, predictors))| {
            let residual = fit.residuals[i];
            let h = leverage[i];
            let std_residual = if h < 1.0 {
                residual / (sigma * (1.0 - h).sqrt())
            } else {
                f64::NAN
            };
            let mut partial = [0.0; 4];
            for (j, slot) in partial.iter_mut().enumerate() {
                *slot = residual + slopes[j] * (predictors[j] - means[j]);
            }
            FittedObservation {
                sample_id: row.sample_id.clone(),
                predictors: *predictors,
                observed: row.value,
                fitted: fit.fitted[i],
                residual,
                std_residual,
                leverage: h,
                partial,
            }
        })
        .collect();

    let vif = variance_inflation_factors(&columns);
    for (p, v) in Predictor::ALL.iter().zip(vif) {
        if v > 10.0 {
            warn!("{species}/{variable}: VIF for {p} is {v:.1}");
        }
    }

    Ok(ModelGroupResult {
        species,
        variable,
        coefficients,
        summary: ModelSummary {
            r_squared,
            adj_r_squared,
            sigma,
            f_statistic,
            f_p_value,
            df_model,
            df_residual,
            n_used: n,
            n_raw,
        },
        observations,
        vif,
        means,
        medians,
    })
}

/// VIF_j = 1 / (1 - R²_j), where R²_j comes from regressing predictor j on
/// the remaining predictors.
pub fn variance_inflation_factors(columns: &[Vec<f64>]) -> [f64; 4] {
    let mut out = [f64::NAN; 4];
    for (j, slot) in out.iter_mut().enumerate().take(columns.len()) {
        let others: Vec<&[f64]> = columns
            .iter()
            .enumerate()
            .filter(|(k, _)| *k != j)
            .map(|(_, c)| c.as_slice())
            .collect();
        let Ok(x) = design_with_intercept(&others) else {
            continue;
        };
        let y = Array1::from_vec(columns[j].clone());
        *slot = match ols(&x, &y) {
            Some(fit) => {
                let tss = sum_of_squares_about_mean(&y);
                let r2 = 1.0 - fit.rss / tss;
                if r2 >= 1.0 { f64::INFINITY } else { 1.0 / (1.0 - r2) }
            }
            None => f64::INFINITY,
        };
    }
    out
}

/// All groups in species-then-contaminant order. With `cores`, the groups
/// are fitted on a rayon pool; each group's failure stays in its outcome.
pub fn all_groups(table: &TransformedTable, cores: Option<usize>) -> anyhow::Result<Vec<GroupOutcome>> {
    let groups: Vec<(Species, Contaminant)> = Species::ALL
        .iter()
        .flat_map(|s| Contaminant::ALL.iter().map(move |c| (*s, *c)))
        .collect();
    map_in_pool(cores, &groups, |(species, variable)| GroupOutcome {
        species: *species,
        variable: *variable,
        result: fit_group(table, *species, *variable),
    })
}
