//! Publication outputs: conditional partial-residual trends, annotation
//! labels, and regression summary tables.

use std::fmt::Write as _;

use anyhow::Result;
use polars::prelude::*;

use crate::model::{ModelGroupResult, Term, YearEffect};
use crate::types::{Predictor, Species};

pub const DEFAULT_ALPHA: f64 = 0.05;
pub const DEFAULT_DECREASE_COLOR: &str = "green";
pub const DEFAULT_INCREASE_COLOR: &str = "red";
pub const DEFAULT_NEUTRAL_COLOR: &str = "black";

/// Significance threshold and annotation colours. No correction for the
/// number of groups is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SignificanceStyle {
    pub alpha: f64,
    pub decrease_color: String,
    pub increase_color: String,
    pub neutral_color: String,
}

impl Default for SignificanceStyle {
    fn default() -> Self {
        SignificanceStyle {
            alpha: DEFAULT_ALPHA,
            decrease_color: DEFAULT_DECREASE_COLOR.to_string(),
            increase_color: DEFAULT_INCREASE_COLOR.to_string(),
            neutral_color: DEFAULT_NEUTRAL_COLOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Decrease,
    Increase,
    NotSignificant,
}

impl SignificanceStyle {
    pub fn is_significant(&self, p_value: f64) -> bool {
        p_value < self.alpha
    }

    pub fn classify(&self, estimate: f64, p_value: f64) -> TrendDirection {
        if !self.is_significant(p_value) {
            TrendDirection::NotSignificant
        } else if estimate < 0.0 {
            TrendDirection::Decrease
        } else if estimate > 0.0 {
            TrendDirection::Increase
        } else {
            TrendDirection::NotSignificant
        }
    }

    pub fn label_color(&self, estimate: f64, p_value: f64) -> &str {
        match self.classify(estimate, p_value) {
            TrendDirection::Decrease => &self.decrease_color,
            TrendDirection::Increase => &self.increase_color,
            TrendDirection::NotSignificant => &self.neutral_color,
        }
    }
}

pub fn format_p_value(p: f64) -> String {
    if p.is_nan() {
        "p = NA".to_string()
    } else if p < 0.001 {
        "p < 0.001".to_string()
    } else {
        format!("p = {p:.3}")
    }
}

/// e.g. `-4.9 % per year, p = 0.010`.
pub fn annotation_text(effect: &YearEffect) -> String {
    format!(
        "{:+.1} % per year, {}",
        effect.annual_change_pct(),
        format_p_value(effect.p_value)
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendAnnotation {
    pub text: String,
    pub color: String,
    pub direction: TrendDirection,
}

pub fn annotate(effect: &YearEffect, style: &SignificanceStyle) -> TrendAnnotation {
    TrendAnnotation {
        text: annotation_text(effect),
        color: style.label_color(effect.estimate, effect.p_value).to_string(),
        direction: style.classify(effect.estimate, effect.p_value),
    }
}

/// Year partial residuals evaluated at the group's covariate medians, with
/// the fitted trend line over the observed year range.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalTrend {
    pub species: Species,
    pub variable: crate::types::Contaminant,
    pub years: Vec<f64>,
    pub values: Vec<f64>,
    pub line_x: [f64; 2],
    pub line_y: [f64; 2],
    pub annotation: TrendAnnotation,
}

/// `b0 + sum_k b_k * median_k` over the non-year predictors.
pub fn covariate_baseline(group: &ModelGroupResult) -> f64 {
    Predictor::ALL
        .iter()
        .filter(|p| **p != Predictor::Year)
        .fold(group.intercept(), |acc, p| {
            acc + group.slope(*p) * group.median(*p)
        })
}

pub fn conditional_trend(group: &ModelGroupResult, style: &SignificanceStyle) -> ConditionalTrend {
    let baseline = covariate_baseline(group);
    let b_year = group.slope(Predictor::Year);
    let years: Vec<f64> = group.observations.iter().map(|o| o.year()).collect();
    let values = group
        .observations
        .iter()
        .map(|o| o.residual + baseline + b_year * o.year())
        .collect();
    let min = years.iter().copied().fold(f64::INFINITY, f64::min);
    let max = years.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    ConditionalTrend {
        species: group.species,
        variable: group.variable,
        line_x: [min, max],
        line_y: [baseline + b_year * min, baseline + b_year * max],
        years,
        values,
        annotation: annotate(&group.year_effect(), style),
    }
}

/// One row per (contaminant, term) for a species.
pub fn summary_table(groups: &[&ModelGroupResult]) -> Result<DataFrame> {
    let mut variable = Vec::new();
    let mut term = Vec::new();
    let mut estimate = Vec::new();
    let mut std_error = Vec::new();
    let mut t_value = Vec::new();
    let mut p_value = Vec::new();
    let mut change_pct = Vec::new();
    let mut vif = Vec::new();
    let mut adj_r2 = Vec::new();
    let mut f_stat = Vec::new();
    let mut f_p = Vec::new();
    let mut n_used = Vec::new();

    for group in groups {
        for c in &group.coefficients {
            variable.push(group.variable.name());
            term.push(c.term.name());
            estimate.push(c.estimate);
            std_error.push(c.std_error);
            t_value.push(c.t_value);
            p_value.push(c.p_value);
            change_pct.push(match c.term {
                Term::Predictor(Predictor::Year) => Some(group.year_effect().annual_change_pct()),
                _ => None,
            });
            vif.push(match c.term {
                Term::Predictor(p) => Some(group.vif(p)),
                Term::Intercept => None,
            });
            adj_r2.push(group.summary.adj_r_squared);
            f_stat.push(group.summary.f_statistic);
            f_p.push(group.summary.f_p_value);
            n_used.push(group.summary.n_used as u32);
        }
    }

    Ok(DataFrame::from_iter([
        Column::new("variable".into(), variable),
        Column::new("term".into(), term),
        Column::new("estimate".into(), estimate),
        Column::new("std_error".into(), std_error),
        Column::new("t_value".into(), t_value),
        Column::new("p_value".into(), p_value),
        Column::new("annual_change_pct".into(), change_pct),
        Column::new("vif".into(), vif),
        Column::new("adj_r_squared".into(), adj_r2),
        Column::new("f_statistic".into(), f_stat),
        Column::new("f_p_value".into(), f_p),
        Column::new("n".into(), n_used),
    ]))
}

/// HTML regression table for one species. Cells of terms with
/// `p >= alpha` are set in bold.
pub fn summary_table_html(
    species: Species,
    groups: &[&ModelGroupResult],
    style: &SignificanceStyle,
) -> String {
    let mut html = String::new();
    let _ = writeln!(
        html,
        "<table>\n<caption>{} (<i>{}</i>)</caption>",
        species,
        species.latin_name()
    );
    html.push_str("<thead><tr><th>Contaminant</th>");
    for term in Term::ALL {
        let _ = write!(html, "<th>{}</th>", term.name());
    }
    html.push_str("<th>Change (%/yr)</th><th>Adj. R²</th><th>F</th><th>n</th></tr></thead>\n<tbody>\n");
    for group in groups {
        let _ = write!(html, "<tr><td>{}</td>", group.variable);
        for c in &group.coefficients {
            let cell = format!("{:.3} ({})", c.estimate, format_p_value(c.p_value));
            if style.is_significant(c.p_value) {
                let _ = write!(html, "<td>{cell}</td>");
            } else {
                let _ = write!(html, "<td><b>{cell}</b></td>");
            }
        }
        let effect = group.year_effect();
        let _ = writeln!(
            html,
            "<td>{:+.2}</td><td>{:.3}</td><td>{:.2} ({})</td><td>{}</td></tr>",
            effect.annual_change_pct(),
            group.summary.adj_r_squared,
            group.summary.f_statistic,
            format_p_value(group.summary.f_p_value),
            group.summary.n_used
        );
    }
    html.push_str("</tbody>\n</table>\n");
    html
}
