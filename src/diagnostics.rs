//! Assumption-check datasets for a fitted group.
//!
//! Everything here is a read-only view of a [`ModelGroupResult`]; the output
//! feeds visual inspection and carries no pass/fail decision.

use statrs::distribution::{Continuous, ContinuousCDF, Normal};

use crate::matrix::quantile;
use crate::model::ModelGroupResult;
use crate::types::Predictor;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// `bins + 1` edges.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
    /// Counts scaled so the bars integrate to one.
    pub density: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DensityCurve {
    pub bandwidth: f64,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupDiagnostics {
    pub residual_vs_fitted: Vec<Point>,
    pub residual_vs_covariate: Vec<(Predictor, Vec<Point>)>,
    /// Theoretical normal quantile (x) against sorted standardized residual (y).
    pub qq: Vec<Point>,
    /// Reference line through the first and third quartiles of the QQ pairs.
    pub qq_line: (f64, f64),
    pub response_histogram: Histogram,
    pub response_density: DensityCurve,
    /// Fitted value (x) against `sqrt(|standardized residual|)` (y).
    pub scale_location: Vec<Point>,
    pub vif: Vec<(Predictor, f64)>,
}

pub fn diagnose(group: &ModelGroupResult) -> GroupDiagnostics {
    let obs = &group.observations;

    let residual_vs_fitted = obs
        .iter()
        .map(|o| Point {
            x: o.fitted,
            y: o.residual,
        })
        .collect();

    let residual_vs_covariate = Predictor::ALL
        .iter()
        .map(|p| {
            let points = obs
                .iter()
                .map(|o| Point {
                    x: o.predictor(*p),
                    y: o.residual,
                })
                .collect();
            (*p, points)
        })
        .collect();

    let std_resid: Vec<f64> = obs.iter().map(|o| o.std_residual).collect();
    let qq = qq_points(&std_resid);
    let qq_line = qq_reference_line(&std_resid);

    let response: Vec<f64> = obs.iter().map(|o| o.observed).collect();
    let response_histogram = histogram(&response, sturges_bins(response.len()));
    let response_density = kernel_density(&response, 128);

    let scale_location = obs
        .iter()
        .map(|o| Point {
            x: o.fitted,
            y: o.std_residual.abs().sqrt(),
        })
        .collect();

    let vif = Predictor::ALL.iter().map(|p| (*p, group.vif(*p))).collect();

    GroupDiagnostics {
        residual_vs_fitted,
        residual_vs_covariate,
        qq,
        qq_line,
        response_histogram,
        response_density,
        scale_location,
        vif,
    }
}

/// Plotting positions `(i - a) / (n + 1 - 2a)` with `a = 3/8` for `n <= 10`
/// and `a = 1/2` otherwise.
pub fn plotting_positions(n: usize) -> Vec<f64> {
    let a = if n <= 10 { 0.375 } else { 0.5 };
    (1..=n)
        .map(|i| (i as f64 - a) / (n as f64 + 1.0 - 2.0 * a))
        .collect()
}

fn standard_normal() -> Normal {
    // Parameters are constant and valid.
    Normal::new(0.0, 1.0).unwrap()
}

pub fn qq_points(values: &[f64]) -> Vec<Point> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let normal = standard_normal();
    plotting_positions(sorted.len())
        .into_iter()
        .zip(sorted)
        .map(|(p, y)| Point {
            x: normal.inverse_cdf(p),
            y,
        })
        .collect()
}

/// Intercept and slope of the line through the quartile pairs.
pub fn qq_reference_line(values: &[f64]) -> (f64, f64) {
    let normal = standard_normal();
    let (x1, x2) = (normal.inverse_cdf(0.25), normal.inverse_cdf(0.75));
    let (y1, y2) = (quantile(values, 0.25), quantile(values, 0.75));
    let slope = (y2 - y1) / (x2 - x1);
    (y1 - slope * x1, slope)
}

pub fn sturges_bins(n: usize) -> usize {
    if n < 2 {
        return 1;
    }
    ((n as f64).log2().ceil() as usize) + 1
}

pub fn histogram(values: &[f64], bins: usize) -> Histogram {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let bins = bins.max(1);
    if finite.is_empty() {
        return Histogram {
            edges: Vec::new(),
            counts: Vec::new(),
            density: Vec::new(),
        };
    }
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let mut max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max <= min {
        max = min + 1.0;
    }
    let width = (max - min) / bins as f64;
    let edges: Vec<f64> = (0..=bins).map(|i| min + width * i as f64).collect();
    let mut counts = vec![0usize; bins];
    for v in &finite {
        let idx = (((v - min) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }
    let total = finite.len() as f64;
    let density = counts.iter().map(|c| *c as f64 / (total * width)).collect();
    Histogram {
        edges,
        counts,
        density,
    }
}

/// Silverman's rule-of-thumb bandwidth.
pub fn silverman_bandwidth(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if n < 2.0 {
        return 1.0;
    }
    let mean = values.iter().sum::<f64>() / n;
    let sd = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
    let iqr = (quantile(values, 0.75) - quantile(values, 0.25)) / 1.34;
    let spread = match (sd > 0.0, iqr > 0.0) {
        (true, true) => sd.min(iqr),
        (true, false) => sd,
        (false, true) => iqr,
        (false, false) => 1.0,
    };
    0.9 * spread * n.powf(-0.2)
}

/// Gaussian kernel density on an evenly spaced grid extending three
/// bandwidths beyond the data.
pub fn kernel_density(values: &[f64], grid: usize) -> DensityCurve {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || grid < 2 {
        return DensityCurve {
            bandwidth: f64::NAN,
            points: Vec::new(),
        };
    }
    let bw = silverman_bandwidth(&finite);
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min) - 3.0 * bw;
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max) + 3.0 * bw;
    let step = (max - min) / (grid - 1) as f64;
    let normal = standard_normal();
    let n = finite.len() as f64;
    let points = (0..grid)
        .map(|i| {
            let x = min + step * i as f64;
            let y = finite.iter().map(|v| normal.pdf((x - v) / bw)).sum::<f64>() / (n * bw);
            Point { x, y }
        })
        .collect();
    DensityCurve {
        bandwidth: bw,
        points,
    }
}
