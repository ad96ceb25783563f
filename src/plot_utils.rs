use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use plotly::common::color::NamedColor;
use plotly::common::{DashType, Font, Line, Marker, Mode};
use plotly::layout::{Annotation, Axis, BarMode};
use plotly::{Bar, Layout, Plot, Scatter};

use crate::diagnostics::{GroupDiagnostics, Point};
use crate::model::ModelGroupResult;
use crate::report::ConditionalTrend;
use crate::stomach::Composition;

pub fn ensure_output_dirs(out_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let plots = out_dir.join("Plots");
    let tables = out_dir.join("Tables");
    fs::create_dir_all(&plots).context("create Plots directory")?;
    fs::create_dir_all(&tables).context("create Tables directory")?;
    Ok((plots, tables))
}

pub fn plot_path(dir: &Path, prefix: Option<&str>, name: &str) -> PathBuf {
    let file_name = match prefix {
        Some(pfx) => format!("{pfx}_{name}.html"),
        None => format!("{name}.html"),
    };
    dir.join(file_name)
}

fn xy(points: &[Point]) -> (Vec<f64>, Vec<f64>) {
    points.iter().map(|p| (p.x, p.y)).unzip()
}

fn finite_range(values: &[f64]) -> Option<(f64, f64)> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values.iter().filter(|v| v.is_finite()) {
        min = min.min(*v);
        max = max.max(*v);
    }
    (min.is_finite() && max.is_finite()).then_some((min, max))
}

fn add_horizontal_line(plot: &mut Plot, y: f64, x_min: f64, x_max: f64) {
    let line = Line::default()
        .color(NamedColor::DarkGray)
        .dash(DashType::Dash);
    let trace = Scatter::new(vec![x_min, x_max], vec![y, y])
        .mode(Mode::Lines)
        .line(line)
        .show_legend(false);
    plot.add_trace(trace);
}

fn scatter_plot(points: &[Point], name: &str) -> Plot {
    let (x, y) = xy(points);
    let mut plot = Plot::new();
    plot.add_trace(
        Scatter::new(x, y)
            .mode(Mode::Markers)
            .marker(Marker::default().size(6).color(NamedColor::SteelBlue))
            .name(name),
    );
    plot
}

/// Year partial residuals with the fitted trend and the coloured effect label.
pub fn write_trend_plot(trend: &ConditionalTrend, dir: &Path) -> Result<PathBuf> {
    let mut plot = Plot::new();
    plot.add_trace(
        Scatter::new(trend.years.clone(), trend.values.clone())
            .mode(Mode::Markers)
            .marker(Marker::default().size(6).color(NamedColor::Gray))
            .name("Partial residuals"),
    );
    plot.add_trace(
        Scatter::new(trend.line_x.to_vec(), trend.line_y.to_vec())
            .mode(Mode::Lines)
            .line(Line::default().color(NamedColor::Black).width(2.0))
            .name("Trend"),
    );
    let label = Annotation::new()
        .text(trend.annotation.text.clone())
        .x(0.02)
        .y(0.98)
        .x_ref("paper")
        .y_ref("paper")
        .show_arrow(false)
        .font(Font::new().size(14).color(trend.annotation.color.clone()));
    let layout = Layout::new()
        .title(format!("{} {}", trend.species, trend.variable))
        .x_axis(Axis::new().title("Year".to_string()))
        .y_axis(Axis::new().title(format!("log10({} + 1), partial", trend.variable)))
        .show_legend(false)
        .annotations(vec![label]);
    plot.set_layout(layout);
    let path = plot_path(
        dir,
        Some("trend"),
        &format!("{}_{}", trend.species, trend.variable),
    );
    plot.write_html(&path);
    Ok(path)
}

/// Residual, QQ, scale-location and response-distribution plots for a group.
pub fn write_diagnostic_plots(
    group: &ModelGroupResult,
    diag: &GroupDiagnostics,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    let tag = format!("{}_{}", group.species, group.variable);
    let mut written = Vec::new();

    let mut plot = scatter_plot(&diag.residual_vs_fitted, "Residuals");
    let (fx, _) = xy(&diag.residual_vs_fitted);
    if let Some((min, max)) = finite_range(&fx) {
        add_horizontal_line(&mut plot, 0.0, min, max);
    }
    plot.set_layout(
        Layout::new()
            .title(format!("Residuals vs fitted ({tag})"))
            .x_axis(Axis::new().title("Fitted".to_string()))
            .y_axis(Axis::new().title("Residual".to_string())),
    );
    let path = plot_path(dir, Some("resid_fitted"), &tag);
    plot.write_html(&path);
    written.push(path);

    for (predictor, points) in &diag.residual_vs_covariate {
        let mut plot = scatter_plot(points, "Residuals");
        let (px, _) = xy(points);
        if let Some((min, max)) = finite_range(&px) {
            add_horizontal_line(&mut plot, 0.0, min, max);
        }
        plot.set_layout(
            Layout::new()
                .title(format!("Residuals vs {} ({tag})", predictor.term()))
                .x_axis(Axis::new().title(predictor.label().to_string()))
                .y_axis(Axis::new().title("Residual".to_string())),
        );
        let path = plot_path(dir, Some(&format!("resid_{}", predictor.term())), &tag);
        plot.write_html(&path);
        written.push(path);
    }

    let mut plot = scatter_plot(&diag.qq, "Standardized residuals");
    let (qx, _) = xy(&diag.qq);
    if let Some((min, max)) = finite_range(&qx) {
        let (a, b) = diag.qq_line;
        plot.add_trace(
            Scatter::new(vec![min, max], vec![a + b * min, a + b * max])
                .mode(Mode::Lines)
                .line(Line::default().color(NamedColor::DarkGray).dash(DashType::Dash))
                .show_legend(false),
        );
    }
    plot.set_layout(
        Layout::new()
            .title(format!("Normal QQ ({tag})"))
            .x_axis(Axis::new().title("Theoretical quantile".to_string()))
            .y_axis(Axis::new().title("Standardized residual".to_string())),
    );
    let path = plot_path(dir, Some("qq"), &tag);
    plot.write_html(&path);
    written.push(path);

    let mut plot = scatter_plot(&diag.scale_location, "sqrt(|std. residual|)");
    plot.set_layout(
        Layout::new()
            .title(format!("Scale-location ({tag})"))
            .x_axis(Axis::new().title("Fitted".to_string()))
            .y_axis(Axis::new().title("sqrt(|standardized residual|)".to_string())),
    );
    let path = plot_path(dir, Some("scale_location"), &tag);
    plot.write_html(&path);
    written.push(path);

    let hist = &diag.response_histogram;
    let mids: Vec<f64> = hist.edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    let mut plot = Plot::new();
    plot.add_trace(Bar::new(mids, hist.density.clone()).name("Histogram"));
    let (dx, dy) = xy(&diag.response_density.points);
    plot.add_trace(
        Scatter::new(dx, dy)
            .mode(Mode::Lines)
            .line(Line::default().color(NamedColor::Black))
            .name("Kernel density"),
    );
    plot.set_layout(
        Layout::new()
            .title(format!("Response distribution ({tag})"))
            .x_axis(Axis::new().title(format!("log10({} + 1)", group.variable)))
            .y_axis(Axis::new().title("Density".to_string())),
    );
    let path = plot_path(dir, Some("response"), &tag);
    plot.write_html(&path);
    written.push(path);

    Ok(written)
}

/// Stacked bars of prey composition (% of stomach content weight) per species.
pub fn write_composition_plot(composition: &Composition, dir: &Path) -> Result<PathBuf> {
    let species: Vec<String> = composition.species.iter().map(|s| s.to_string()).collect();
    let mut plot = Plot::new();
    for (group, shares) in &composition.shares {
        plot.add_trace(Bar::new(species.clone(), shares.clone()).name(group.clone()));
    }
    plot.set_layout(
        Layout::new()
            .title("Stomach content composition".to_string())
            .bar_mode(BarMode::Stack)
            .y_axis(Axis::new().title("Share of prey weight (%)".to_string())),
    );
    let path = plot_path(dir, None, "stomach_composition");
    plot.write_html(&path);
    Ok(path)
}
