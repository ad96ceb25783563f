use pop_trends::diagnostics::{
    diagnose, histogram, kernel_density, plotting_positions, qq_points, sturges_bins,
};
use pop_trends::model::{ModelGroupResult, YearEffect, fit_group};
use pop_trends::report::{
    SignificanceStyle, TrendDirection, annotate, annotation_text, conditional_trend,
    covariate_baseline, format_p_value, summary_table, summary_table_html,
};
use pop_trends::transform::{TransformedTable, annual_change};
use pop_trends::types::{Contaminant, LongRow, Predictor, Species};

fn effect(estimate: f64, p_value: f64) -> YearEffect {
    YearEffect {
        estimate,
        p_value,
        annual_change: annual_change(estimate),
    }
}

fn fitted_group(variable: Contaminant) -> ModelGroupResult {
    let rows: Vec<LongRow> = (0..24)
        .map(|i| {
            let year = 2000 + (i % 12) as i32;
            let length = 1.65 + 0.01 * ((i * 5) % 9) as f64;
            let fat = 35.0 + ((i * 7) % 11) as f64;
            let lsi = 4.0 + 0.25 * ((i * 3) % 8) as f64;
            LongRow {
                sample_id: Some(format!("H{i}")),
                species: Species::Haddock,
                year,
                length_cm: Some(length),
                fat_pc: Some(fat),
                lsi_pc: Some(lsi),
                variable,
                value: 1.5 - 0.02 * (year - 2000) as f64 + 0.01 * fat + 0.04 * (i as f64).cos(),
            }
        })
        .collect();
    let table = TransformedTable::from_transformed_rows(rows);
    fit_group(&table, Species::Haddock, variable).expect("fit")
}

#[test]
fn significant_decrease_is_green() {
    let style = SignificanceStyle::default();
    let label = annotate(&effect(-0.05, 0.01), &style);
    assert_eq!(label.color, "green");
    assert_eq!(label.direction, TrendDirection::Decrease);
    assert_eq!(label.text, "-10.9 % per year, p = 0.010");
}

#[test]
fn non_significant_trend_is_black() {
    let style = SignificanceStyle::default();
    let label = annotate(&effect(0.03, 0.2), &style);
    assert_eq!(label.color, "black");
    assert_eq!(label.direction, TrendDirection::NotSignificant);
    assert_eq!(label.text, "+7.2 % per year, p = 0.200");
}

#[test]
fn significant_increase_is_red() {
    let style = SignificanceStyle::default();
    let label = annotate(&effect(0.10, 0.001), &style);
    assert_eq!(label.color, "red");
    assert_eq!(label.direction, TrendDirection::Increase);
    assert!(label.text.starts_with("+25.9 % per year"));
}

#[test]
fn threshold_and_colours_are_configurable() {
    let style = SignificanceStyle {
        alpha: 0.01,
        decrease_color: "blue".to_string(),
        ..SignificanceStyle::default()
    };
    assert_eq!(style.label_color(-0.05, 0.02), "black");
    assert_eq!(style.label_color(-0.05, 0.005), "blue");
}

#[test]
fn small_p_values_are_bounded() {
    assert_eq!(format_p_value(1e-6), "p < 0.001");
    assert_eq!(format_p_value(0.0421), "p = 0.042");
    assert_eq!(format_p_value(f64::NAN), "p = NA");
    assert_eq!(
        annotation_text(&effect(0.0, 0.5)),
        "+0.0 % per year, p = 0.500"
    );
}

#[test]
fn conditional_trend_adds_back_the_year_term() {
    let group = fitted_group(Contaminant::Hcb);
    let trend = conditional_trend(&group, &SignificanceStyle::default());
    let baseline = covariate_baseline(&group);
    let b_year = group.slope(Predictor::Year);
    assert_eq!(trend.values.len(), group.observations.len());
    for (obs, value) in group.observations.iter().zip(&trend.values) {
        assert!((value - (baseline + b_year * obs.year()) - obs.residual).abs() < 1e-10);
    }
    assert_eq!(trend.line_x, [2000.0, 2011.0]);
    assert!((trend.line_y[0] - (baseline + b_year * 2000.0)).abs() < 1e-10);
    assert_eq!(trend.annotation.color, "green");
}

#[test]
fn summary_table_has_one_row_per_term() {
    let hcb = fitted_group(Contaminant::Hcb);
    let ddt = fitted_group(Contaminant::Ddt);
    let df = summary_table(&[&hcb, &ddt]).expect("table");
    assert_eq!(df.height(), 10);
    assert_eq!(df.width(), 12);
    let html = summary_table_html(Species::Haddock, &[&hcb, &ddt], &SignificanceStyle::default());
    assert!(html.contains("Melanogrammus aeglefinus"));
    assert!(html.contains("<td>HCB</td>"));
    assert_eq!(html.matches("<tr><td>").count(), 2);
}

#[test]
fn plotting_positions_follow_the_small_sample_rule() {
    let small = plotting_positions(5);
    assert!((small[0] - 0.625 / 5.25).abs() < 1e-12);
    let large = plotting_positions(20);
    assert!((large[0] - 0.025).abs() < 1e-12);
    assert!((large[19] - 0.975).abs() < 1e-12);
}

#[test]
fn histogram_and_density_integrate_to_one() {
    let values: Vec<f64> = (0..50).map(|i| (i as f64 * 0.37).sin() + 0.01 * i as f64).collect();
    let bins = sturges_bins(values.len());
    assert_eq!(bins, 7);
    let hist = histogram(&values, bins);
    assert_eq!(hist.counts.iter().sum::<usize>(), 50);
    assert_eq!(hist.edges.len(), bins + 1);
    let width = hist.edges[1] - hist.edges[0];
    let area: f64 = hist.density.iter().map(|d| d * width).sum();
    assert!((area - 1.0).abs() < 1e-9);

    let curve = kernel_density(&values, 256);
    let step = curve.points[1].x - curve.points[0].x;
    let area: f64 = curve.points.iter().map(|p| p.y * step).sum();
    assert!((area - 1.0).abs() < 0.02, "area {area}");
}

#[test]
fn diagnostics_describe_every_fitted_row() {
    let group = fitted_group(Contaminant::Pbde);
    let diag = diagnose(&group);
    let n = group.summary.n_used;
    assert_eq!(diag.residual_vs_fitted.len(), n);
    assert_eq!(diag.qq.len(), n);
    assert_eq!(diag.scale_location.len(), n);
    assert_eq!(diag.residual_vs_covariate.len(), 4);
    assert_eq!(diag.vif.len(), 4);
    assert!(diag.qq.windows(2).all(|w| w[0].x < w[1].x && w[0].y <= w[1].y));
    assert!(diag.scale_location.iter().all(|p| p.y >= 0.0));

    let qq = qq_points(&[0.3, -1.0, 2.0]);
    assert_eq!(qq[0].y, -1.0);
    assert!(qq[0].x < 0.0 && qq[2].x > 0.0);
}
