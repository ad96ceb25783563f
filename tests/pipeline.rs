use std::fs;

use pop_trends::clean::{CleanConfig, RawSheet, clean};
use pop_trends::model::{MODEL_FORMULA, all_groups};
use pop_trends::pipeline::{AnalysisConfig, run_analysis};
use pop_trends::simulate::{SimulateConfig, simulate, write_species_sheets};
use pop_trends::stomach::read_composition;
use pop_trends::transform::transform;
use pop_trends::types::{Contaminant, Predictor, Species};

#[test]
fn simulation_is_seeded() {
    let config = SimulateConfig::default();
    let a = simulate(&config).expect("simulate");
    let b = simulate(&config).expect("simulate");
    assert_eq!(a, b);
    assert_eq!(a.len(), 150);
    assert!(a.iter().all(|o| o.contaminants.len() == Contaminant::ALL.len()));
    assert!(a.iter().all(|o| o.contaminants.values().all(|v| *v >= 0.0)));

    let other = simulate(&SimulateConfig {
        seed: 2,
        ..SimulateConfig::default()
    })
    .expect("simulate");
    assert_ne!(a, other);
}

#[test]
fn recovers_a_known_declining_trend_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let observations = simulate(&SimulateConfig::default()).expect("simulate");
    let written = write_species_sheets(&observations, &dir.path().join("data")).expect("write");
    assert_eq!(written.len(), 3);

    let sheets = written
        .iter()
        .map(|(species, path)| RawSheet::read(*species, path))
        .collect::<anyhow::Result<Vec<_>>>()
        .expect("read sheets");
    let table = clean(&sheets, &CleanConfig::default()).expect("clean");
    assert_eq!(table.observations().len(), 150);
    assert_eq!(table.long_rows().len(), 150 * Contaminant::ALL.len());

    let transformed = transform(&table).expect("transform");
    let outcomes = all_groups(&transformed, None).expect("fit");
    assert_eq!(outcomes.len(), 18);
    for outcome in &outcomes {
        let group = outcome.fitted().expect("every group fits");
        assert_eq!(group.summary.n_used, 50);
        let effect = group.year_effect();
        assert!(
            (effect.estimate + 0.05).abs() < 0.02,
            "{}/{}: {}",
            group.species,
            group.variable,
            effect.estimate
        );
        assert!(effect.p_value < 0.05);
        assert!(group.slope(Predictor::FatPc) > 0.0);
    }
}

#[test]
fn run_analysis_writes_tables_plots_and_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let observations = simulate(&SimulateConfig {
        rows_per_species: 30,
        seed: 7,
        ..SimulateConfig::default()
    })
    .expect("simulate");
    let sheets = write_species_sheets(&observations, &dir.path().join("data")).expect("write");

    let stomach = dir.path().join("stomach.csv");
    fs::write(
        &stomach,
        "Species,Prey,Weight\nCod,Fish,30\nCod,Shrimp,10\nSaithe,Krill,5\nSaithe,Fish,15\nHaddock,Worms,\n",
    )
    .expect("write stomach table");

    let out_dir = dir.path().join("out");
    let mut config = AnalysisConfig::new(sheets, &out_dir);
    config.stomach = Some(stomach.clone());
    config.diagnostic_plots = true;
    config.cores = Some(2);
    config.log_name = "trend_run".to_string();

    let output = run_analysis(&config).expect("run");
    assert_eq!(output.outcomes.len(), 18);
    assert_eq!(output.fitted().count(), 18);
    assert_eq!(output.failed().count(), 0);

    assert!(out_dir.join("trend_run.log").exists());
    assert!(out_dir.join("Tables").join("cod_regression.tsv").exists());
    assert!(out_dir.join("Tables").join("saithe_regression.html").exists());
    assert!(out_dir.join("Tables").join("model_groups.tsv").exists());
    assert!(out_dir.join("Plots").join("trend_Cod_HCB.html").exists());
    assert!(out_dir.join("Plots").join("qq_Haddock_PBDE.html").exists());
    assert!(out_dir.join("Plots").join("stomach_composition.html").exists());
    assert!(output.plots.iter().all(|p| p.exists()));

    let log = fs::read_to_string(&output.log_path).expect("read log");
    assert!(log.contains(env!("CARGO_PKG_VERSION")));
    assert!(log.contains("Cod/HCB"));
    assert!(log.contains(MODEL_FORMULA));

    let composition = output.composition.expect("composition");
    assert_eq!(composition.species, vec![Species::Cod, Species::Saithe]);
    assert_eq!(composition.share(Species::Cod, "Fish"), Some(75.0));
    assert_eq!(composition.share(Species::Saithe, "Krill"), Some(25.0));
    assert_eq!(composition.share(Species::Cod, "Krill"), Some(0.0));

    let again = read_composition(&stomach).expect("read composition");
    assert_eq!(again, composition);
}

#[test]
fn invalid_configuration_is_rejected_before_any_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out_dir = dir.path().join("out");
    let missing = dir.path().join("missing.csv");
    let config = AnalysisConfig::new(vec![(Species::Cod, missing)], &out_dir);
    assert!(run_analysis(&config).is_err());
    assert!(!out_dir.exists());

    let observations = simulate(&SimulateConfig {
        rows_per_species: 10,
        ..SimulateConfig::default()
    })
    .expect("simulate");
    let sheets = write_species_sheets(&observations, &dir.path().join("data")).expect("write");
    let mut config = AnalysisConfig::new(sheets, &out_dir);
    config.style.alpha = 1.5;
    assert!(run_analysis(&config).is_err());
    assert!(!out_dir.exists());
}
