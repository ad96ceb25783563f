use polars::prelude::*;
use pop_trends::clean::{CleanConfig, LsiOverride, LsiOverrides, RawSheet, clean};
use pop_trends::df_utils::CoercionKind;
use pop_trends::types::{Contaminant, Species};

fn cod_frame() -> DataFrame {
    DataFrame::from_iter([
        Column::new("Sample".into(), vec!["C1", "C2", "C3", "C4"]),
        Column::new("Year".into(), vec!["2001", "2002", "2003", "2004"]),
        Column::new("Length".into(), vec!["50", "55", "60", "62"]),
        Column::new(
            "Fat %".into(),
            vec![Some("40"), Some("45,5"), None, Some("41")],
        ),
        Column::new("LSI".into(), vec!["5", "6", "5", "6"]),
        Column::new(
            "HCB".into(),
            vec![Some("1.2"), Some("0,8"), Some("2.0"), Some("n.d.")],
        ),
        Column::new(
            "PCB7".into(),
            vec![Some("10"), Some("11"), None, Some("12")],
        ),
    ])
}

#[test]
fn cleaning_drops_incomplete_rows_and_counts_them() {
    let sheet = RawSheet::new(Species::Cod, "cod", cod_frame());
    let table = clean(&[sheet], &CleanConfig::default()).expect("clean");
    let report = &table.report().sheets[0];
    assert_eq!(report.rows_read, 4);
    assert_eq!(report.dropped_missing_required, 1);
    assert_eq!(report.rows_kept(), 3);
    assert_eq!(table.observations().len(), 3);

    let c2 = table
        .observations()
        .iter()
        .find(|o| o.sample_id.as_deref() == Some("C2"))
        .expect("C2 kept");
    assert!((c2.fat_pc.unwrap() - 45.5).abs() < 1e-12);
    assert!((c2.contaminants[&Contaminant::Hcb] - 0.8).abs() < 1e-12);
    assert_eq!(c2.year, 2002);
}

#[test]
fn unparseable_tokens_are_nulled_with_a_warning() {
    let sheet = RawSheet::new(Species::Cod, "cod", cod_frame());
    let table = clean(&[sheet], &CleanConfig::default()).expect("clean");
    let warnings = &table.report().sheets[0].coercion_warnings;
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].column, "hcb");
    assert_eq!(warnings[0].nulled, 1);
    assert_eq!(warnings[0].examples, vec!["n.d.".to_string()]);
    assert!(table.report().lines().iter().any(|l| l.contains("n.d.")));
}

#[test]
fn long_table_has_one_row_per_measured_value() {
    let sheet = RawSheet::new(Species::Cod, "cod", cod_frame());
    let table = clean(&[sheet], &CleanConfig::default()).expect("clean");
    let long = table.long_rows();
    // C1 and C2 carry HCB and PCB7, C4 only PCB7.
    assert_eq!(long.len(), 5);
    assert_eq!(table.long_count(Species::Cod, Contaminant::Hcb), 2);
    assert_eq!(table.long_count(Species::Cod, Contaminant::Pcb7), 3);
    assert_eq!(table.long_count(Species::Cod, Contaminant::Ddt), 0);

    let total: usize = Species::ALL
        .iter()
        .flat_map(|s| Contaminant::ALL.iter().map(move |c| (*s, *c)))
        .map(|(s, c)| table.long_count(s, c))
        .sum();
    assert_eq!(total, long.len());

    let frame = table.long_frame().expect("long frame");
    assert_eq!(frame.height(), 5);
}

#[test]
fn lsi_overrides_replace_values_and_report_unused_ids() {
    let sheet = RawSheet::new(Species::Cod, "cod", cod_frame());
    let config = CleanConfig {
        lsi_overrides: LsiOverrides::new(vec![
            LsiOverride {
                sample_id: "C2".to_string(),
                species: None,
                lsi_pc: 7.5,
            },
            LsiOverride {
                sample_id: "X9".to_string(),
                species: None,
                lsi_pc: 3.0,
            },
        ]),
        ..CleanConfig::default()
    };
    let table = clean(&[sheet], &config).expect("clean");
    let c2 = table
        .observations()
        .iter()
        .find(|o| o.sample_id.as_deref() == Some("C2"))
        .expect("C2 kept");
    assert_eq!(c2.lsi_pc, Some(7.5));

    let applied = &table.report().sheets[0].overrides_applied;
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].previous, Some(6.0));
    assert_eq!(table.report().unused_overrides, vec!["X9".to_string()]);
}

#[test]
fn override_table_accepts_header_synonyms() {
    let df = DataFrame::from_iter([
        Column::new("Fish ID".into(), vec!["C1", "C4"]),
        Column::new("LSI".into(), vec!["4,2", "5.1"]),
    ]);
    let overrides = LsiOverrides::from_frame(&df, "overrides").expect("overrides");
    assert_eq!(overrides.len(), 2);
    assert_eq!(overrides.get(Species::Cod, "C1"), Some(4.2));
    assert_eq!(overrides.get(Species::Saithe, "C4"), Some(5.1));
    assert_eq!(overrides.get(Species::Cod, "C2"), None);
}

fn numbered_sheet(species: Species) -> RawSheet {
    let df = DataFrame::from_iter([
        Column::new("sample_id".into(), vec!["1", "2", "3"]),
        Column::new("year".into(), vec!["2010", "2011", "2012"]),
        Column::new("length".into(), vec!["50", "52", "54"]),
        Column::new("fat".into(), vec!["40", "42", "44"]),
        Column::new("lsi".into(), vec!["5", "6", "7"]),
        Column::new("hcb".into(), vec!["1.0", "1.1", "1.2"]),
    ]);
    RawSheet::new(species, species.name(), df)
}

fn lsi_of(table: &pop_trends::clean::CleanedTable, species: Species, id: &str) -> Option<f64> {
    table
        .observations()
        .iter()
        .find(|o| o.species == species && o.sample_id.as_deref() == Some(id))
        .and_then(|o| o.lsi_pc)
}

#[test]
fn species_column_scopes_overrides_to_one_sheet() {
    let df = DataFrame::from_iter([
        Column::new("Species".into(), vec![Some("Cod"), None]),
        Column::new("Sample".into(), vec!["2", "3"]),
        Column::new("LSI".into(), vec!["60", "9.5"]),
    ]);
    let overrides = LsiOverrides::from_frame(&df, "overrides").expect("overrides");
    assert_eq!(overrides.entries()[0].species, Some(Species::Cod));
    assert_eq!(overrides.entries()[1].species, None);

    let config = CleanConfig {
        lsi_overrides: overrides,
        ..CleanConfig::default()
    };
    let sheets = [numbered_sheet(Species::Cod), numbered_sheet(Species::Haddock)];
    let err = clean(&sheets, &config).unwrap_err();
    // Sample 3 has no species and exists in both sheets.
    assert!(err.to_string().contains("sample 3"), "{err}");

    let config = CleanConfig {
        lsi_overrides: LsiOverrides::new(vec![LsiOverride {
            sample_id: "2".to_string(),
            species: Some(Species::Cod),
            lsi_pc: 60.0,
        }]),
        ..CleanConfig::default()
    };
    let table = clean(&sheets, &config).expect("clean");
    assert_eq!(lsi_of(&table, Species::Cod, "2"), Some(60.0));
    assert_eq!(lsi_of(&table, Species::Haddock, "2"), Some(6.0));
    assert!(table.report().sheets[1].overrides_applied.is_empty());
    assert!(table.report().unused_overrides.is_empty());
}

#[test]
fn unscoped_override_matching_two_sheets_is_rejected() {
    let config = CleanConfig {
        lsi_overrides: LsiOverrides::new(vec![LsiOverride {
            sample_id: "2".to_string(),
            species: None,
            lsi_pc: 60.0,
        }]),
        ..CleanConfig::default()
    };
    let sheets = [numbered_sheet(Species::Cod), numbered_sheet(Species::Haddock)];
    let err = clean(&sheets, &config).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Cod and Haddock"), "{message}");

    // The same entry is fine when only one sheet carries the id.
    let table = clean(&sheets[..1], &config).expect("clean");
    assert_eq!(lsi_of(&table, Species::Cod, "2"), Some(60.0));
}

#[test]
fn scoped_override_wins_over_unscoped_one() {
    let overrides = LsiOverrides::new(vec![
        LsiOverride {
            sample_id: "2".to_string(),
            species: None,
            lsi_pc: 8.0,
        },
        LsiOverride {
            sample_id: "2".to_string(),
            species: Some(Species::Haddock),
            lsi_pc: 9.0,
        },
    ]);
    assert_eq!(overrides.get(Species::Cod, "2"), Some(8.0));
    assert_eq!(overrides.get(Species::Haddock, "2"), Some(9.0));

    let config = CleanConfig {
        lsi_overrides: overrides,
        ..CleanConfig::default()
    };
    let sheets = [numbered_sheet(Species::Cod), numbered_sheet(Species::Haddock)];
    let table = clean(&sheets, &config).expect("clean");
    assert_eq!(lsi_of(&table, Species::Cod, "2"), Some(8.0));
    assert_eq!(lsi_of(&table, Species::Haddock, "2"), Some(9.0));
}

#[test]
fn missing_lsi_is_derived_from_weights() {
    let df = DataFrame::from_iter([
        Column::new("year".into(), vec!["2010", "2011"]),
        Column::new("length".into(), vec!["50", "52"]),
        Column::new("fat".into(), vec!["40", "42"]),
        Column::new("fish weight".into(), vec![Some("1000"), None]),
        Column::new("liver weight".into(), vec!["50", "60"]),
        Column::new("ddt".into(), vec!["3.0", "4.0"]),
    ]);
    let sheet = RawSheet::new(Species::Haddock, "haddock", df);
    let table = clean(&[sheet], &CleanConfig::default()).expect("clean");
    let report = &table.report().sheets[0];
    assert_eq!(report.lsi_derived, 1);
    // The second fish has no weight, hence no LSI, and is dropped.
    assert_eq!(report.dropped_missing_required, 1);
    assert_eq!(table.observations()[0].lsi_pc, Some(5.0));
}

#[test]
fn rows_labelled_with_another_species_are_dropped() {
    let df = DataFrame::from_iter([
        Column::new("Species".into(), vec![Some("Sei"), Some("hyse"), None]),
        Column::new("year".into(), vec!["2010", "2011", "2012"]),
        Column::new("length".into(), vec!["50", "52", "54"]),
        Column::new("fat".into(), vec!["40", "42", "44"]),
        Column::new("lsi".into(), vec!["5", "6", "7"]),
        Column::new("pbde".into(), vec!["0.3", "0.4", "0.5"]),
    ]);
    let sheet = RawSheet::new(Species::Saithe, "saithe", df);
    let table = clean(&[sheet], &CleanConfig::default()).expect("clean");
    assert_eq!(table.report().sheets[0].dropped_species_mismatch, 1);
    assert_eq!(table.observations().len(), 2);
    assert!(table.observations().iter().all(|o| o.species == Species::Saithe));
}

#[test]
fn sheets_from_several_species_are_concatenated() {
    let cod = RawSheet::new(Species::Cod, "cod", cod_frame());
    let haddock = RawSheet::new(Species::Haddock, "haddock", cod_frame());
    let table = clean(&[cod, haddock], &CleanConfig::default()).expect("clean");
    assert_eq!(table.observations().len(), 6);
    assert_eq!(table.species_present(), vec![Species::Cod, Species::Haddock]);
    assert_eq!(table.report().sheets.len(), 2);
}

#[test]
fn fractional_years_are_nulled_and_dropped() {
    let df = DataFrame::from_iter([
        Column::new("year".into(), vec!["2015", "2015.6", "2016,0"]),
        Column::new("length".into(), vec!["50", "52", "54"]),
        Column::new("fat".into(), vec!["40", "42", "44"]),
        Column::new("lsi".into(), vec!["5", "6", "7"]),
        Column::new("pcb7".into(), vec!["10", "11", "12"]),
    ]);
    let sheet = RawSheet::new(Species::Saithe, "saithe", df);
    let table = clean(&[sheet], &CleanConfig::default()).expect("clean");
    let report = &table.report().sheets[0];
    assert_eq!(report.dropped_missing_required, 1);
    let years: Vec<i32> = table.observations().iter().map(|o| o.year).collect();
    assert_eq!(years, vec![2015, 2016]);

    let warning = report
        .coercion_warnings
        .iter()
        .find(|w| w.column == "year")
        .expect("year warning");
    assert_eq!(warning.kind, CoercionKind::NotInteger);
    assert_eq!(warning.nulled, 1);
    assert_eq!(warning.examples, vec!["2015.6".to_string()]);
    assert!(warning.to_string().contains("non-integer"));
}
