use pop_trends::error::TrendError;
use pop_trends::schema::{ColumnSchema, normalize_header, resolve_column_map};

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn normalizes_punctuation_and_case() {
    assert_eq!(normalize_header("  Length (cm) "), "length_cm");
    assert_eq!(normalize_header("Fat %"), "fat");
    assert_eq!(normalize_header("Fish-Weight__g"), "fish_weight_g");
    assert_eq!(normalize_header("ΣPCB7"), "σpcb7");
}

#[test]
fn resolves_synonyms_to_canonical_names() {
    let raw = headers(&["Prøvenr", "År", "Length (cm)", "Fat %", "LSI", "HCB", "ΣPCB7"]);
    let map = resolve_column_map(&raw, &ColumnSchema::standard(), "cod.csv").expect("resolve");
    assert_eq!(
        map.headers,
        headers(&["sample_id", "year", "length_cm", "fat_pc", "lsi_pc", "hcb", "pcb7"])
    );
    assert_eq!(map.resolved["year"], "År");
    assert_eq!(map.resolved["pcb7"], "ΣPCB7");
    assert!(map.unresolved.is_empty());
    // DDT, PBDE, HCH and chlordanes are absent.
    assert_eq!(map.warnings.len(), 4);
    assert!(!map.info.is_empty());
}

#[test]
fn canonical_headers_are_a_fixed_point() {
    let raw = headers(&[
        "sample_id", "year", "length_cm", "fat_pc", "lsi_pc", "pcb7", "ddt", "hcb", "pbde", "hch",
        "chlordanes",
    ]);
    let map = resolve_column_map(&raw, &ColumnSchema::standard(), "canonical").expect("resolve");
    assert_eq!(map.headers, raw);
    assert!(map.info.is_empty());
    assert!(map.warnings.is_empty());

    let again = resolve_column_map(&map.headers, &ColumnSchema::standard(), "canonical")
        .expect("resolve twice");
    assert_eq!(again.headers, map.headers);
}

#[test]
fn first_pattern_wins_and_later_matches_are_reported() {
    let raw = headers(&["year", "length_cm", "length", "fat", "lsi", "hcb"]);
    let map = resolve_column_map(&raw, &ColumnSchema::standard(), "cod.csv").expect("resolve");
    assert_eq!(map.resolved["length_cm"], "length_cm");
    assert_eq!(map.unresolved, headers(&["length"]));
    assert!(map.warnings.iter().any(|w| w.contains("'length'")));
}

#[test]
fn two_columns_for_one_pattern_is_an_error() {
    let raw = headers(&["year", "length", "Length", "fat", "lsi", "hcb"]);
    let err = resolve_column_map(&raw, &ColumnSchema::standard(), "cod.csv").unwrap_err();
    match err {
        TrendError::Schema { message, .. } => assert!(message.contains("length_cm")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn missing_required_field_is_an_error() {
    let raw = headers(&["year", "fat", "lsi", "hcb"]);
    let err = resolve_column_map(&raw, &ColumnSchema::standard(), "cod.csv").unwrap_err();
    assert!(matches!(err, TrendError::Schema { .. }));
    assert!(err.to_string().contains("length_cm"));
}

#[test]
fn lsi_may_be_derived_from_weights() {
    let raw = headers(&["year", "length", "fat", "fish weight", "liver weight", "hcb"]);
    let map = resolve_column_map(&raw, &ColumnSchema::standard(), "cod.csv").expect("resolve");
    assert!(!map.has("lsi_pc"));
    assert!(map.has("fish_weight_g"));
    assert!(map.has("liver_weight_g"));
    assert!(map.info.iter().any(|m| m.contains("derived")));

    let raw = headers(&["year", "length", "fat", "fish weight", "hcb"]);
    let err = resolve_column_map(&raw, &ColumnSchema::standard(), "cod.csv").unwrap_err();
    assert!(err.to_string().contains("lsi_pc"));
}

#[test]
fn a_sheet_without_contaminants_is_rejected() {
    let raw = headers(&["year", "length", "fat", "lsi"]);
    let err = resolve_column_map(&raw, &ColumnSchema::standard(), "cod.csv").unwrap_err();
    assert!(err.to_string().contains("contaminant"));
}

#[test]
fn stomach_schema_resolves_prey_columns() {
    let raw = headers(&["Art", "Byttedyr", "Vekt"]);
    let map = resolve_column_map(&raw, &ColumnSchema::stomach(), "stomach.csv").expect("resolve");
    assert_eq!(map.headers, headers(&["species", "prey_group", "weight"]));
}
