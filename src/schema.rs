//! Declarative column schema and header resolution.
//!
//! Each canonical field owns an ordered list of accepted raw names. Headers
//! are normalized before matching, and the first pattern that matches a
//! header wins the field.

use std::collections::HashMap;

use crate::error::{Result, TrendError};
use crate::types::Contaminant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
    /// Required unless every listed canonical field resolves.
    DerivableFrom(&'static [&'static str]),
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub canonical: &'static str,
    pub patterns: Vec<&'static str>,
    pub requirement: Requirement,
    /// Identifier fields keep their text type; everything else is numeric.
    pub identifier: bool,
}

impl FieldSpec {
    fn numeric(
        canonical: &'static str,
        patterns: Vec<&'static str>,
        requirement: Requirement,
    ) -> Self {
        FieldSpec {
            canonical,
            patterns,
            requirement,
            identifier: false,
        }
    }

    fn identifier(canonical: &'static str, patterns: Vec<&'static str>) -> Self {
        FieldSpec {
            canonical,
            patterns,
            requirement: Requirement::Optional,
            identifier: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub fields: Vec<FieldSpec>,
    /// Groups of canonical fields of which at least one must resolve.
    pub at_least_one: Vec<(&'static str, Vec<&'static str>)>,
}

#[derive(Debug, Clone)]
pub struct ColumnMap {
    /// Headers after resolution, in input order. Unresolved headers keep
    /// their normalized form.
    pub headers: Vec<String>,
    /// Canonical field -> original header.
    pub resolved: HashMap<&'static str, String>,
    pub unresolved: Vec<String>,
    pub warnings: Vec<String>,
    pub info: Vec<String>,
}

impl ColumnMap {
    pub fn has(&self, canonical: &str) -> bool {
        self.resolved.contains_key(canonical)
    }
}

const LSI_INPUTS: &[&str] = &["fish_weight_g", "liver_weight_g"];

impl ColumnSchema {
    /// Schema of the per-species contaminant sheets.
    pub fn standard() -> Self {
        let mut fields = vec![
            FieldSpec::identifier(
                "sample_id",
                vec![
                    "sample_id",
                    "sample",
                    "sampleid",
                    "sample_no",
                    "fish_id",
                    "fish_no",
                    "id",
                    "prøvenr",
                    "prøve_id",
                    "individ",
                ],
            ),
            FieldSpec::identifier("species", vec!["species", "art", "fish_species"]),
            FieldSpec::numeric(
                "year",
                vec!["year", "sampling_year", "catch_year", "yr", "år", "aar"],
                Requirement::Required,
            ),
            FieldSpec::numeric(
                "length_cm",
                vec![
                    "length_cm",
                    "length",
                    "total_length_cm",
                    "total_length",
                    "lengde_cm",
                    "lengde",
                    "tl_cm",
                ],
                Requirement::Required,
            ),
            FieldSpec::numeric(
                "fat_pc",
                vec![
                    "fat_pc",
                    "fat",
                    "fat_percent",
                    "fat_content",
                    "lipid_pc",
                    "lipid",
                    "fett_pc",
                    "fett",
                ],
                Requirement::Required,
            ),
            FieldSpec::numeric(
                "lsi_pc",
                vec!["lsi_pc", "lsi", "lsi_percent", "liver_somatic_index", "hsi"],
                Requirement::DerivableFrom(LSI_INPUTS),
            ),
            FieldSpec::numeric(
                "fish_weight_g",
                vec![
                    "fish_weight_g",
                    "fish_weight",
                    "weight_g",
                    "weight",
                    "total_weight_g",
                    "vekt_g",
                    "vekt",
                ],
                Requirement::Optional,
            ),
            FieldSpec::numeric(
                "liver_weight_g",
                vec![
                    "liver_weight_g",
                    "liver_weight",
                    "liver_g",
                    "levervekt_g",
                    "levervekt",
                ],
                Requirement::Optional,
            ),
            FieldSpec::numeric(
                "age",
                vec!["age", "age_years", "age_yr", "alder"],
                Requirement::Optional,
            ),
        ];
        for contaminant in Contaminant::ALL {
            fields.push(FieldSpec::numeric(
                contaminant.column(),
                contaminant_patterns(contaminant),
                Requirement::Optional,
            ));
        }
        ColumnSchema {
            fields,
            at_least_one: vec![(
                "contaminant",
                Contaminant::ALL.iter().map(|c| c.column()).collect(),
            )],
        }
    }

    /// Schema of the auxiliary stomach-content table.
    pub fn stomach() -> Self {
        ColumnSchema {
            fields: vec![
                FieldSpec {
                    canonical: "species",
                    patterns: vec!["species", "art", "fish_species"],
                    requirement: Requirement::Required,
                    identifier: true,
                },
                FieldSpec {
                    canonical: "prey_group",
                    patterns: vec!["prey_group", "prey", "prey_category", "byttedyr", "taxon"],
                    requirement: Requirement::Required,
                    identifier: true,
                },
                FieldSpec::numeric(
                    "weight",
                    vec!["weight", "weight_g", "prey_weight", "prey_weight_g", "vekt"],
                    Requirement::Required,
                ),
            ],
            at_least_one: Vec::new(),
        }
    }

    pub fn field(&self, canonical: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.canonical == canonical)
    }
}

fn contaminant_patterns(contaminant: Contaminant) -> Vec<&'static str> {
    match contaminant {
        Contaminant::Pcb7 => vec![
            "pcb7", "sum_pcb7", "σpcb7", "pcb_7", "sumpcb7", "pcb", "sum_pcb",
        ],
        Contaminant::Ddt => vec!["ddt", "sum_ddt", "σddt", "ddts", "sumddt"],
        Contaminant::Hcb => vec!["hcb", "hexachlorobenzene"],
        Contaminant::Pbde => vec![
            "pbde", "sum_pbde", "σpbde", "pbde7", "sum_pbde7", "pbdes", "bde",
        ],
        Contaminant::Hch => vec!["hch", "sum_hch", "σhch", "hchs", "sumhch"],
        Contaminant::Chlordanes => vec![
            "chlordanes",
            "chlordane",
            "sum_chlordanes",
            "σchlordanes",
            "chl",
            "sum_chl",
        ],
    }
}

/// Trim, lowercase, and collapse every non-alphanumeric run to `_`.
pub fn normalize_header(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    let mut pending_sep = false;
    for c in header.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}

pub fn normalize_headers(headers: &[String]) -> Vec<String> {
    headers.iter().map(|h| normalize_header(h)).collect()
}

pub fn resolve_column_map(
    headers: &[String],
    schema: &ColumnSchema,
    source_name: &str,
) -> Result<ColumnMap> {
    let normalized = normalize_headers(headers);
    let mut out_headers = normalized.clone();
    let mut claimed = vec![false; headers.len()];
    let mut resolved: HashMap<&'static str, String> = HashMap::new();
    let mut warnings = Vec::new();
    let mut info = Vec::new();

    for field in &schema.fields {
        for pattern in &field.patterns {
            let hits: Vec<usize> = normalized
                .iter()
                .enumerate()
                .filter(|(idx, h)| !claimed[*idx] && h.as_str() == *pattern)
                .map(|(idx, _)| idx)
                .collect();
            if hits.is_empty() {
                continue;
            }
            if hits.len() > 1 {
                let names: Vec<&str> = hits.iter().map(|&i| headers[i].as_str()).collect();
                return Err(TrendError::schema(
                    source_name,
                    format!(
                        "multiple columns ({}) interpreted as {}",
                        names.join(", "),
                        field.canonical
                    ),
                ));
            }
            let idx = hits[0];
            claimed[idx] = true;
            out_headers[idx] = field.canonical.to_string();
            if headers[idx] != field.canonical {
                info.push(format!(
                    "Interpreting the '{}' column as the {} column.",
                    headers[idx], field.canonical
                ));
            }
            resolved.insert(field.canonical, headers[idx].clone());
            break;
        }
    }

    // Headers that match a lower-priority pattern of an already resolved field.
    let mut unresolved = Vec::new();
    for (idx, header) in headers.iter().enumerate() {
        if claimed[idx] {
            continue;
        }
        unresolved.push(header.clone());
        if let Some(field) = schema
            .fields
            .iter()
            .find(|f| f.patterns.contains(&normalized[idx].as_str()))
        {
            warnings.push(format!(
                "Column '{header}' also matches {} but '{}' was preferred; ignoring it.",
                field.canonical,
                resolved
                    .get(field.canonical)
                    .map(String::as_str)
                    .unwrap_or("?")
            ));
        }
    }

    for field in &schema.fields {
        if resolved.contains_key(field.canonical) {
            continue;
        }
        match field.requirement {
            Requirement::Required => {
                return Err(TrendError::schema(
                    source_name,
                    format!(
                        "cannot find the {} column; accepted names are {}",
                        field.canonical,
                        field.patterns.join(", ")
                    ),
                ));
            }
            Requirement::DerivableFrom(inputs) => {
                if inputs.iter().all(|i| resolved.contains_key(i)) {
                    info.push(format!(
                        "No {} column; it will be derived from {}.",
                        field.canonical,
                        inputs.join(" and ")
                    ));
                } else {
                    return Err(TrendError::schema(
                        source_name,
                        format!(
                            "cannot find the {} column and cannot derive it from {}",
                            field.canonical,
                            inputs.join(" and ")
                        ),
                    ));
                }
            }
            Requirement::Optional => {}
        }
    }

    for (label, group) in &schema.at_least_one {
        if group.iter().all(|c| !resolved.contains_key(c)) {
            return Err(TrendError::schema(
                source_name,
                format!("no {label} column found; expected one of {}", group.join(", ")),
            ));
        }
        for c in group {
            if !resolved.contains_key(c) {
                warnings.push(format!(
                    "No {c} column in {source_name}; that {label} will be missing for every row."
                ));
            }
        }
    }

    Ok(ColumnMap {
        headers: out_headers,
        resolved,
        unresolved,
        warnings,
        info,
    })
}
