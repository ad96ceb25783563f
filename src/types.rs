use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::TrendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Species {
    Cod,
    Haddock,
    Saithe,
}

impl Species {
    pub const ALL: [Species; 3] = [Species::Cod, Species::Haddock, Species::Saithe];

    pub fn name(self) -> &'static str {
        match self {
            Species::Cod => "Cod",
            Species::Haddock => "Haddock",
            Species::Saithe => "Saithe",
        }
    }

    pub fn latin_name(self) -> &'static str {
        match self {
            Species::Cod => "Gadus morhua",
            Species::Haddock => "Melanogrammus aeglefinus",
            Species::Saithe => "Pollachius virens",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Species {
    type Err = TrendError;

    // Sheet names come in English, Norwegian, or Latin.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cod" | "torsk" | "gadus morhua" => Ok(Species::Cod),
            "haddock" | "hyse" | "melanogrammus aeglefinus" => Ok(Species::Haddock),
            "saithe" | "sei" | "pollachius virens" => Ok(Species::Saithe),
            other => Err(TrendError::InvalidArgument(format!(
                "unknown species '{other}'"
            ))),
        }
    }
}

/// The six main contaminant groups modelled per species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Contaminant {
    Pcb7,
    Ddt,
    Hcb,
    Pbde,
    Hch,
    Chlordanes,
}

impl Contaminant {
    pub const ALL: [Contaminant; 6] = [
        Contaminant::Pcb7,
        Contaminant::Ddt,
        Contaminant::Hcb,
        Contaminant::Pbde,
        Contaminant::Hch,
        Contaminant::Chlordanes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Contaminant::Pcb7 => "PCB7",
            Contaminant::Ddt => "DDT",
            Contaminant::Hcb => "HCB",
            Contaminant::Pbde => "PBDE",
            Contaminant::Hch => "HCH",
            Contaminant::Chlordanes => "Chlordanes",
        }
    }

    /// Canonical column name in the cleaned wide table.
    pub fn column(self) -> &'static str {
        match self {
            Contaminant::Pcb7 => "pcb7",
            Contaminant::Ddt => "ddt",
            Contaminant::Hcb => "hcb",
            Contaminant::Pbde => "pbde",
            Contaminant::Hch => "hch",
            Contaminant::Chlordanes => "chlordanes",
        }
    }
}

impl fmt::Display for Contaminant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Contaminant {
    type Err = TrendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Contaminant::ALL
            .into_iter()
            .find(|c| c.column() == needle || c.name().to_lowercase() == needle)
            .ok_or_else(|| TrendError::InvalidArgument(format!("unknown contaminant '{s}'")))
    }
}

/// Model predictors, in design-matrix order after the intercept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Predictor {
    Year,
    LengthCm,
    FatPc,
    LsiPc,
}

impl Predictor {
    pub const ALL: [Predictor; 4] = [
        Predictor::Year,
        Predictor::LengthCm,
        Predictor::FatPc,
        Predictor::LsiPc,
    ];

    pub fn term(self) -> &'static str {
        match self {
            Predictor::Year => "year",
            Predictor::LengthCm => "length_cm",
            Predictor::FatPc => "fat_pc",
            Predictor::LsiPc => "lsi_pc",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Predictor::Year => 0,
            Predictor::LengthCm => 1,
            Predictor::FatPc => 2,
            Predictor::LsiPc => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Predictor::Year => "Year",
            Predictor::LengthCm => "log10 length (cm)",
            Predictor::FatPc => "Fat (%)",
            Predictor::LsiPc => "LSI (%)",
        }
    }
}

impl fmt::Display for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.term())
    }
}

/// One sampled fish after cleaning.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub sample_id: Option<String>,
    pub species: Species,
    pub year: i32,
    pub length_cm: Option<f64>,
    pub fat_pc: Option<f64>,
    pub lsi_pc: Option<f64>,
    pub fish_weight_g: Option<f64>,
    pub liver_weight_g: Option<f64>,
    pub age: Option<f64>,
    pub contaminants: BTreeMap<Contaminant, f64>,
}

impl Observation {
    pub fn has_any_response(&self) -> bool {
        !self.contaminants.is_empty()
    }
}

/// One (observation, contaminant) pair with a measured value.
#[derive(Debug, Clone, PartialEq)]
pub struct LongRow {
    pub sample_id: Option<String>,
    pub species: Species,
    pub year: i32,
    pub length_cm: Option<f64>,
    pub fat_pc: Option<f64>,
    pub lsi_pc: Option<f64>,
    pub variable: Contaminant,
    pub value: f64,
}

impl LongRow {
    pub fn predictor(&self, predictor: Predictor) -> Option<f64> {
        match predictor {
            Predictor::Year => Some(self.year as f64),
            Predictor::LengthCm => self.length_cm,
            Predictor::FatPc => self.fat_pc,
            Predictor::LsiPc => self.lsi_pc,
        }
    }

    /// All four predictors, or `None` when any is missing.
    pub fn predictors(&self) -> Option<[f64; 4]> {
        Some([
            self.year as f64,
            self.length_cm?,
            self.fat_pc?,
            self.lsi_pc?,
        ])
    }
}
