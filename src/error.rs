use thiserror::Error;

use crate::types::{Contaminant, Species};

#[derive(Debug, Error)]
pub enum TrendError {
    #[error("schema error in {source_name}: {message}")]
    Schema {
        source_name: String,
        message: String,
    },

    #[error(
        "insufficient data for {species}/{variable}: {observations} complete observation(s), need at least {required}"
    )]
    InsufficientData {
        species: Species,
        variable: Contaminant,
        observations: usize,
        required: usize,
    },

    #[error("singular design matrix for {species}/{variable}")]
    SingularDesign {
        species: Species,
        variable: Contaminant,
    },

    #[error("value {value} in column {column} is outside the domain of the log transform")]
    NumericDomain { column: String, value: f64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrendError {
    pub fn schema(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        TrendError::Schema {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Errors scoped to a single model group; every other variant aborts the run.
    pub fn is_group_local(&self) -> bool {
        matches!(
            self,
            TrendError::InsufficientData { .. } | TrendError::SingularDesign { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TrendError>;
