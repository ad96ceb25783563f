//! Temporal trends of persistent organic pollutants in fish liver.
//!
//! Per-species contaminant sheets are cleaned into one canonical table,
//! responses are moved to the `log10(x + 1)` scale, and every
//! (species, contaminant) group gets its own linear model on year, length,
//! fat and liver-somatic index.

pub mod error;
pub mod logging;
pub mod types;

pub mod df_utils;
pub mod io;
pub mod matrix;
pub mod parallel;
pub mod plot_utils;
pub mod qc;
pub mod schema;

pub mod clean;
pub mod diagnostics;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod simulate;
pub mod stomach;
pub mod transform;

pub use clean::{CleanConfig, CleanedTable, RawSheet, clean};
pub use diagnostics::diagnose;
pub use error::{Result, TrendError};
pub use model::{all_groups, fit_group};
pub use pipeline::{AnalysisConfig, AnalysisOutput, run_analysis};
pub use transform::transform;
