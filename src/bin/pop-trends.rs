use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use pop_trends::clean::{CleanConfig, LsiOverrides, RawSheet, clean};
use pop_trends::logging::init_tracing;
use pop_trends::model::fit_group;
use pop_trends::pipeline::{AnalysisConfig, run_analysis};
use pop_trends::report::{SignificanceStyle, annotation_text, summary_table};
use pop_trends::simulate::{SimulateConfig, simulate, write_species_sheets};
use pop_trends::transform::transform;
use pop_trends::types::{Contaminant, Species};

#[derive(Parser)]
#[command(name = "pop-trends")]
#[command(about = "Temporal trends of POPs in fish liver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Clean, fit all 18 model groups, and write tables and plots.
    Run {
        /// `species=path`, once per species sheet.
        #[arg(long = "sheet", required = true, value_parser = parse_sheet)]
        sheets: Vec<(Species, PathBuf)>,
        #[arg(long)]
        lsi_overrides: Option<PathBuf>,
        #[arg(long)]
        stomach: Option<PathBuf>,
        #[arg(long, default_value_t = 0.05)]
        alpha: f64,
        #[arg(long, default_value = "green")]
        decrease_color: String,
        #[arg(long, default_value = "red")]
        increase_color: String,
        #[arg(long, default_value = "black")]
        neutral_color: String,
        #[arg(long)]
        cores: Option<usize>,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[arg(long, default_value_t = false)]
        diagnostic_plots: bool,
        #[arg(long, default_value = "pop_trends")]
        log_name: String,
    },
    /// Fit a single (species, contaminant) group and print its coefficients.
    Fit {
        #[arg(long = "sheet", required = true, value_parser = parse_sheet)]
        sheets: Vec<(Species, PathBuf)>,
        #[arg(long)]
        lsi_overrides: Option<PathBuf>,
        #[arg(long)]
        species: Species,
        #[arg(long)]
        variable: Contaminant,
    },
    /// Write seeded synthetic sheets with a known year trend.
    Simulate {
        #[arg(long)]
        out_dir: PathBuf,
        #[arg(long, default_value_t = 50)]
        rows: usize,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long, default_value_t = -0.05, allow_negative_numbers = true)]
        year_slope: f64,
    },
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            sheets,
            lsi_overrides,
            stomach,
            alpha,
            decrease_color,
            increase_color,
            neutral_color,
            cores,
            out_dir,
            diagnostic_plots,
            log_name,
        } => {
            let config = AnalysisConfig {
                sheets,
                lsi_overrides,
                stomach,
                style: SignificanceStyle {
                    alpha,
                    decrease_color,
                    increase_color,
                    neutral_color,
                },
                cores,
                out_dir,
                diagnostic_plots,
                log_name,
            };
            let output = run_analysis(&config)?;
            let failed = output.failed().count();
            println!(
                "{} group(s) fitted, {failed} skipped; log written to {}",
                output.fitted().count(),
                output.log_path.display()
            );
        }
        Command::Fit {
            sheets,
            lsi_overrides,
            species,
            variable,
        } => {
            let raw = sheets
                .iter()
                .map(|(s, p)| RawSheet::read(*s, p))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let lsi_overrides = match lsi_overrides {
                Some(path) => LsiOverrides::read(&path)?,
                None => LsiOverrides::default(),
            };
            let config = CleanConfig {
                lsi_overrides,
                ..CleanConfig::default()
            };
            let table = clean(&raw, &config)?;
            let transformed = transform(&table)?;
            let group = fit_group(&transformed, species, variable)
                .with_context(|| format!("fit {species}/{variable}"))?;
            println!("{}", summary_table(&[&group])?);
            println!(
                "n = {} of {}; adj. R2 = {:.3}; {}",
                group.summary.n_used,
                group.summary.n_raw,
                group.summary.adj_r_squared,
                annotation_text(&group.year_effect())
            );
        }
        Command::Simulate {
            out_dir,
            rows,
            seed,
            year_slope,
        } => {
            let config = SimulateConfig {
                rows_per_species: rows,
                seed,
                year_slope,
                ..SimulateConfig::default()
            };
            let observations = simulate(&config)?;
            for (species, path) in write_species_sheets(&observations, &out_dir)? {
                println!("{species}: {}", path.display());
            }
        }
    }

    Ok(())
}

fn parse_sheet(input: &str) -> anyhow::Result<(Species, PathBuf)> {
    let (species, path) = input
        .split_once('=')
        .with_context(|| format!("expected species=path, got '{input}'"))?;
    let species: Species = species.parse()?;
    Ok((species, PathBuf::from(path.trim())))
}
