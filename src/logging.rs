use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn open_log_file(dir: &Path, log_name: &str) -> Result<File> {
    let path = dir.join(format!("{log_name}.log"));
    let file = File::create(path)?;
    Ok(file)
}

pub fn log_line(log: &mut File, message: &str, print: bool) -> Result<()> {
    if print {
        info!("{message}");
    }
    writeln!(log, "{message}")?;
    Ok(())
}

pub fn warn_line(log: &mut File, message: &str) -> Result<()> {
    warn!("{message}");
    writeln!(log, "{message}")?;
    Ok(())
}

/// Writes the session header: program version, platform, and inputs.
pub fn write_session_info(log: &mut File, inputs: &[(String, String)]) -> Result<()> {
    writeln!(
        log,
        "{} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )?;
    writeln!(
        log,
        "platform: {}-{} ({})",
        std::env::consts::ARCH,
        std::env::consts::OS,
        std::env::consts::FAMILY
    )?;
    writeln!(log, "rayon threads: {}", rayon::current_num_threads())?;
    for (label, value) in inputs {
        writeln!(log, "input {label}: {value}")?;
    }
    writeln!(log)?;
    Ok(())
}
