use anyhow::{Context, Result};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

/// Maps `f` over `items`, serially when `cores` is `None` and on a dedicated
/// rayon pool otherwise. Output order always matches input order.
pub fn map_in_pool<I, T, F>(cores: Option<usize>, items: &[I], f: F) -> Result<Vec<T>>
where
    I: Sync,
    T: Send,
    F: Fn(&I) -> T + Sync + Send,
{
    match resolve_threads(cores, items.len()) {
        Some(threads) => {
            let pool = ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .context("build model-fitting thread pool")?;
            Ok(pool.install(|| items.par_iter().map(&f).collect()))
        }
        None => Ok(items.iter().map(f).collect()),
    }
}

pub fn resolve_threads(cores: Option<usize>, tasks: usize) -> Option<usize> {
    let cores = cores?;
    let capped = cores.clamp(1, tasks.max(1));
    if cores > capped {
        tracing::warn!(
            "Provided cores ({cores}) greater than number of model groups ({tasks}); using {capped}"
        );
    }
    Some(capped)
}
