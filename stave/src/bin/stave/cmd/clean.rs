//! `stave --clean`: empty the cache directory (spec.md §3 "Cache Entry").

use color_eyre::Result;
use tracing::{info, instrument};

#[instrument(skip(cache_dir))]
pub fn exec(cache_dir: &std::path::Path) -> Result<()> {
    let removed = stave::cache::clean(cache_dir)?;
    info!(removed, dir = %cache_dir.display(), "cache cleaned");
    println!("removed {removed} cached file(s) from {}", cache_dir.display());
    Ok(())
}
