use anyhow::{Context, Result};
use sonority_search::{CacheStore, Config, FileCache};

/// Delete the trained engine cache so the next load retrains.
///
/// Returns whether a cache file was there.
pub fn clear_cache(config: &Config) -> Result<bool> {
    let cache = FileCache::new(&config.cache_path);
    let existed = cache.modified().is_some();
    cache
        .clear()
        .with_context(|| format!("Failed to remove {}", cache.path().display()))?;

    if existed {
        log::info!("Removed engine cache {}", cache.path().display());
        println!("🗑  Removed {}", cache.path().display());
        println!("\n  Run `sonority train` to retrain the similarity engine");
    } else {
        println!("  No cache at {}", cache.path().display());
    }
    Ok(existed)
}
