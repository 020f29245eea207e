pub mod cache;
pub mod config;
pub mod import;
pub mod similar;
pub mod status;
pub mod train;

use anyhow::{Context, Result};
use sonority_search::{Config, FeaturesEngine, FileCache, SqliteLibrary};
use std::sync::Arc;

pub use cache::clear_cache;
pub use import::run_import;
pub use status::show_status;
pub use train::run_train;

/// Open the library and build the features engine described by `config`.
pub fn open_engine(config: &Config) -> Result<FeaturesEngine> {
    let library = SqliteLibrary::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open library database {}",
            config.database_path.display()
        )
    })?;
    Ok(FeaturesEngine::new(
        Arc::new(library),
        Arc::new(FileCache::new(&config.cache_path)),
        config.training.clone(),
    ))
}
