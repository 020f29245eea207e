use anyhow::Result;
use chrono::{DateTime, Local};
use sonority_core::schema::Database;
use sonority_search::{codec, CacheStore, Config, FileCache};

pub fn show_status(config: &Config) -> Result<()> {
    let db = Database::open(&config.database_path)?;
    let counts = db.counts()?;

    println!("\n📊 Sonority Status\n");
    println!("  Database: {}", config.database_path.display());
    println!("  Tracks: {} ({} with features)", counts.tracks, counts.tracks_with_features);
    println!("  Releases: {}", counts.releases);
    println!("  Artists: {}", counts.artists);
    println!("  Track lists: {}", counts.track_lists);

    let cache = FileCache::new(&config.cache_path);
    println!("\n  Cache: {}", cache.path().display());

    match cache.read()? {
        None => {
            println!("  Engine: not trained");
            if counts.tracks_with_features > 0 {
                println!("\n  Run `sonority train` to train the similarity engine");
            }
        }
        Some(blob) => {
            if let Some(modified) = cache.modified() {
                let modified: DateTime<Local> = modified.into();
                println!("  Trained: {}", modified.format("%Y-%m-%d %H:%M:%S"));
            }
            match codec::decode_for(&blob, &config.training) {
                Ok(snapshot) => {
                    let network = snapshot.network();
                    println!(
                        "  Engine: {}x{} map over {} dimensions",
                        network.rows(),
                        network.columns(),
                        network.dimension()
                    );
                    println!(
                        "  Indexed: {} tracks, {} releases",
                        snapshot.tracks().len(),
                        snapshot.releases().len()
                    );
                }
                Err(e) => {
                    println!("  Engine: cache unusable ({})", e);
                    println!("\n  Run `sonority train` to retrain");
                }
            }
        }
    }

    Ok(())
}
