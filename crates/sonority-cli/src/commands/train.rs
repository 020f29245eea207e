use anyhow::Result;
use sonority_search::{Config, LoadSource, SimilarityClassifier};
use std::sync::Arc;

use super::open_engine;

fn print_progress(fraction: f64) {
    eprint!("\r  Progress: {:>3.0}%", fraction * 100.0);
}

/// Load the engine from its cache or train it, cancelling on Ctrl-C.
pub async fn run_train(config: Config, force: bool) -> Result<()> {
    let engine = Arc::new(open_engine(&config)?);

    println!(
        "🧠 {} similarity engine ({} features, {} dimensions)",
        if force { "Retraining" } else { "Loading" },
        config.training.features.len(),
        config.training.dimension()
    );

    let mut worker = {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || engine.load(force, &print_progress))
    };

    let outcome = tokio::select! {
        joined = &mut worker => joined?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n  Cancelling...");
            engine.request_cancel_load();
            worker.await?
        }
    };
    eprintln!();

    match outcome {
        Ok(LoadSource::Cache) => {
            println!("  ✓ Loaded from cache: {}", config.cache_path.display());
            println!("\n  Run `sonority train --force` to retrain");
        }
        Ok(LoadSource::Training) => {
            if let Some(snapshot) = engine.snapshot() {
                println!(
                    "  ✓ Trained a {}x{} map over {} tracks",
                    snapshot.network().rows(),
                    snapshot.network().columns(),
                    snapshot.tracks().len()
                );
            }
            println!("  Cache: {}", config.cache_path.display());
        }
        Err(e) if e.is_cancelled() => {
            println!("  Training cancelled; the previous cache was kept");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
