use anyhow::Result;
use sonority_search::{config, Config};
use std::path::PathBuf;

/// Show the current effective configuration.
pub fn show_config(db: Option<PathBuf>, cache: Option<PathBuf>) -> Result<()> {
    let config = Config::load()?.with_overrides(db, cache);

    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config::config_file_path().display());

    let exists = config::config_file_path().exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    println!("Settings:");
    println!("  database_path: {}", config.database_path.display());
    println!("  cache_path: {}", config.cache_path.display());
    println!("  training.iteration_count: {}", config.training.iteration_count);
    println!(
        "  training.sample_count_per_neuron: {}",
        config.training.sample_count_per_neuron
    );
    println!("  training.seed: {}", config.training.seed);
    println!(
        "  training.features ({} dimensions):",
        config.training.dimension()
    );
    for (name, feature) in &config.training.features {
        println!(
            "    {}: dimension {}, weight {}",
            name, feature.dimension, feature.weight
        );
    }

    println!("\nPriority: CLI args > ENV vars (SONORITY_*) > Config file > Defaults");

    Ok(())
}

/// Show the config file path.
pub fn show_path() -> Result<()> {
    let config_path = config::config_file_path();
    println!("{}", config_path.display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to configure sonority.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}
