use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::settings::TrainSettings;

/// Configuration for sonority.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (SONORITY_* prefix)
/// 3. Config file (~/.config/sonority/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Path to the SQLite library database.
    ///
    /// Can be set via:
    /// - CLI: --db /path/to/db
    /// - ENV: SONORITY_DATABASE_PATH
    /// - Config: database_path = "/path/to/db"
    /// - Default: ~/.local/share/sonority/sonority.db
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,

    /// Path of the trained engine cache.
    ///
    /// Can be set via:
    /// - CLI: --cache /path/to/cache
    /// - ENV: SONORITY_CACHE_PATH
    /// - Config: cache_path = "/path/to/cache"
    /// - Default: ~/.cache/sonority/features.cache
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// Training parameters and the features to train on.
    #[serde(default)]
    pub training: TrainSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            cache_path: default_cache_path(),
            training: TrainSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default config file and environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from `config_path` (skipped when missing) and
    /// environment variables.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("sonority");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build().context("Failed to build configuration")?;
        Ok(config)
    }

    /// Apply the paths given on the command line.
    pub fn with_overrides(mut self, db_path: Option<PathBuf>, cache_path: Option<PathBuf>) -> Self {
        if let Some(path) = db_path {
            self.database_path = path;
        }
        if let Some(path) = cache_path {
            self.cache_path = path;
        }
        self
    }
}

/// Default database path: ~/.local/share/sonority/sonority.db (or platform
/// equivalent).
fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sonority")
        .join("sonority.db")
}

/// Default cache path: ~/.cache/sonority/features.cache (or platform
/// equivalent).
fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sonority")
        .join("features.cache")
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/sonority/config.toml
/// - macOS: ~/Library/Application Support/sonority/config.toml
/// - Windows: %APPDATA%\sonority\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sonority")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Sonority Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (SONORITY_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Path to the SQLite library database
#
# Can also be set via:
# - CLI: sonority --db /custom/path.db status
# - Environment: SONORITY_DATABASE_PATH=/custom/path.db
#
# Default: Platform-specific data directory
#database_path = "/path/to/custom/sonority.db"

# Path of the trained engine cache
#
# Deleting this file forces the next `sonority train` to retrain.
#
# Can also be set via:
# - CLI: sonority --cache /custom/features.cache train
# - Environment: SONORITY_CACHE_PATH=/custom/features.cache
#
# Default: Platform-specific cache directory
#cache_path = "/path/to/custom/features.cache"

[training]
# Number of passes over the whole sample set
iteration_count = 10

# Average number of tracks per grid cell; smaller values give larger maps
sample_count_per_neuron = 4.0

# Seed of the training random generator
seed = 24301

# Features to train on. Each entry gives the number of components of the
# feature and its weight in the distance metric. Changing this section
# invalidates the cache.
[training.features."lowlevel.spectral_energyband_high.mean"]
dimension = 1
weight = 1.0

[training.features."lowlevel.spectral_rolloff.median"]
dimension = 1
weight = 1.0

[training.features."lowlevel.spectral_contrast_valleys.var"]
dimension = 6
weight = 1.0

[training.features."lowlevel.erbbands.median"]
dimension = 40
weight = 1.0

[training.features."lowlevel.gfcc.mean"]
dimension = 13
weight = 1.0
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}
