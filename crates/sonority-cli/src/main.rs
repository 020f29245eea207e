use anyhow::Result;
use clap::Parser;
use sonority_core::model::LinkType;
use sonority_search::Config;
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "sonority", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the library database (default: ~/.local/share/sonority/sonority.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to the engine cache (default: ~/.cache/sonority/features.cache)
    #[arg(long, global = true)]
    cache: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Import tracks, releases, artists and audio features from a JSON file
    ///
    /// The file holds a `tracks` array and an optional `track_lists` array:
    ///
    /// {"tracks": [{"name": "...", "release": "...",
    ///              "artists": [{"name": "...", "link_type": "performer"}],
    ///              "features": {"rhythm.bpm": [120.0]}}],
    ///  "track_lists": [{"name": "...", "tracks": [0, 2]}]}
    ///
    /// Track list entries refer to tracks by their position in the file.
    /// Releases and artists are matched by name.
    Import {
        /// Path to the JSON file
        path: PathBuf,
    },
    /// Train the similarity engine, or load it from its cache
    ///
    /// Press Ctrl-C to cancel; the previous cache is left untouched.
    Train {
        /// Retrain even when a usable cache exists
        #[arg(long)]
        force: bool,
    },
    /// Find similar tracks, releases or artists
    Similar {
        #[command(subcommand)]
        target: SimilarTarget,
    },
    /// Show library and engine status
    Status,
    /// Manage the trained engine cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, clap::Subcommand)]
enum SimilarTarget {
    /// Tracks similar to one or more tracks
    Tracks {
        /// Track ids
        #[arg(required = true)]
        ids: Vec<i64>,
        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = 10)]
        max: usize,
    },
    /// Tracks similar to the contents of a track list
    TrackList {
        /// Track list id
        id: i64,
        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = 10)]
        max: usize,
    },
    /// Releases similar to a release
    Release {
        /// Release id
        id: i64,
        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = 10)]
        max: usize,
    },
    /// Artists similar to an artist
    Artist {
        /// Artist id
        id: i64,
        /// Link types to compare through, in order of preference
        #[arg(long = "link-type", value_delimiter = ',', default_value = "performer")]
        link_types: Vec<LinkType>,
        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = 10)]
        max: usize,
    },
}

#[derive(Debug, clap::Subcommand)]
enum CacheCommand {
    /// Delete the cache; the next `train` or query retrains
    Clear,
}

#[derive(Debug, clap::Subcommand)]
enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Show the config file path
    Path,
    /// Print an example config file
    Example,
    /// Create the config file with defaults
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Commands::Config { command } = &cli.command {
        return match command {
            ConfigCommand::Show => commands::config::show_config(cli.db, cli.cache),
            ConfigCommand::Path => commands::config::show_path(),
            ConfigCommand::Example => commands::config::show_example(),
            ConfigCommand::Init => commands::config::init_config(),
        };
    }

    let config = Config::load()?.with_overrides(cli.db, cli.cache);

    // Ensure database directory exists
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match cli.command {
        Commands::Import { path } => {
            commands::run_import(&config, &path)?;
        }
        Commands::Train { force } => {
            commands::run_train(config, force).await?;
        }
        Commands::Similar { target } => match target {
            SimilarTarget::Tracks { ids, max } => {
                commands::similar::tracks(&config, &ids, max)?;
            }
            SimilarTarget::TrackList { id, max } => {
                commands::similar::track_list(&config, id, max)?;
            }
            SimilarTarget::Release { id, max } => {
                commands::similar::release(&config, id, max)?;
            }
            SimilarTarget::Artist { id, link_types, max } => {
                commands::similar::artist(&config, id, &link_types, max)?;
            }
        },
        Commands::Status => {
            commands::show_status(&config)?;
        }
        Commands::Cache {
            command: CacheCommand::Clear,
        } => {
            commands::clear_cache(&config)?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_similar_artist() {
        let cli = Cli::parse_from([
            "sonority",
            "similar",
            "artist",
            "7",
            "--link-type",
            "composer,performer",
            "-n",
            "3",
        ]);
        match cli.command {
            Commands::Similar {
                target: SimilarTarget::Artist { id, link_types, max },
            } => {
                assert_eq!(id, 7);
                assert_eq!(link_types, vec![LinkType::Composer, LinkType::Performer]);
                assert_eq!(max, 3);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_cache_clear() {
        let cli = Cli::parse_from(["sonority", "cache", "clear", "--cache", "/tmp/f.cache"]);
        assert_eq!(cli.cache, Some(PathBuf::from("/tmp/f.cache")));
        assert!(matches!(
            cli.command,
            Commands::Cache {
                command: CacheCommand::Clear
            }
        ));
    }

    #[test]
    fn test_parse_globals_after_subcommand() {
        let cli = Cli::parse_from(["sonority", "train", "--force", "--db", "/tmp/x.db"]);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        assert!(matches!(cli.command, Commands::Train { force: true }));
    }
}
