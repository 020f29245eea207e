use anyhow::{Context, Result};
use sonority_core::model::{ArtistId, LinkType, ReleaseId, TrackId, TrackListId};
use sonority_core::schema::Database;
use sonority_search::{Config, FeaturesEngine, SimilarityClassifier};

use super::open_engine;

/// Open the engine and make it ready, training it if there is no usable
/// cache yet.
fn ready_engine(config: &Config) -> Result<FeaturesEngine> {
    let engine = open_engine(config)?;
    engine
        .load(false, &|_| {})
        .context("Failed to load the similarity engine")?;
    Ok(engine)
}

fn print_empty(results: usize) {
    if results == 0 {
        println!("  No similar objects found");
    }
}

pub fn tracks(config: &Config, ids: &[i64], max: usize) -> Result<()> {
    let engine = ready_engine(config)?;
    let db = Database::open(&config.database_path)?;

    let seeds: Vec<TrackId> = ids.iter().copied().map(TrackId::new).collect();
    let similar = engine.similar_tracks(&seeds, max);

    println!("🎵 Tracks similar to {:?}\n", ids);
    for id in &similar {
        let name = db.get_track(*id)?.map(|t| t.name).unwrap_or_default();
        println!("  {:>6}  {}", id, name);
    }
    print_empty(similar.len());
    Ok(())
}

pub fn track_list(config: &Config, id: i64, max: usize) -> Result<()> {
    let engine = ready_engine(config)?;
    let db = Database::open(&config.database_path)?;

    let list_id = TrackListId::new(id);
    let list = db
        .get_track_list(list_id)?
        .with_context(|| format!("No track list with id {}", id))?;
    let similar = engine.similar_tracks_from_list(list_id, max);

    println!("🎵 Tracks similar to '{}'\n", list.name);
    for id in &similar {
        let name = db.get_track(*id)?.map(|t| t.name).unwrap_or_default();
        println!("  {:>6}  {}", id, name);
    }
    print_empty(similar.len());
    Ok(())
}

pub fn release(config: &Config, id: i64, max: usize) -> Result<()> {
    let engine = ready_engine(config)?;
    let db = Database::open(&config.database_path)?;

    let release_id = ReleaseId::new(id);
    let release = db
        .get_release(release_id)?
        .with_context(|| format!("No release with id {}", id))?;
    let similar = engine.similar_releases(release_id, max);

    println!("💿 Releases similar to '{}'\n", release.name);
    for id in &similar {
        let name = db.get_release(*id)?.map(|r| r.name).unwrap_or_default();
        println!("  {:>6}  {}", id, name);
    }
    print_empty(similar.len());
    Ok(())
}

pub fn artist(config: &Config, id: i64, link_types: &[LinkType], max: usize) -> Result<()> {
    let engine = ready_engine(config)?;
    let db = Database::open(&config.database_path)?;

    let artist_id = ArtistId::new(id);
    let artist = db
        .get_artist(artist_id)?
        .with_context(|| format!("No artist with id {}", id))?;
    let similar = engine.similar_artists(artist_id, link_types, max);

    let roles: Vec<&str> = link_types.iter().map(|l| l.as_str()).collect();
    println!("🎤 Artists similar to '{}' as {}\n", artist.name, roles.join(", "));
    for id in &similar {
        let name = db.get_artist(*id)?.map(|a| a.name).unwrap_or_default();
        println!("  {:>6}  {}", id, name);
    }
    print_empty(similar.len());
    Ok(())
}
