use anyhow::{bail, Context, Result};
use serde::Deserialize;
use sonority_core::model::{FeatureMap, LinkType, TrackId, TrackListKind};
use sonority_core::schema::Database;
use sonority_search::settings::known_feature_dimension;
use sonority_search::Config;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ImportFile {
    tracks: Vec<ImportTrack>,
    #[serde(default)]
    track_lists: Vec<ImportTrackList>,
}

#[derive(Debug, Deserialize)]
struct ImportTrack {
    name: String,
    #[serde(default)]
    release: Option<String>,
    #[serde(default)]
    artists: Vec<ImportArtist>,
    #[serde(default)]
    features: FeatureMap,
}

#[derive(Debug, Deserialize)]
struct ImportArtist {
    name: String,
    #[serde(default = "default_link_type")]
    link_type: LinkType,
}

fn default_link_type() -> LinkType {
    LinkType::Artist
}

#[derive(Debug, Deserialize)]
struct ImportTrackList {
    name: String,
    /// Positions of the tracks in the file's `tracks` array.
    tracks: Vec<usize>,
}

/// Counts of what an import added.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub tracks: usize,
    pub tracks_with_features: usize,
    pub track_lists: usize,
}

pub fn run_import(config: &Config, path: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let db = Database::open(&config.database_path)?;

    println!("📥 Importing {}", path.display());
    let summary = import_json(&db, &contents)?;

    println!(
        "  ✓ {} tracks ({} with features), {} track lists",
        summary.tracks, summary.tracks_with_features, summary.track_lists
    );
    println!("\n  Run `sonority train --force` to retrain the similarity engine");
    Ok(())
}

/// Import the records of an import file into `db`.
///
/// The import is all or nothing: on any error no record of the file is kept.
pub fn import_json(db: &Database, contents: &str) -> Result<ImportSummary> {
    let file: ImportFile = serde_json::from_str(contents).context("Invalid import file")?;

    for list in &file.track_lists {
        if let Some(bad) = list.tracks.iter().find(|i| **i >= file.tracks.len()) {
            bail!(
                "Track list '{}' refers to track #{}, but the file has {} tracks",
                list.name,
                bad,
                file.tracks.len()
            );
        }
    }

    let summary = db.in_transaction(|db| write_records(db, &file))?;
    log::info!(
        "Imported {} tracks and {} track lists",
        summary.tracks,
        summary.track_lists
    );
    Ok(summary)
}

fn write_records(db: &Database, file: &ImportFile) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    let mut track_ids: Vec<TrackId> = Vec::with_capacity(file.tracks.len());

    for track in &file.tracks {
        let release_id = track
            .release
            .as_deref()
            .map(|name| db.find_or_insert_release(name))
            .transpose()?;
        let track_id = db.insert_track(&track.name, release_id)?;

        for artist in &track.artists {
            let artist_id = db.find_or_insert_artist(&artist.name)?;
            db.link_artist(track_id, artist_id, artist.link_type)?;
        }

        if !track.features.is_empty() {
            for (name, values) in &track.features {
                match known_feature_dimension(name) {
                    Some(dimension) if dimension != values.len() => log::warn!(
                        "Track '{}': feature {} has {} components, expected {}",
                        track.name,
                        name,
                        values.len(),
                        dimension
                    ),
                    None => log::debug!("Track '{}': unknown feature {}", track.name, name),
                    Some(_) => {}
                }
            }
            db.set_track_features(track_id, &track.features)?;
            summary.tracks_with_features += 1;
        }

        track_ids.push(track_id);
        summary.tracks += 1;
    }

    for list in &file.track_lists {
        let list_id = db.create_track_list(&list.name, TrackListKind::Playlist)?;
        for &index in &list.tracks {
            db.append_track_list_entry(list_id, track_ids[index])?;
        }
        summary.track_lists += 1;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "tracks": [
            {"name": "So What", "release": "Kind of Blue",
             "artists": [{"name": "Miles Davis", "link_type": "performer"},
                         {"name": "Miles Davis", "link_type": "composer"}],
             "features": {"rhythm.bpm": [136.0]}},
            {"name": "Blue in Green", "release": "Kind of Blue",
             "artists": [{"name": "Bill Evans"}]},
            {"name": "Naima"}
        ],
        "track_lists": [{"name": "late night", "tracks": [2, 0]}]
    }"#;

    #[test]
    fn test_import_sample() {
        let db = Database::open_in_memory().unwrap();
        let summary = import_json(&db, SAMPLE).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                tracks: 3,
                tracks_with_features: 1,
                track_lists: 1,
            }
        );

        let counts = db.counts().unwrap();
        assert_eq!(counts.releases, 1);
        assert_eq!(counts.artists, 2);

        let ids = db.list_track_ids().unwrap();
        assert_eq!(db.track_artist_links(ids[0]).unwrap().len(), 2);
        assert_eq!(
            db.track_artist_links(ids[1]).unwrap()[0].link_type,
            LinkType::Artist
        );
        assert_eq!(db.track_release(ids[0]).unwrap(), db.track_release(ids[1]).unwrap());
        assert!(db.get_track_features(ids[1]).unwrap().is_none());
    }

    #[test]
    fn test_track_list_order_is_kept() {
        let db = Database::open_in_memory().unwrap();
        import_json(&db, SAMPLE).unwrap();
        let ids = db.list_track_ids().unwrap();
        let list = sonority_core::model::TrackListId::new(1);
        assert_eq!(db.track_list_tracks(list).unwrap(), vec![ids[2], ids[0]]);
    }

    #[test]
    fn test_bad_track_list_index_is_rejected_before_writing() {
        let db = Database::open_in_memory().unwrap();
        let err = import_json(
            &db,
            r#"{"tracks": [{"name": "a"}], "track_lists": [{"name": "l", "tracks": [1]}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("track #1"));
        assert_eq!(db.counts().unwrap().tracks, 0);
    }

    #[test]
    fn test_failed_import_leaves_no_partial_records() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute_batch(
                "CREATE TEMP TRIGGER reject_track BEFORE INSERT ON tracks
                 WHEN NEW.name = 'Naima'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        assert!(import_json(&db, SAMPLE).is_err());
        let counts = db.counts().unwrap();
        assert_eq!(
            (counts.tracks, counts.releases, counts.artists, counts.tracks_with_features),
            (0, 0, 0, 0)
        );
    }
}
