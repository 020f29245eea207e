//! Collaborators the engine consumes, and their SQLite implementations.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use sonority_core::model::{ArtistLink, FeatureMap, ReleaseId, TrackId, TrackListId};
use sonority_core::schema::Database;
use sonority_core::{Error, Result};

/// Supplies the audio features of tracks.
pub trait FeatureProvider: Send + Sync {
    /// Fetch the requested features of a track.
    ///
    /// `Ok(None)` means the track has no features and must be left out of
    /// the indices; it is not an error.
    fn fetch(&self, track_id: TrackId, features: &BTreeSet<String>) -> Result<Option<FeatureMap>>;
}

/// Read access to the library objects the engine indexes.
pub trait MediaLibrary: Send + Sync {
    /// Every track that may be indexed.
    fn track_ids(&self) -> Result<Vec<TrackId>>;

    fn track_release(&self, track_id: TrackId) -> Result<Option<ReleaseId>>;

    fn track_artist_links(&self, track_id: TrackId) -> Result<Vec<ArtistLink>>;

    /// Tracks of a list, in list order. Unknown lists have no tracks.
    fn track_list_tracks(&self, track_list_id: TrackListId) -> Result<Vec<TrackId>>;
}

/// The library store, shared behind a mutex so the engine can be used from
/// several threads.
#[derive(Debug)]
pub struct SqliteLibrary {
    db: Mutex<Database>,
}

impl SqliteLibrary {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let db = self
            .db
            .lock()
            .map_err(|_| Error::InvalidData("library connection lock poisoned".to_string()))?;
        f(&*db)
    }
}

impl MediaLibrary for SqliteLibrary {
    fn track_ids(&self) -> Result<Vec<TrackId>> {
        self.with_db(Database::list_track_ids)
    }

    fn track_release(&self, track_id: TrackId) -> Result<Option<ReleaseId>> {
        self.with_db(|db| db.track_release(track_id))
    }

    fn track_artist_links(&self, track_id: TrackId) -> Result<Vec<ArtistLink>> {
        self.with_db(|db| db.track_artist_links(track_id))
    }

    fn track_list_tracks(&self, track_list_id: TrackListId) -> Result<Vec<TrackId>> {
        self.with_db(|db| db.track_list_tracks(track_list_id))
    }
}

impl FeatureProvider for SqliteLibrary {
    fn fetch(&self, track_id: TrackId, features: &BTreeSet<String>) -> Result<Option<FeatureMap>> {
        let stored = self.with_db(|db| db.get_track_features(track_id))?;
        Ok(stored.map(|all| {
            all.into_iter()
                .filter(|(name, _)| features.contains(name))
                .collect()
        }))
    }
}
