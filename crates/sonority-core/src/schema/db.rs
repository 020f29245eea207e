use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::{
    Artist, ArtistId, ArtistLink, FeatureMap, LinkType, Release, ReleaseId, Track, TrackId,
    TrackList, TrackListId, TrackListKind,
};

use super::migrations::MIGRATIONS;

/// Row counts of the main library tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LibraryCounts {
    pub tracks: usize,
    pub tracks_with_features: usize,
    pub releases: usize,
    pub artists: usize,
    pub track_lists: usize,
}

/// A database connection with CRUD methods for library entities.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database at the given path and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Get a reference to the underlying connection (for advanced queries).
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` in a transaction: committed when `f` returns `Ok`, rolled
    /// back otherwise.
    pub fn in_transaction<T, E>(
        &self,
        f: impl FnOnce(&Self) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<Error>,
    {
        let tx = self.conn.unchecked_transaction().map_err(Error::from)?;
        let value = f(self)?;
        tx.commit().map_err(Error::from)?;
        Ok(value)
    }

    fn apply_migrations(&self) -> Result<()> {
        // Foreign key enforcement is per connection, not per database file
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        let mut stmt = self
            .conn
            .prepare("SELECT version FROM schema_migrations ORDER BY version")?;
        let applied: Vec<u32> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for migration in MIGRATIONS {
            if !applied.contains(&migration.version) {
                log::info!(
                    "Applying migration {} ({})",
                    migration.version,
                    migration.name
                );
                self.conn.execute_batch(migration.sql)?;
                self.conn.execute(
                    "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    rusqlite::params![migration.version, migration.name],
                )?;
            }
        }

        Ok(())
    }

    /// Count the rows of the main library tables.
    pub fn counts(&self) -> Result<LibraryCounts> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
            Ok(usize::try_from(n).unwrap_or(0))
        };

        Ok(LibraryCounts {
            tracks: count("tracks")?,
            tracks_with_features: count("track_features")?,
            releases: count("releases")?,
            artists: count("artists")?,
            track_lists: count("track_lists")?,
        })
    }
}

// Artist and release CRUD
impl Database {
    /// Insert a new artist.
    pub fn insert_artist(&self, name: &str, sort_name: Option<&str>) -> Result<ArtistId> {
        self.conn.execute(
            "INSERT INTO artists (name, sort_name) VALUES (?1, ?2)",
            rusqlite::params![name, sort_name],
        )?;
        Ok(ArtistId::new(self.conn.last_insert_rowid()))
    }

    /// Find an artist by exact name, creating it when missing.
    pub fn find_or_insert_artist(&self, name: &str) -> Result<ArtistId> {
        let existing: Option<ArtistId> = self
            .conn
            .query_row(
                "SELECT id FROM artists WHERE name = ?1 ORDER BY id LIMIT 1",
                [name],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => Ok(id),
            None => self.insert_artist(name, None),
        }
    }

    pub fn get_artist(&self, id: ArtistId) -> Result<Option<Artist>> {
        let artist = self
            .conn
            .query_row(
                "SELECT id, name, sort_name FROM artists WHERE id = ?1",
                [id],
                |row| {
                    Ok(Artist {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        sort_name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(artist)
    }

    /// Insert a new release.
    pub fn insert_release(&self, name: &str) -> Result<ReleaseId> {
        self.conn
            .execute("INSERT INTO releases (name) VALUES (?1)", [name])?;
        Ok(ReleaseId::new(self.conn.last_insert_rowid()))
    }

    /// Find a release by exact name, creating it when missing.
    pub fn find_or_insert_release(&self, name: &str) -> Result<ReleaseId> {
        let existing: Option<ReleaseId> = self
            .conn
            .query_row(
                "SELECT id FROM releases WHERE name = ?1 ORDER BY id LIMIT 1",
                [name],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => Ok(id),
            None => self.insert_release(name),
        }
    }

    pub fn get_release(&self, id: ReleaseId) -> Result<Option<Release>> {
        let release = self
            .conn
            .query_row("SELECT id, name FROM releases WHERE id = ?1", [id], |row| {
                Ok(Release {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .optional()?;
        Ok(release)
    }
}

// Track CRUD
impl Database {
    /// Insert a new track.
    pub fn insert_track(&self, name: &str, release_id: Option<ReleaseId>) -> Result<TrackId> {
        self.conn.execute(
            "INSERT INTO tracks (name, release_id) VALUES (?1, ?2)",
            rusqlite::params![name, release_id],
        )?;
        Ok(TrackId::new(self.conn.last_insert_rowid()))
    }

    /// Credit an artist on a track. Crediting the same artist twice in the
    /// same role is a no-op.
    pub fn link_artist(
        &self,
        track_id: TrackId,
        artist_id: ArtistId,
        link_type: LinkType,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO track_artist_links (track_id, artist_id, link_type)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![track_id, artist_id, link_type.as_str()],
        )?;
        Ok(())
    }

    /// Get a track with its artist links.
    pub fn get_track(&self, id: TrackId) -> Result<Option<Track>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, release_id FROM tracks WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, TrackId>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<ReleaseId>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, name, release_id)) = row else {
            return Ok(None);
        };

        Ok(Some(Track {
            id,
            name,
            release_id,
            artist_links: self.track_artist_links(id)?,
        }))
    }

    /// List the ids of every track, in insertion order.
    pub fn list_track_ids(&self) -> Result<Vec<TrackId>> {
        let mut stmt = self.conn.prepare("SELECT id FROM tracks ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    pub fn track_release(&self, id: TrackId) -> Result<Option<ReleaseId>> {
        let release = self
            .conn
            .query_row("SELECT release_id FROM tracks WHERE id = ?1", [id], |row| {
                row.get::<_, Option<ReleaseId>>(0)
            })
            .optional()?;
        Ok(release.flatten())
    }

    pub fn track_artist_links(&self, id: TrackId) -> Result<Vec<ArtistLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT artist_id, link_type FROM track_artist_links
             WHERE track_id = ?1
             ORDER BY artist_id, link_type",
        )?;
        let rows = stmt
            .query_map([id], |row| {
                Ok((row.get::<_, ArtistId>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(artist_id, link_type)| -> Result<ArtistLink> {
                Ok(ArtistLink {
                    artist_id,
                    link_type: link_type.parse()?,
                })
            })
            .collect()
    }

    /// Store (or replace) the audio features of a track.
    pub fn set_track_features(&self, id: TrackId, features: &FeatureMap) -> Result<()> {
        self.conn.execute(
            "INSERT INTO track_features (track_id, data) VALUES (?1, ?2)
             ON CONFLICT(track_id) DO UPDATE SET data = excluded.data",
            rusqlite::params![id, serde_json::to_string(features)?],
        )?;
        Ok(())
    }

    /// Get the audio features of a track, `None` when none were stored.
    pub fn get_track_features(&self, id: TrackId) -> Result<Option<FeatureMap>> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM track_features WHERE track_id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;

        data.map(|json| serde_json::from_str(&json).map_err(Error::from))
            .transpose()
    }
}

// Track list CRUD
impl Database {
    pub fn create_track_list(&self, name: &str, kind: TrackListKind) -> Result<TrackListId> {
        self.conn.execute(
            "INSERT INTO track_lists (name, kind) VALUES (?1, ?2)",
            rusqlite::params![name, kind.as_str()],
        )?;
        Ok(TrackListId::new(self.conn.last_insert_rowid()))
    }

    pub fn get_track_list(&self, id: TrackListId) -> Result<Option<TrackList>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, kind FROM track_lists WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, TrackListId>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, name, kind)| -> Result<TrackList> {
            let kind = match kind.as_str() {
                "playlist" => TrackListKind::Playlist,
                "internal" => TrackListKind::Internal,
                other => {
                    return Err(Error::InvalidData(format!("unknown track list kind: {other}")))
                }
            };
            Ok(TrackList { id, name, kind })
        })
        .transpose()
    }

    /// Append a track at the end of a track list.
    pub fn append_track_list_entry(&self, list_id: TrackListId, track_id: TrackId) -> Result<()> {
        if self.get_track_list(list_id)?.is_none() {
            return Err(Error::NotFound {
                entity: "track list",
                id: list_id.value(),
            });
        }
        self.conn.execute(
            "INSERT INTO track_list_entries (track_list_id, track_id) VALUES (?1, ?2)",
            rusqlite::params![list_id, track_id],
        )?;
        Ok(())
    }

    /// Tracks of a list in entry order. Unknown lists have no tracks.
    pub fn track_list_tracks(&self, list_id: TrackListId) -> Result<Vec<TrackId>> {
        let mut stmt = self.conn.prepare(
            "SELECT track_id FROM track_list_entries
             WHERE track_list_id = ?1
             ORDER BY id",
        )?;
        let ids = stmt
            .query_map([list_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}
