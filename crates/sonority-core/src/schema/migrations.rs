/// A schema migration.
#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATION_001: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Artists
CREATE TABLE IF NOT EXISTS artists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    sort_name TEXT
);

CREATE INDEX IF NOT EXISTS idx_artists_name ON artists(name);

-- Releases
CREATE TABLE IF NOT EXISTS releases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);

-- Tracks
CREATE TABLE IF NOT EXISTS tracks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    release_id INTEGER REFERENCES releases(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_tracks_release_id ON tracks(release_id);

-- Track artist links (an artist may be credited several times in different roles)
CREATE TABLE IF NOT EXISTS track_artist_links (
    track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
    artist_id INTEGER NOT NULL REFERENCES artists(id) ON DELETE CASCADE,
    link_type TEXT NOT NULL,
    PRIMARY KEY (track_id, artist_id, link_type)
);

CREATE INDEX IF NOT EXISTS idx_track_artist_links_artist_id ON track_artist_links(artist_id);

-- Track lists (playlists, play queues)
CREATE TABLE IF NOT EXISTS track_lists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    kind TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS track_list_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    track_list_id INTEGER NOT NULL REFERENCES track_lists(id) ON DELETE CASCADE,
    track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_track_list_entries_list ON track_list_entries(track_list_id);
"#;

const MIGRATION_002: &str = r#"
-- Audio features, one JSON document per track (feature name -> components)
CREATE TABLE IF NOT EXISTS track_features (
    track_id INTEGER PRIMARY KEY REFERENCES tracks(id) ON DELETE CASCADE,
    data TEXT NOT NULL
);
"#;

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: MIGRATION_001,
    },
    Migration {
        version: 2,
        name: "track_features",
        sql: MIGRATION_002,
    },
];
