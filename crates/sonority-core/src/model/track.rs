use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::artist::ArtistLink;
use crate::model::ids::{ReleaseId, TrackId, TrackListId};

/// Named audio features of a track, as produced by an external analyzer.
///
/// Keys are dotted feature names (`lowlevel.mfcc.mean`), values are the raw
/// components of that feature.
pub type FeatureMap = BTreeMap<String, Vec<f64>>;

/// A track in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,

    /// The release this track belongs to, if known.
    pub release_id: Option<ReleaseId>,

    /// Credited artists with their roles.
    pub artist_links: Vec<ArtistLink>,
}

/// A release (album).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: ReleaseId,
    pub name: String,
}

/// Whether a track list is user controlled or used internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackListKind {
    Playlist,
    Internal,
}

impl TrackListKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Playlist => "playlist",
            Self::Internal => "internal",
        }
    }
}

/// An ordered list of tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackList {
    pub id: TrackListId,
    pub name: String,
    pub kind: TrackListKind,
}
