use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::model::ids::ArtistId;

/// The role an artist plays on a track.
///
/// Artist similarity is computed per link type: the composers of a track and
/// its performers land in different matrices even when they share the same
/// grid positions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Artist,
    ReleaseArtist,
    Arranger,
    Composer,
    Conductor,
    Lyricist,
    Mixer,
    Performer,
    Producer,
    Remixer,
    Writer,
}

impl LinkType {
    pub const ALL: [Self; 11] = [
        Self::Artist,
        Self::ReleaseArtist,
        Self::Arranger,
        Self::Composer,
        Self::Conductor,
        Self::Lyricist,
        Self::Mixer,
        Self::Performer,
        Self::Producer,
        Self::Remixer,
        Self::Writer,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Artist => "artist",
            Self::ReleaseArtist => "release_artist",
            Self::Arranger => "arranger",
            Self::Composer => "composer",
            Self::Conductor => "conductor",
            Self::Lyricist => "lyricist",
            Self::Mixer => "mixer",
            Self::Performer => "performer",
            Self::Producer => "producer",
            Self::Remixer => "remixer",
            Self::Writer => "writer",
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|link_type| link_type.as_str() == normalized)
            .ok_or_else(|| Error::UnknownLinkType(s.to_string()))
    }
}

/// A musical artist (person or group).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: ArtistId,
    pub name: String,
    pub sort_name: Option<String>,
}

/// An artist credited on a track in a given role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtistLink {
    pub artist_id: ArtistId,
    pub link_type: LinkType,
}
