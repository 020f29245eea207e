pub mod artist;
pub mod ids;
pub mod track;

pub use artist::{Artist, ArtistLink, LinkType};
pub use ids::{ArtistId, ReleaseId, TrackId, TrackListId};
pub use track::{FeatureMap, Release, Track, TrackList, TrackListKind};
