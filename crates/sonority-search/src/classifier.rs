//! The capability interface of similarity engines.

use sonority_core::model::{ArtistId, LinkType, ReleaseId, TrackId, TrackListId};

use crate::error::LoadResult;

/// Where a successful load got its snapshot from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Cache,
    Training,
}

/// A loadable engine answering "what is similar to this" queries.
///
/// Queries never fail: before the first successful load, or when nothing
/// about the inputs is known, they return an empty list.
pub trait SimilarityClassifier: Send + Sync {
    /// Short identifier of the engine, for logs and status output.
    fn name(&self) -> &str;

    /// Load the engine from its cache, or train it when the cache is missing
    /// or unusable or when `force_retrain` is set.
    ///
    /// On error the previously loaded state stays in place.
    fn load(&self, force_retrain: bool, progress: &dyn Fn(f64)) -> LoadResult<LoadSource>;

    /// Ask a running load to stop. Does nothing when no load is running.
    fn request_cancel_load(&self);

    fn is_ready(&self) -> bool;

    fn similar_tracks(&self, track_ids: &[TrackId], max_count: usize) -> Vec<TrackId>;

    /// Tracks similar to the contents of a track list.
    fn similar_tracks_from_list(&self, track_list_id: TrackListId, max_count: usize)
        -> Vec<TrackId>;

    fn similar_releases(&self, release_id: ReleaseId, max_count: usize) -> Vec<ReleaseId>;

    /// Artists similar to `artist_id` through any of `link_types`, results
    /// of earlier link types first.
    fn similar_artists(
        &self,
        artist_id: ArtistId,
        link_types: &[LinkType],
        max_count: usize,
    ) -> Vec<ArtistId>;
}
