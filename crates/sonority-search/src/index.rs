//! Object/position indices and the snapshot bundling them with a network.

use std::collections::{BTreeMap, BTreeSet};

use sonority_core::model::{ArtistId, LinkType, ReleaseId, TrackId};

use crate::cancel::{CancelCheck, CancellationToken};
use crate::error::LoadResult;
use crate::network::{GridPosition, Network};
use crate::ports::MediaLibrary;

/// Number of tracks indexed between two cancellation checks.
const INDEX_BATCH_SIZE: usize = 256;

/// Position index and grid matrix of one category of objects.
///
/// The two maps are only ever filled together through
/// [`CategoryIndex::insert`], so every `(object, position)` pair present in
/// one is present in the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryIndex<Id: Ord> {
    positions: BTreeMap<Id, Vec<GridPosition>>,
    matrix: BTreeMap<GridPosition, BTreeSet<Id>>,
}

impl<Id: Ord> Default for CategoryIndex<Id> {
    fn default() -> Self {
        Self {
            positions: BTreeMap::new(),
            matrix: BTreeMap::new(),
        }
    }
}

impl<Id: Copy + Ord> CategoryIndex<Id> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from per-object position lists.
    pub fn from_positions<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Id, P)>,
        P: IntoIterator<Item = GridPosition>,
    {
        let mut index = Self::new();
        for (id, positions) in entries {
            for position in positions {
                index.insert(id, position);
            }
        }
        index
    }

    /// Record that `id` matched the cell at `position`.
    pub fn insert(&mut self, id: Id, position: GridPosition) {
        let positions = self.positions.entry(id).or_default();
        if !positions.contains(&position) {
            positions.push(position);
        }
        self.matrix.entry(position).or_default().insert(id);
    }

    /// Positions of an object, in the order they were first matched.
    pub fn positions(&self, id: Id) -> &[GridPosition] {
        self.positions.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Objects whose closest cell is `position`, in id order.
    pub fn objects_at(&self, position: GridPosition) -> impl Iterator<Item = Id> + '_ {
        self.matrix.get(&position).into_iter().flatten().copied()
    }

    /// Distinct positions of all `ids`, in first-seen order.
    pub fn matching_positions(&self, ids: &[Id]) -> Vec<GridPosition> {
        let mut result = Vec::new();
        for &id in ids {
            for &position in self.positions(id) {
                if !result.contains(&position) {
                    result.push(position);
                }
            }
        }
        result
    }

    pub fn contains(&self, id: Id) -> bool {
        self.positions.contains_key(&id)
    }

    /// Number of indexed objects.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id, &[GridPosition])> + '_ {
        self.positions.iter().map(|(id, p)| (*id, p.as_slice()))
    }

    /// Check that the position index and the grid matrix describe exactly the
    /// same `(object, position)` pairs.
    pub fn is_consistent(&self) -> bool {
        let forward = self
            .positions
            .iter()
            .all(|(id, positions)| {
                positions
                    .iter()
                    .all(|p| self.matrix.get(p).is_some_and(|ids| ids.contains(id)))
            });
        let backward = self.matrix.iter().all(|(position, ids)| {
            ids.iter()
                .all(|id| self.positions(*id).contains(position))
        });
        forward && backward
    }
}

/// A trained network with the indices of every category, installed as one
/// immutable unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    network: Network,
    tracks: CategoryIndex<TrackId>,
    releases: CategoryIndex<ReleaseId>,
    artists: BTreeMap<LinkType, CategoryIndex<ArtistId>>,
}

impl Snapshot {
    pub fn new(
        network: Network,
        tracks: CategoryIndex<TrackId>,
        releases: CategoryIndex<ReleaseId>,
        artists: BTreeMap<LinkType, CategoryIndex<ArtistId>>,
    ) -> Self {
        Self {
            network,
            tracks,
            releases,
            artists,
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn tracks(&self) -> &CategoryIndex<TrackId> {
        &self.tracks
    }

    pub fn releases(&self) -> &CategoryIndex<ReleaseId> {
        &self.releases
    }

    pub fn artists(&self, link_type: LinkType) -> Option<&CategoryIndex<ArtistId>> {
        self.artists.get(&link_type)
    }

    pub fn artist_link_types(&self) -> impl Iterator<Item = LinkType> + '_ {
        self.artists.keys().copied()
    }

    pub fn is_consistent(&self) -> bool {
        self.tracks.is_consistent()
            && self.releases.is_consistent()
            && self.artists.values().all(CategoryIndex::is_consistent)
    }
}

/// Builds every category index of a snapshot in a single pass over the
/// track assignments.
pub struct SnapshotBuilder<'a> {
    library: &'a dyn MediaLibrary,
    cancel: &'a CancellationToken,
}

impl std::fmt::Debug for SnapshotBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotBuilder").finish_non_exhaustive()
    }
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(library: &'a dyn MediaLibrary, cancel: &'a CancellationToken) -> Self {
        Self { library, cancel }
    }

    /// Assign each track sample to its closest cell and index the tracks,
    /// their releases and their artists by link type.
    ///
    /// `samples` pairs track ids with their (normalized) feature vectors.
    /// Tracks are looked up in the library once each.
    pub fn build(
        &self,
        network: Network,
        samples: &[(TrackId, Vec<f64>)],
        progress: &dyn Fn(f64),
    ) -> LoadResult<Snapshot> {
        let mut track_positions: BTreeMap<TrackId, Vec<GridPosition>> = BTreeMap::new();
        for (i, (track_id, sample)) in samples.iter().enumerate() {
            if i % INDEX_BATCH_SIZE == 0 {
                self.cancel.check()?;
            }
            let position = network.closest_position(sample);
            let positions = track_positions.entry(*track_id).or_default();
            if !positions.contains(&position) {
                positions.push(position);
            }
        }

        let mut tracks = CategoryIndex::new();
        let mut releases = CategoryIndex::new();
        let mut artists: BTreeMap<LinkType, CategoryIndex<ArtistId>> = BTreeMap::new();

        let total = track_positions.len().max(1);
        for (i, (track_id, positions)) in track_positions.iter().enumerate() {
            if i % INDEX_BATCH_SIZE == 0 {
                self.cancel.check()?;
                progress(i as f64 / total as f64);
            }

            let release = self.library.track_release(*track_id)?;
            let links = self.library.track_artist_links(*track_id)?;

            for &position in positions {
                tracks.insert(*track_id, position);
                if let Some(release_id) = release {
                    releases.insert(release_id, position);
                }
                for link in &links {
                    artists
                        .entry(link.link_type)
                        .or_default()
                        .insert(link.artist_id, position);
                }
            }
        }
        progress(1.0);

        log::info!(
            "Indexed {} tracks, {} releases and {} artist link types",
            tracks.len(),
            releases.len(),
            artists.len()
        );

        Ok(Snapshot::new(network, tracks, releases, artists))
    }
}
