//! Persisted form of a [`Snapshot`].
//!
//! A cache blob is the zlib-compressed JSON of the network and the per-object
//! position lists of every category. Grid matrices are not stored; they are
//! rebuilt from the positions on decode.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use sonority_core::model::{ArtistId, LinkType, ReleaseId, TrackId};

use crate::error::CacheError;
use crate::index::{CategoryIndex, Snapshot};
use crate::network::{GridPosition, Network};
use crate::settings::TrainSettings;

/// Tag identifying sonority cache blobs.
pub const CACHE_FORMAT: &str = "sonority.som-cache";

/// Bumped whenever the layout of [`CacheRepr`] changes.
pub const CACHE_VERSION: u32 = 1;

type Positions<Id> = Vec<(Id, Vec<GridPosition>)>;

#[derive(Debug, Deserialize)]
struct CacheHeader {
    format: String,
    version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRepr {
    format: String,
    version: u32,
    rows: usize,
    columns: usize,
    dimension: usize,
    weights: Vec<f64>,
    ref_vectors: Vec<Vec<f64>>,
    tracks: Positions<TrackId>,
    releases: Positions<ReleaseId>,
    artists: Vec<(LinkType, Positions<ArtistId>)>,
}

fn positions_of<Id: Copy + Ord>(index: &CategoryIndex<Id>) -> Positions<Id> {
    index.iter().map(|(id, p)| (id, p.to_vec())).collect()
}

/// Serialize a snapshot into a cache blob.
pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>, CacheError> {
    let network = snapshot.network();
    let repr = CacheRepr {
        format: CACHE_FORMAT.to_string(),
        version: CACHE_VERSION,
        rows: network.rows(),
        columns: network.columns(),
        dimension: network.dimension(),
        weights: network.weights().to_vec(),
        ref_vectors: network.ref_vectors().to_vec(),
        tracks: positions_of(snapshot.tracks()),
        releases: positions_of(snapshot.releases()),
        artists: snapshot
            .artist_link_types()
            .filter_map(|link_type| {
                snapshot
                    .artists(link_type)
                    .map(|index| (link_type, positions_of(index)))
            })
            .collect(),
    };

    let json = serde_json::to_vec(&repr)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Rebuild a snapshot from a cache blob.
///
/// Every problem with the blob (corruption, unknown format or version,
/// dimension other than `expected_dimension`, inconsistent grid shape,
/// positions outside the grid) yields [`CacheError::Incompatible`].
pub fn decode(blob: &[u8], expected_dimension: usize) -> Result<Snapshot, CacheError> {
    let mut json = Vec::new();
    ZlibDecoder::new(blob)
        .read_to_end(&mut json)
        .map_err(|e| incompatible(format!("cannot decompress: {e}")))?;

    let header: CacheHeader = serde_json::from_slice(&json)
        .map_err(|e| incompatible(format!("unreadable header: {e}")))?;
    if header.format != CACHE_FORMAT {
        return Err(incompatible(format!("unknown format {:?}", header.format)));
    }
    if header.version != CACHE_VERSION {
        return Err(incompatible(format!(
            "version {} (expected {CACHE_VERSION})",
            header.version
        )));
    }

    let repr: CacheRepr = serde_json::from_slice(&json)
        .map_err(|e| incompatible(format!("unreadable body: {e}")))?;
    if repr.dimension != expected_dimension {
        return Err(incompatible(format!(
            "dimension {} (expected {expected_dimension})",
            repr.dimension
        )));
    }
    if repr.weights.len() != repr.dimension {
        return Err(incompatible(format!(
            "{} weights for dimension {}",
            repr.weights.len(),
            repr.dimension
        )));
    }

    let network = Network::from_ref_vectors(repr.rows, repr.columns, repr.weights, repr.ref_vectors)
        .map_err(|e| incompatible(e.to_string()))?;

    let tracks = rebuild(&network, repr.tracks)?;
    let releases = rebuild(&network, repr.releases)?;
    let mut artists = std::collections::BTreeMap::new();
    for (link_type, positions) in repr.artists {
        if artists.insert(link_type, rebuild(&network, positions)?).is_some() {
            return Err(incompatible(format!("duplicate artist index {link_type}")));
        }
    }

    Ok(Snapshot::new(network, tracks, releases, artists))
}

/// Rebuild a snapshot from a cache blob and check that it was trained with
/// the sample layout and feature weights of `settings`.
pub fn decode_for(blob: &[u8], settings: &TrainSettings) -> Result<Snapshot, CacheError> {
    let snapshot = decode(blob, settings.dimension())?;
    if snapshot.network().weights() != settings.dimension_weights().as_slice() {
        return Err(incompatible("trained with other feature weights".to_string()));
    }
    Ok(snapshot)
}

fn rebuild<Id: Copy + Ord>(
    network: &Network,
    entries: Positions<Id>,
) -> Result<CategoryIndex<Id>, CacheError> {
    if let Some(position) = entries
        .iter()
        .flat_map(|(_, positions)| positions)
        .find(|p| !network.contains(**p))
    {
        return Err(incompatible(format!(
            "position ({}, {}) outside the {}x{} grid",
            position.row,
            position.column,
            network.rows(),
            network.columns()
        )));
    }
    Ok(CategoryIndex::from_positions(entries))
}

fn incompatible(reason: String) -> CacheError {
    CacheError::Incompatible(reason)
}
