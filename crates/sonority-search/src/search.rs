//! Expanding-radius similarity search over a category index.

use std::collections::BTreeSet;

use crate::index::CategoryIndex;
use crate::network::Network;

/// Fraction of the median adjacent reference-vector distance beyond which the
/// search stops growing its frontier.
pub const SEARCH_CUTOFF_FACTOR: f64 = 0.75;

/// Objects similar to `seeds`, closest cells first.
///
/// Starts from the cells of the seeds and, while fewer than `max_count`
/// objects were found, grows the frontier by the single closest adjacent cell
/// within [`SEARCH_CUTOFF_FACTOR`] × the network's median distance. Seeds are
/// never returned and each object appears at most once.
pub fn similar_objects<Id: Copy + Ord>(
    seeds: &[Id],
    index: &CategoryIndex<Id>,
    network: &Network,
    max_count: usize,
) -> Vec<Id> {
    let mut result = Vec::new();
    if max_count == 0 {
        return result;
    }

    let mut frontier = index.matching_positions(seeds);
    if frontier.is_empty() {
        return result;
    }

    let seeds: BTreeSet<Id> = seeds.iter().copied().collect();
    let mut found: BTreeSet<Id> = BTreeSet::new();
    let max_distance = network.ref_vectors_distance_median() * SEARCH_CUTOFF_FACTOR;

    // Cells scanned in an earlier pass can only yield objects already found.
    let mut scanned = 0;
    loop {
        for &position in &frontier[scanned..] {
            for id in index.objects_at(position) {
                if seeds.contains(&id) || !found.insert(id) {
                    continue;
                }
                result.push(id);
                if result.len() == max_count {
                    return result;
                }
            }
        }
        scanned = frontier.len();

        match network.closest_ref_vector_position(&frontier, max_distance) {
            Some(position) => frontier.push(position),
            None => break,
        }
    }

    result
}

/// Merge several ranked result lists, keeping first occurrences, up to
/// `max_count` entries.
pub fn merge_ranked<Id: Copy + Ord>(
    lists: impl IntoIterator<Item = Vec<Id>>,
    max_count: usize,
) -> Vec<Id> {
    let mut seen = BTreeSet::new();
    let mut merged = Vec::new();
    for id in lists.into_iter().flatten() {
        if merged.len() == max_count {
            break;
        }
        if seen.insert(id) {
            merged.push(id);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::GridPosition;
    use sonority_core::model::TrackId;

    const A: TrackId = TrackId::new(1);
    const B: TrackId = TrackId::new(2);
    const C: TrackId = TrackId::new(3);
    const D: TrackId = TrackId::new(4);

    fn p(row: usize, column: usize) -> GridPosition {
        GridPosition::new(row, column)
    }

    /// 2x2 one-dimensional network with cells (0,0), (0,1), (1,0), (1,1).
    fn network(values: [f64; 4]) -> Network {
        Network::from_ref_vectors(2, 2, vec![1.0], values.iter().map(|v| vec![*v]).collect())
            .unwrap()
    }

    fn index() -> CategoryIndex<TrackId> {
        CategoryIndex::from_positions([
            (A, vec![p(0, 0)]),
            (B, vec![p(0, 0)]),
            (C, vec![p(0, 1)]),
            (D, vec![p(1, 1)]),
        ])
    }

    #[test]
    fn test_same_cell_first_then_closest_neighbour() {
        // Median 5.0, cutoff 3.75; (0,0)-(0,1) is 0.1 apart.
        let network = network([0.0, 0.1, 5.0, 10.0]);
        assert_eq!(similar_objects(&[A], &index(), &network, 2), vec![B, C]);
    }

    #[test]
    fn test_fewer_results_when_nothing_within_cutoff() {
        // Adjacent distances 4, 5, 5, 6: median 5, cutoff 3.75.
        let network = network([0.0, 4.0, 5.0, 10.0]);
        assert_eq!(similar_objects(&[A], &index(), &network, 5), vec![B]);
    }

    #[test]
    fn test_walks_the_grid_along_close_cells() {
        // (0,0) -> (0,1) -> (1,1) are 0.1 apart, (1,0) is far from everything.
        let network = network([0.0, 0.1, 10.2, 0.2]);
        let result = similar_objects(&[A], &index(), &network, 10);
        assert_eq!(result, vec![B, C, D]);
    }

    #[test]
    fn test_seeds_never_returned() {
        let network = network([0.0, 0.1, 10.2, 0.2]);
        let result = similar_objects(&[A, C], &index(), &network, 10);
        assert!(!result.contains(&A));
        assert!(!result.contains(&C));
        assert_eq!(result, vec![B, D]);
    }

    #[test]
    fn test_empty_inputs() {
        let network = network([0.0, 0.1, 10.2, 0.2]);
        assert!(similar_objects(&[], &index(), &network, 3).is_empty());
        assert!(similar_objects(&[TrackId::new(99)], &index(), &network, 3).is_empty());
        assert!(similar_objects(&[A], &index(), &network, 0).is_empty());
    }

    #[test]
    fn test_merge_ranked() {
        let merged = merge_ranked([vec![B, C], vec![C, D, A]], 3);
        assert_eq!(merged, vec![B, C, D]);
        assert!(merge_ranked(Vec::<Vec<TrackId>>::new(), 3).is_empty());
    }
}
