//! The reference-vector network (self-organizing map).
//!
//! A network is a `rows × columns` grid of reference vectors. Training pulls
//! the vector closest to each sample (the winner) and its grid neighbourhood
//! toward the sample, so that grid-adjacent cells end up describing nearby
//! regions of the feature space. Once trained, the network is immutable.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::cancel::{CancelCheck, CancellationToken};
use crate::error::{LoadError, LoadResult, ShapeError};
use crate::settings::TrainSettings;

/// Learning rate of the first iteration.
const LEARNING_RATE_START: f64 = 0.5;

/// Learning rate of the last iteration.
const LEARNING_RATE_END: f64 = 0.01;

/// Position of a cell in the grid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GridPosition {
    pub row: usize,
    pub column: usize,
}

impl GridPosition {
    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    fn grid_distance(self, other: Self) -> f64 {
        let dr = self.row.abs_diff(other.row) as f64;
        let dc = self.column.abs_diff(other.column) as f64;
        dr.hypot(dc)
    }
}

/// Neighbourhood radius and learning rate of one training iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecaySchedule {
    pub radius: f64,
    pub learning_rate: f64,
}

impl DecaySchedule {
    /// Linear decay from half the grid side down to the winner alone, and
    /// from [`LEARNING_RATE_START`] down to [`LEARNING_RATE_END`].
    pub fn at(iteration: usize, iteration_count: usize, grid_side: usize) -> Self {
        let t = if iteration_count > 1 {
            iteration.min(iteration_count - 1) as f64 / (iteration_count - 1) as f64
        } else {
            1.0
        };
        let initial_radius = grid_side.saturating_sub(1) as f64 / 2.0;

        Self {
            radius: initial_radius * (1.0 - t),
            learning_rate: LEARNING_RATE_START + (LEARNING_RATE_END - LEARNING_RATE_START) * t,
        }
    }

    fn influence(&self, grid_distance: f64) -> f64 {
        if grid_distance > self.radius {
            0.0
        } else if self.radius <= f64::EPSILON {
            1.0
        } else {
            (-(grid_distance * grid_distance) / (2.0 * self.radius * self.radius)).exp()
        }
    }
}

/// Largest number of cells a trained grid may have.
pub const MAX_GRID_CELLS: usize = 1 << 20;

/// Side of the square grid trained for `sample_count` samples.
///
/// Fails when the ratio asks for more than [`MAX_GRID_CELLS`] cells.
pub fn grid_side(sample_count: usize, sample_count_per_neuron: f64) -> LoadResult<usize> {
    let cells = (sample_count as f64 / sample_count_per_neuron).ceil();
    if !cells.is_finite() || cells > MAX_GRID_CELLS as f64 {
        return Err(LoadError::InvalidSettings(format!(
            "{sample_count} samples at {sample_count_per_neuron} per neuron need more than \
             {MAX_GRID_CELLS} grid cells"
        )));
    }
    Ok((cells.sqrt().ceil() as usize).max(1))
}

/// A trained grid of reference vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    rows: usize,
    columns: usize,
    weights: Vec<f64>,
    ref_vectors: Vec<Vec<f64>>,
    ref_vectors_distance_median: f64,
}

impl Network {
    /// Build a network from existing reference vectors, given in row-major
    /// order.
    pub fn from_ref_vectors(
        rows: usize,
        columns: usize,
        weights: Vec<f64>,
        ref_vectors: Vec<Vec<f64>>,
    ) -> Result<Self, ShapeError> {
        if rows == 0 || columns == 0 {
            return Err(ShapeError(format!("empty grid {rows}x{columns}")));
        }
        if ref_vectors.len() != rows * columns {
            return Err(ShapeError(format!(
                "{} reference vectors for a {rows}x{columns} grid",
                ref_vectors.len()
            )));
        }
        let dimension = weights.len();
        if let Some(bad) = ref_vectors.iter().find(|v| v.len() != dimension) {
            return Err(ShapeError(format!(
                "reference vector with {} components, expected {dimension}",
                bad.len()
            )));
        }
        if weights.iter().chain(ref_vectors.iter().flatten()).any(|v| !v.is_finite()) {
            return Err(ShapeError("non-finite component".to_string()));
        }

        let mut network = Self {
            rows,
            columns,
            weights,
            ref_vectors,
            ref_vectors_distance_median: 0.0,
        };
        network.ref_vectors_distance_median = network.compute_ref_vectors_distance_median();
        Ok(network)
    }

    /// Train a square network on `samples`.
    ///
    /// `weights` gives the per-component weights of the distance metric and
    /// fixes the dimension every sample must have. Progress is reported as
    /// the fraction of completed iterations.
    pub fn train(
        samples: &[Vec<f64>],
        weights: Vec<f64>,
        settings: &TrainSettings,
        cancel: &CancellationToken,
        progress: &dyn Fn(f64),
    ) -> LoadResult<Self> {
        settings.validate()?;
        let dimension = weights.len();
        if samples.is_empty() {
            return Err(LoadError::NoTrainingData);
        }
        if let Some(bad) = samples.iter().find(|s| s.len() != dimension) {
            return Err(LoadError::InvalidSettings(format!(
                "sample with {} components, expected {dimension}",
                bad.len()
            )));
        }

        let side = grid_side(samples.len(), settings.sample_count_per_neuron)?;
        let cell_count = side
            .checked_mul(side)
            .ok_or_else(|| LoadError::InvalidSettings(format!("grid side {side} is too large")))?;
        log::info!(
            "Training a {side}x{side} network on {} samples ({} iterations, {dimension} dimensions)",
            samples.len(),
            settings.iteration_count
        );

        let mut rng = StdRng::seed_from_u64(settings.seed);
        let ref_vectors = (0..cell_count)
            .map(|_| {
                samples
                    .choose(&mut rng)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; dimension])
            })
            .collect();

        let mut network = Self {
            rows: side,
            columns: side,
            weights,
            ref_vectors,
            ref_vectors_distance_median: 0.0,
        };

        let mut order: Vec<usize> = (0..samples.len()).collect();
        for iteration in 0..settings.iteration_count {
            cancel.check()?;

            let schedule = DecaySchedule::at(iteration, settings.iteration_count, side);
            log::debug!(
                "Iteration {}/{}: radius {:.3}, learning rate {:.3}",
                iteration + 1,
                settings.iteration_count,
                schedule.radius,
                schedule.learning_rate
            );

            order.shuffle(&mut rng);
            for &index in &order {
                cancel.check()?;
                let sample = &samples[index];
                let winner = network.closest_position(sample);
                network.update_neighbourhood(winner, sample, schedule);
            }

            progress((iteration + 1) as f64 / settings.iteration_count as f64);
        }

        network.ref_vectors_distance_median = network.compute_ref_vectors_distance_median();
        Ok(network)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn dimension(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Reference vectors in row-major order.
    pub fn ref_vectors(&self) -> &[Vec<f64>] {
        &self.ref_vectors
    }

    pub fn ref_vector(&self, position: GridPosition) -> Option<&[f64]> {
        self.index_of(position).map(|i| self.ref_vectors[i].as_slice())
    }

    /// Median distance between the reference vectors of grid-adjacent
    /// cells. Zero for a single-cell grid.
    pub fn ref_vectors_distance_median(&self) -> f64 {
        self.ref_vectors_distance_median
    }

    pub fn contains(&self, position: GridPosition) -> bool {
        position.row < self.rows && position.column < self.columns
    }

    /// Weighted Euclidean distance, the metric used for training, indexing
    /// and searching alike.
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b)
            .zip(&self.weights)
            .map(|((x, y), w)| w * (x - y) * (x - y))
            .sum::<f64>()
            .sqrt()
    }

    /// Position of the reference vector closest to `input`. Ties go to the
    /// first cell in row-major order.
    pub fn closest_position(&self, input: &[f64]) -> GridPosition {
        let mut best_index = 0;
        let mut best_distance = f64::INFINITY;
        for (i, ref_vector) in self.ref_vectors.iter().enumerate() {
            let distance = self.distance(input, ref_vector);
            if distance < best_distance {
                best_distance = distance;
                best_index = i;
            }
        }
        self.position_of(best_index)
    }

    /// The closest cell adjacent to, but outside of, `from`.
    ///
    /// Distances are measured between the reference vector of the frontier
    /// cell and the one of its neighbour; candidates farther than
    /// `max_distance` are ignored.
    pub fn closest_ref_vector_position(
        &self,
        from: &[GridPosition],
        max_distance: f64,
    ) -> Option<GridPosition> {
        let mut best: Option<(GridPosition, f64)> = None;

        for &position in from {
            let Some(origin) = self.ref_vector(position) else {
                continue;
            };
            for neighbour in self.neighbours(position) {
                if from.contains(&neighbour) {
                    continue;
                }
                let Some(candidate) = self.ref_vector(neighbour) else {
                    continue;
                };
                let distance = self.distance(origin, candidate);
                if distance > max_distance {
                    continue;
                }
                if best.map_or(true, |(_, best_distance)| distance < best_distance) {
                    best = Some((neighbour, distance));
                }
            }
        }

        best.map(|(position, _)| position)
    }

    /// The 4-neighbourhood of a cell, clipped to the grid.
    fn neighbours(&self, position: GridPosition) -> impl Iterator<Item = GridPosition> + '_ {
        let GridPosition { row, column } = position;
        [
            row.checked_sub(1).map(|r| GridPosition::new(r, column)),
            Some(GridPosition::new(row + 1, column)),
            column.checked_sub(1).map(|c| GridPosition::new(row, c)),
            Some(GridPosition::new(row, column + 1)),
        ]
        .into_iter()
        .flatten()
        .filter(|p| self.contains(*p))
    }

    fn index_of(&self, position: GridPosition) -> Option<usize> {
        self.contains(position)
            .then(|| position.row * self.columns + position.column)
    }

    fn position_of(&self, index: usize) -> GridPosition {
        GridPosition::new(index / self.columns, index % self.columns)
    }

    fn update_neighbourhood(&mut self, winner: GridPosition, sample: &[f64], schedule: DecaySchedule) {
        let reach = schedule.radius.floor() as usize;
        let row_range = winner.row.saturating_sub(reach)..=(winner.row + reach).min(self.rows - 1);
        let column_range =
            winner.column.saturating_sub(reach)..=(winner.column + reach).min(self.columns - 1);

        for row in row_range {
            for column in column_range.clone() {
                let position = GridPosition::new(row, column);
                let influence = schedule.influence(winner.grid_distance(position));
                if influence <= 0.0 {
                    continue;
                }
                let factor = schedule.learning_rate * influence;
                let index = row * self.columns + column;
                for (value, target) in self.ref_vectors[index].iter_mut().zip(sample) {
                    *value += factor * (target - *value);
                }
            }
        }
    }

    fn compute_ref_vectors_distance_median(&self) -> f64 {
        let mut distances = Vec::with_capacity(2 * self.ref_vectors.len());
        for row in 0..self.rows {
            for column in 0..self.columns {
                let here = &self.ref_vectors[row * self.columns + column];
                if column + 1 < self.columns {
                    let right = &self.ref_vectors[row * self.columns + column + 1];
                    distances.push(self.distance(here, right));
                }
                if row + 1 < self.rows {
                    let below = &self.ref_vectors[(row + 1) * self.columns + column];
                    distances.push(self.distance(here, below));
                }
            }
        }

        if distances.is_empty() {
            return 0.0;
        }
        distances.sort_by(f64::total_cmp);
        let mid = distances.len() / 2;
        if distances.len() % 2 == 0 {
            (distances[mid - 1] + distances[mid]) / 2.0
        } else {
            distances[mid]
        }
    }
}
