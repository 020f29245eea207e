//! Similarity engine for sonority.
//!
//! Trains a self-organizing map over track audio features, indexes tracks,
//! releases and artists by their closest map cells, and answers "what is
//! similar to this" queries by walking the map outward from the seeds.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod cache;
pub mod cancel;
pub mod classifier;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod network;
pub mod normalizer;
pub mod ports;
pub mod progress;
pub mod search;
pub mod settings;

pub use cache::{CacheStore, FileCache};
pub use cancel::{CancelCheck, CancellationToken};
pub use classifier::{LoadSource, SimilarityClassifier};
pub use config::Config;
pub use engine::FeaturesEngine;
pub use error::{CacheError, LoadError, LoadResult};
pub use index::{CategoryIndex, Snapshot};
pub use network::{GridPosition, Network};
pub use ports::{FeatureProvider, MediaLibrary, SqliteLibrary};
pub use settings::{FeatureSettings, TrainSettings};
