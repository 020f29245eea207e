//! Error types for engine loading and cache handling.

use thiserror::Error;

/// Errors that can end a load or training run.
///
/// Whatever the variant, the snapshot that was installed before the load
/// started stays in place.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The load was cancelled through `request_cancel_load`.
    #[error("load cancelled")]
    Cancelled,

    /// Another load is already running on this engine.
    #[error("a load is already in progress")]
    AlreadyLoading,

    /// No track in the library had usable features.
    #[error("no track with usable features to train on")]
    NoTrainingData,

    /// Every feature fetch failed and nothing could be collected.
    #[error("feature provider failed for all {failures} fetched tracks")]
    ProviderFailed { failures: usize },

    /// A track lacks one of the features the training settings require.
    #[error("missing feature {0}")]
    MissingFeature(String),

    /// A feature vector does not have the dimension declared in the settings.
    #[error("feature {feature} has {actual} components, expected {expected}")]
    FeatureDimension {
        feature: String,
        expected: usize,
        actual: usize,
    },

    /// The training settings cannot be used.
    #[error("invalid training settings: {0}")]
    InvalidSettings(String),

    /// An error propagated from the library store.
    #[error("library error: {0}")]
    Library(#[from] sonority_core::Error),
}

impl LoadError {
    /// Returns `true` when the load stopped because it was asked to.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` when the error only disqualifies a single track from
    /// training rather than the whole run.
    pub fn is_sample_rejection(&self) -> bool {
        matches!(self, Self::MissingFeature(_) | Self::FeatureDimension { .. })
    }
}

/// Convenience alias for load results.
pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// Errors raised while reading, writing or decoding the engine cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The cached snapshot was produced by another format version or for
    /// other feature settings, or is corrupt. The caller has to retrain.
    #[error("incompatible cache: {0}")]
    Incompatible(String),
}

impl CacheError {
    pub fn is_incompatible(&self) -> bool {
        matches!(self, Self::Incompatible(_))
    }
}

/// The shape of a network does not match its declared dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid network shape: {0}")]
pub struct ShapeError(pub String);
