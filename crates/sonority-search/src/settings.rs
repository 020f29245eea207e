//! Training settings and the catalog of known audio features.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use sonority_core::model::FeatureMap;

use crate::error::{LoadError, LoadResult};

/// Dimension of every feature the analyzer is known to produce.
pub const KNOWN_FEATURES: &[(&str, usize)] = &[
    ("lowlevel.average_loudness", 1),
    ("lowlevel.barkbands.median", 27),
    ("lowlevel.dissonance.mean", 1),
    ("lowlevel.dynamic_complexity", 1),
    ("lowlevel.erbbands.median", 40),
    ("lowlevel.gfcc.mean", 13),
    ("lowlevel.melbands.median", 40),
    ("lowlevel.mfcc.mean", 13),
    ("lowlevel.pitch_salience.mean", 1),
    ("lowlevel.spectral_centroid.median", 1),
    ("lowlevel.spectral_contrast_coeffs.median", 6),
    ("lowlevel.spectral_contrast_valleys.var", 6),
    ("lowlevel.spectral_energyband_high.mean", 1),
    ("lowlevel.spectral_rolloff.median", 1),
    ("lowlevel.zerocrossingrate.mean", 1),
    ("rhythm.bpm", 1),
    ("rhythm.danceability", 1),
    ("rhythm.onset_rate", 1),
    ("tonal.chords_strength.median", 1),
    ("tonal.hpcp.median", 36),
    ("tonal.tuning_frequency", 1),
];

/// Number of components of a known feature.
pub fn known_feature_dimension(name: &str) -> Option<usize> {
    KNOWN_FEATURES
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, dimension)| *dimension)
}

fn default_weight() -> f64 {
    1.0
}

/// How one feature takes part in training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureSettings {
    /// Number of components of the feature vector.
    pub dimension: usize,

    /// Relative importance of the feature in the distance metric. The weight
    /// is spread evenly over the feature's components so that wide features
    /// do not drown narrow ones.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl FeatureSettings {
    /// Settings for a known feature with the given weight.
    pub fn known(name: &str, weight: f64) -> Option<Self> {
        known_feature_dimension(name).map(|dimension| Self { dimension, weight })
    }
}

pub type FeatureSettingsMap = BTreeMap<String, FeatureSettings>;

/// Features used when the configuration does not name any.
pub fn default_feature_settings() -> FeatureSettingsMap {
    [
        "lowlevel.spectral_energyband_high.mean",
        "lowlevel.spectral_rolloff.median",
        "lowlevel.spectral_contrast_valleys.var",
        "lowlevel.erbbands.median",
        "lowlevel.gfcc.mean",
    ]
    .into_iter()
    .filter_map(|name| FeatureSettings::known(name, 1.0).map(|s| (name.to_string(), s)))
    .collect()
}

/// Parameters of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainSettings {
    /// Number of passes over the whole sample set.
    pub iteration_count: usize,

    /// Average number of samples each grid cell should end up representing;
    /// drives the grid size.
    pub sample_count_per_neuron: f64,

    /// Seed of the random generator used for initialization and sample
    /// ordering, so that identical inputs give identical maps.
    pub seed: u64,

    /// Features to train on, keyed by name. Samples are built by
    /// concatenating the features in key order.
    pub features: FeatureSettingsMap,
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            iteration_count: 10,
            sample_count_per_neuron: 4.0,
            seed: 0x5eed,
            features: default_feature_settings(),
        }
    }
}

impl TrainSettings {
    /// Total number of components of a training sample.
    pub fn dimension(&self) -> usize {
        self.features.values().map(|f| f.dimension).sum()
    }

    pub fn feature_names(&self) -> BTreeSet<String> {
        self.features.keys().cloned().collect()
    }

    /// Per-component weights of the distance metric.
    pub fn dimension_weights(&self) -> Vec<f64> {
        self.features
            .values()
            .flat_map(|f| std::iter::repeat(f.weight / f.dimension as f64).take(f.dimension))
            .collect()
    }

    pub fn validate(&self) -> LoadResult<()> {
        if self.features.is_empty() {
            return Err(LoadError::InvalidSettings(
                "no feature selected for training".to_string(),
            ));
        }
        if self.iteration_count == 0 {
            return Err(LoadError::InvalidSettings(
                "iteration_count must be at least 1".to_string(),
            ));
        }
        if !(self.sample_count_per_neuron.is_finite() && self.sample_count_per_neuron > 0.0) {
            return Err(LoadError::InvalidSettings(format!(
                "sample_count_per_neuron must be positive, got {}",
                self.sample_count_per_neuron
            )));
        }
        for (name, feature) in &self.features {
            if feature.dimension == 0 {
                return Err(LoadError::InvalidSettings(format!(
                    "feature {name} has no component"
                )));
            }
            if !(feature.weight.is_finite() && feature.weight >= 0.0) {
                return Err(LoadError::InvalidSettings(format!(
                    "feature {name} has invalid weight {}",
                    feature.weight
                )));
            }
        }
        Ok(())
    }

    /// Concatenate a track's features into one training sample.
    ///
    /// Fails with a sample rejection (see [`LoadError::is_sample_rejection`])
    /// when a feature is missing or has an unexpected length.
    pub fn build_sample(&self, features: &FeatureMap) -> LoadResult<Vec<f64>> {
        let mut sample = Vec::with_capacity(self.dimension());
        for (name, settings) in &self.features {
            let values = features
                .get(name)
                .ok_or_else(|| LoadError::MissingFeature(name.clone()))?;
            if values.len() != settings.dimension {
                return Err(LoadError::FeatureDimension {
                    feature: name.clone(),
                    expected: settings.dimension,
                    actual: values.len(),
                });
            }
            sample.extend_from_slice(values);
        }
        Ok(sample)
    }
}
