//! Min/max scaling of training samples.

/// Per-component min/max normalization fitted on a sample set.
///
/// Every component is mapped to `[0, 1]` over the fitted set; components that
/// never vary map to `0`.
#[derive(Debug, Clone, PartialEq)]
pub struct DataNormalizer {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl DataNormalizer {
    /// Compute the normalization factors of `samples`, which must all have
    /// `dimension` components.
    pub fn fit(samples: &[Vec<f64>], dimension: usize) -> Self {
        let mut min = vec![f64::INFINITY; dimension];
        let mut max = vec![f64::NEG_INFINITY; dimension];

        for sample in samples {
            for (i, &value) in sample.iter().enumerate().take(dimension) {
                min[i] = min[i].min(value);
                max[i] = max[i].max(value);
            }
        }

        // Untouched components (empty sample set) behave as constants.
        for i in 0..dimension {
            if !min[i].is_finite() || !max[i].is_finite() {
                min[i] = 0.0;
                max[i] = 0.0;
            }
        }

        Self { min, max }
    }

    pub fn normalize(&self, sample: &mut [f64]) {
        for (i, value) in sample.iter_mut().enumerate().take(self.min.len()) {
            let range = self.max[i] - self.min[i];
            *value = if range > 0.0 {
                (*value - self.min[i]) / range
            } else {
                0.0
            };
        }
    }

    pub fn normalize_all(&self, samples: &mut [Vec<f64>]) {
        for sample in samples {
            self.normalize(sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scales_to_unit_range() {
        let mut samples = vec![vec![0.0, 10.0, 5.0], vec![4.0, 20.0, 5.0], vec![2.0, 15.0, 5.0]];
        let normalizer = DataNormalizer::fit(&samples, 3);
        normalizer.normalize_all(&mut samples);

        assert_eq!(samples[0], vec![0.0, 0.0, 0.0]);
        assert_eq!(samples[1], vec![1.0, 1.0, 0.0]);
        assert_eq!(samples[2], vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_empty_set() {
        let normalizer = DataNormalizer::fit(&[], 2);
        let mut sample = vec![3.0, -1.0];
        normalizer.normalize(&mut sample);
        assert_eq!(sample, vec![0.0, 0.0]);
    }
}
