//! Streaming quantile digest, per §3/§6: centroids sorted by mean,
//! compression `δ` (default 100). Value semantics: `merge` combines two
//! digests' centroids and recompresses rather than mutating in place.

use crate::config::TDigestConfig;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Centroid {
    mean: f64,
    weight: f64,
}

///
/// TDigest
///

#[derive(Clone, Debug, PartialEq)]
pub struct TDigest {
    compression: f64,
    centroids: Vec<Centroid>,
    total_weight: f64,
    min: f64,
    max: f64,
}

impl TDigest {
    #[must_use]
    pub fn new(config: TDigestConfig) -> Self {
        Self {
            compression: config.compression,
            centroids: Vec::new(),
            total_weight: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    #[must_use]
    pub fn centroid_count(&self) -> usize {
        self.centroids.len()
    }

    pub fn add(&mut self, value: f64, weight: f64) {
        if weight <= 0.0 {
            return;
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.total_weight += weight;
        self.centroids.push(Centroid { mean: value, weight });
        self.centroids
            .sort_by(|a, b| a.mean.partial_cmp(&b.mean).unwrap());

        let target = (self.compression * 4.0).max(20.0) as usize;
        if self.centroids.len() > target * 2 {
            self.compress();
        }
    }

    /// Merge-and-recompress into a digest equivalent to having observed
    /// every value both digests observed, per §8 property 7.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = Self::new(TDigestConfig {
            compression: self.compression.max(other.compression),
        });
        for c in self.centroids.iter().chain(other.centroids.iter()) {
            merged.add(c.mean, c.weight);
        }
        merged.compress();
        merged
    }

    /// Quantile in `[0, 1]`: linear interpolation across centroid
    /// cumulative weight. `quantile(0) == min`, `quantile(1) == max`.
    #[must_use]
    pub fn quantile(&self, q: f64) -> f64 {
        if self.centroids.is_empty() {
            return f64::NAN;
        }
        let q = q.clamp(0.0, 1.0);
        if q <= 0.0 {
            return self.min;
        }
        if q >= 1.0 {
            return self.max;
        }

        let target = q * self.total_weight;
        let mut cumulative = 0.0;
        for (i, c) in self.centroids.iter().enumerate() {
            let next_cumulative = cumulative + c.weight;
            if target <= next_cumulative || i == self.centroids.len() - 1 {
                // linear interpolation between this centroid and its
                // neighbour, weighted by where `target` falls in between.
                let prev_mean = if i == 0 { self.min } else { self.centroids[i - 1].mean };
                let frac = if next_cumulative > cumulative {
                    (target - cumulative) / (next_cumulative - cumulative)
                } else {
                    0.0
                };
                return prev_mean + frac * (c.mean - prev_mean);
            }
            cumulative = next_cumulative;
        }
        self.max
    }

    /// Merge adjacent centroids down to roughly `4*compression` buckets.
    fn compress(&mut self) {
        if self.centroids.len() <= 1 {
            return;
        }
        let target_size = self.total_weight / (2.0 * self.compression);
        let mut compressed = Vec::new();
        let mut iter = self.centroids.drain(..);
        let mut current = iter.next().unwrap();
        let mut cumulative = current.weight;

        for next in iter {
            if current.weight + next.weight <= target_size.max(1.0) {
                let total = current.weight + next.weight;
                current.mean = (current.mean * current.weight + next.mean * next.weight) / total;
                current.weight = total;
                cumulative += next.weight;
            } else {
                compressed.push(current);
                current = next;
                cumulative += current.weight;
            }
        }
        compressed.push(current);
        self.centroids = compressed;
        let _ = cumulative;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_of(values: &[f64]) -> TDigest {
        let mut d = TDigest::new(TDigestConfig::default());
        for &v in values {
            d.add(v, 1.0);
        }
        d
    }

    #[test]
    fn quantile_zero_and_one_are_min_max() {
        let d = digest_of(&[3.0, 1.0, 2.0, 5.0, 4.0]);
        assert_eq!(d.quantile(0.0), 1.0);
        assert_eq!(d.quantile(1.0), 5.0);
    }

    #[test]
    fn median_of_uniform_range_is_near_middle() {
        let values: Vec<f64> = (0..=1000).map(f64::from).collect();
        let d = digest_of(&values);
        let median = d.quantile(0.5);
        assert!((median - 500.0).abs() < 25.0, "median was {median}");
    }

    #[test]
    fn merge_is_commutative_within_tolerance() {
        let a = digest_of(&(0..500).map(f64::from).collect::<Vec<_>>());
        let b = digest_of(&(500..1000).map(f64::from).collect::<Vec<_>>());
        let ab = a.merge(&b).quantile(0.5);
        let ba = b.merge(&a).quantile(0.5);
        assert!((ab - ba).abs() < 1.0);
    }

    #[test]
    fn compression_bounds_centroid_growth() {
        let values: Vec<f64> = (0..100_000).map(f64::from).collect();
        let d = digest_of(&values);
        assert!(d.centroid_count() < 2_000);
    }
}
