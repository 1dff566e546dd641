//! Module: index::vector
//! Responsibility: the vector `IndexMaintainer` family (§4.3.3): `Flat`
//! (exhaustive scan) and `Ivf` (K-means-partitioned approximate search),
//! both fixed to a `dims`/metric pair validated at insert time.

mod flat;
mod ivf;

pub use flat::FlatMaintainer;
pub use ivf::IvfMaintainer;

use stratum_primitives::Value;

use crate::model::VectorMetric;

use super::MaintenanceError;

/// A single `VectorMaintainer` type dispatching to `Flat` or `Ivf` by
/// kind, so callers holding an `IndexDescriptor` don't need to know
/// which storage strategy backs it (§9 "sum types over protocols").
pub enum VectorMaintainer {
    Flat(FlatMaintainer),
    Ivf(IvfMaintainer),
}

#[async_trait::async_trait]
impl<R: crate::record::Record> super::IndexMaintainer<R> for VectorMaintainer {
    async fn update(
        &self,
        old: Option<&R>,
        new: Option<&R>,
        primary_key: &[Value],
        tx: &dyn crate::kv::Transaction,
    ) -> Result<(), MaintenanceError> {
        match self {
            Self::Flat(m) => m.update(old, new, primary_key, tx).await,
            Self::Ivf(m) => m.update(old, new, primary_key, tx).await,
        }
    }

    async fn scan_item(
        &self,
        record: &R,
        primary_key: &[Value],
        tx: &dyn crate::kv::Transaction,
    ) -> Result<Vec<MaintenanceError>, MaintenanceError> {
        match self {
            Self::Flat(m) => m.scan_item(record, primary_key, tx).await,
            Self::Ivf(m) => m.scan_item(record, primary_key, tx).await,
        }
    }

    fn compute_keys(&self, record: &R, primary_key: &[Value]) -> Vec<Vec<u8>> {
        match self {
            Self::Flat(m) => m.compute_keys(record, primary_key),
            Self::Ivf(m) => m.compute_keys(record, primary_key),
        }
    }
}

/// Decode a record's vector field into `f32`s, validating dimensionality
/// against the index's declared `dims` (§4.3.3).
pub(super) fn decode_vector(
    index: &str,
    value: &Value,
    expected_dims: u32,
) -> Result<Vec<f32>, MaintenanceError> {
    let Value::Array(elements) = value else {
        return Err(MaintenanceError::InvalidStructure {
            index: index.to_string(),
            message: format!("vector field must be an array, got {}", value.type_name()),
        });
    };
    if elements.len() as u32 != expected_dims {
        return Err(MaintenanceError::DimensionMismatch {
            index: index.to_string(),
            expected: expected_dims,
            actual: elements.len() as u32,
        });
    }
    elements
        .iter()
        .map(|v| match v {
            Value::Double(d) => Ok(*d as f32),
            Value::Int(i) => Ok(*i as f32),
            other => Err(MaintenanceError::InvalidStructure {
                index: index.to_string(),
                message: format!("vector component must be numeric, got {}", other.type_name()),
            }),
        })
        .collect()
}

pub(super) fn encode_vector(values: &[f32]) -> Value {
    Value::Array(values.iter().map(|&f| Value::Double(f64::from(f))).collect())
}

/// Distance under the index's configured metric. Lower is "closer" for
/// all three, with cosine/dot-product expressed as `1 - similarity` so
/// every metric shares a min-heap-friendly direction.
pub(super) fn distance(metric: VectorMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        VectorMetric::Euclidean => a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f32>()
            .sqrt(),
        VectorMetric::DotProduct => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        VectorMetric::Cosine => {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                1.0
            } else {
                1.0 - dot / (norm_a * norm_b)
            }
        }
    }
}

/// Bounded max-heap of size `k` keyed by distance (smaller is better): a
/// candidate replaces the current worst entry iff it is strictly closer,
/// giving O(log k) per insert and O(n log k) total (§4.3.3).
pub(super) struct TopK<T> {
    capacity: usize,
    items: Vec<(f32, T)>,
}

impl<T> TopK<T> {
    pub(super) fn new(capacity: usize) -> Self {
        Self { capacity, items: Vec::with_capacity(capacity) }
    }

    pub(super) fn push(&mut self, distance: f32, item: T) {
        if self.items.len() < self.capacity {
            self.items.push((distance, item));
            self.items
                .sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            return;
        }
        if let Some((worst, _)) = self.items.first() {
            if distance < *worst {
                self.items.remove(0);
                self.items.push((distance, item));
                self.items
                    .sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            }
        }
    }

    pub(super) fn into_sorted_ascending(mut self) -> Vec<(f32, T)> {
        self.items
            .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topk_keeps_only_the_k_closest() {
        let mut heap = TopK::new(2);
        heap.push(5.0, "far");
        heap.push(1.0, "near");
        heap.push(3.0, "mid");
        let sorted = heap.into_sorted_ascending();
        assert_eq!(sorted.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec!["near", "mid"]);
    }

    #[test]
    fn euclidean_distance_matches_hand_computation() {
        let d = distance(VectorMetric::Euclidean, &[0.0, 0.0], &[3.0, 4.0]);
        assert!((d - 5.0).abs() < 1e-6);
    }
}
