//! Module: index::vector::ivf
//! Responsibility: the IVF (inverted file) vector maintainer (§4.3.3):
//! K-means-partitioned approximate search over `nlist` clusters, probing
//! the `nprobe` nearest at query time.
//!
//! Subspaces, per §3: `centroids/[cluster_id]`, `lists/[cluster_id]/[pk]`,
//! `assignments/[pk]`, `metadata`. Every vector has exactly one
//! `assignments` row and one `lists` row under its assigned cluster;
//! `update`'s delete path clears both before writing new ones, and
//! `retrain` rewrites all three in one pass under one transaction
//! (§9 resolved open question).

use async_trait::async_trait;
use parking_lot::RwLock;
use stratum_primitives::{Subspace, Value};

use crate::config::IvfConfig;
use crate::kv::{RangeOptions, Transaction};
use crate::model::{Capability, IndexDescriptor, VectorMetric};
use crate::record::Record;

use super::super::{IndexMaintainer, MaintenanceError};
use super::{decode_vector, distance, encode_vector, TopK};

struct Subspaces {
    centroids: Subspace,
    lists: Subspace,
    assignments: Subspace,
}

impl Subspaces {
    fn new(root: &Subspace) -> Self {
        Self {
            centroids: root.subspace("centroids"),
            lists: root.subspace("lists"),
            assignments: root.subspace("assignments"),
        }
    }
}

/// Cluster-0 parking: before `retrain` has run at least once, every
/// vector is assigned to cluster 0 with no real centroid — search still
/// works (falls back to scanning the single parked cluster) but gives up
/// IVF's speed until enough data has accumulated to train on (§9).
struct TrainedState {
    trained: bool,
    centroids: Vec<Vec<f32>>,
}

///
/// IvfMaintainer
///

pub struct IvfMaintainer {
    descriptor: IndexDescriptor,
    subspaces: Subspaces,
    capability: Capability,
    config: IvfConfig,
    state: RwLock<TrainedState>,
}

impl IvfMaintainer {
    #[must_use]
    pub fn new(descriptor: IndexDescriptor, subspace: Subspace, config: IvfConfig) -> Self {
        let capability = descriptor.capability;
        let subspaces = Subspaces::new(&subspace);
        Self {
            descriptor,
            subspaces,
            capability,
            config,
            state: RwLock::new(TrainedState { trained: false, centroids: Vec::new() }),
        }
    }

    fn dims(&self) -> u32 {
        self.capability.dims.unwrap_or(0)
    }

    fn metric(&self) -> VectorMetric {
        self.capability.metric.unwrap_or(VectorMetric::Euclidean)
    }

    /// Cluster-0 before training, nearest centroid afterward.
    fn assign(&self, vector: &[f32]) -> u32 {
        let state = self.state.read();
        if !state.trained || state.centroids.is_empty() {
            return 0;
        }
        state
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i as u32, distance(self.metric(), vector, c)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// K-means over every vector currently under the index's `lists`
    /// subspace, then rewrites `centroids`/`assignments`/`lists` so every
    /// vector lands under its newly-computed nearest cluster (§9).
    pub async fn retrain(&self, tx: &dyn Transaction) -> Result<(), MaintenanceError> {
        let (begin, end) = self.subspaces.assignments.range();
        let assignment_rows = tx
            .get_range(&begin, &end, RangeOptions::default())
            .await
            .map_err(MaintenanceError::from)?;

        let mut vectors = Vec::with_capacity(assignment_rows.len());
        for row in &assignment_rows {
            let pk = self
                .subspaces
                .assignments
                .unpack(&row.key)
                .map_err(|e| MaintenanceError::InvalidStructure {
                    index: self.descriptor.name.clone(),
                    message: e.to_string(),
                })?;
            let old_cluster = decode_cluster_id(&row.value)?;
            let vector = self.fetch_vector(&pk, old_cluster, tx).await?;
            vectors.push((pk, vector));
        }

        if vectors.is_empty() {
            return Ok(());
        }

        let k = self.config.nlist.min(vectors.len() as u32).max(1) as usize;
        let raw_vectors: Vec<Vec<f32>> = vectors.iter().map(|(_, v)| v.clone()).collect();
        let centroids = kmeans(&raw_vectors, k, self.config.kmeans_iterations, self.metric());

        for (cluster_id, centroid) in centroids.iter().enumerate() {
            let key = self
                .subspaces
                .centroids
                .pack(&[Value::Int(cluster_id as i64)])
                .unwrap_or_default();
            tx.set(key, stratum_primitives::tuple::pack(&[encode_vector(centroid)]));
        }

        for (pk, vector) in &vectors {
            let old_cluster = self.assign_against(vector, &centroids);
            self.write_assignment(pk, vector, old_cluster, tx)?;
        }

        *self.state.write() = TrainedState { trained: true, centroids };
        Ok(())
    }

    fn assign_against(&self, vector: &[f32], centroids: &[Vec<f32>]) -> u32 {
        centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i as u32, distance(self.metric(), vector, c)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn write_assignment(
        &self,
        pk: &[Value],
        vector: &[f32],
        cluster_id: u32,
        tx: &dyn Transaction,
    ) -> Result<(), MaintenanceError> {
        let assignment_key = self.subspaces.assignments.pack(pk).unwrap_or_default();
        tx.set(assignment_key, stratum_primitives::tuple::pack(&[Value::Int(i64::from(cluster_id))]));

        let mut list_parts = vec![Value::Int(i64::from(cluster_id))];
        list_parts.extend(pk.iter().cloned());
        let list_key = self.subspaces.lists.pack(&list_parts).unwrap_or_default();
        tx.set(list_key, stratum_primitives::tuple::pack(&[encode_vector(vector)]));
        Ok(())
    }

    async fn fetch_vector(
        &self,
        pk: &[Value],
        cluster_id: u32,
        tx: &dyn Transaction,
    ) -> Result<Vec<f32>, MaintenanceError> {
        let mut list_parts = vec![Value::Int(i64::from(cluster_id))];
        list_parts.extend(pk.iter().cloned());
        let key = self.subspaces.lists.pack(&list_parts).unwrap_or_default();
        let bytes = tx
            .get(&key, false)
            .await
            .map_err(MaintenanceError::from)?
            .ok_or_else(|| MaintenanceError::InvalidStructure {
                index: self.descriptor.name.clone(),
                message: "assignment referenced a missing list row".into(),
            })?;
        let values = stratum_primitives::tuple::unpack(&bytes).map_err(|e| {
            MaintenanceError::InvalidStructure { index: self.descriptor.name.clone(), message: e.to_string() }
        })?;
        decode_vector(&self.descriptor.name, values.first().unwrap_or(&Value::Null), self.dims())
    }

    /// Query-time search: probe the `nprobe` nearest clusters (all
    /// clusters before training has run), merging into one top-k heap.
    pub async fn search(
        &self,
        query: &[f32],
        k: usize,
        tx: &dyn Transaction,
    ) -> Result<Vec<(Vec<Value>, f32)>, MaintenanceError> {
        let probe_clusters = self.clusters_to_probe(query);
        let mut heap = TopK::new(k);
        for cluster_id in probe_clusters {
            let prefix = self
                .subspaces
                .lists
                .pack(&[Value::Int(i64::from(cluster_id))])
                .unwrap_or_default();
            let mut end = prefix.clone();
            end.push(0xFF);
            let rows = tx.get_range(&prefix, &end, RangeOptions::default()).await.map_err(MaintenanceError::from)?;
            for row in rows {
                let full = self
                    .subspaces
                    .lists
                    .unpack(&row.key)
                    .map_err(|e| MaintenanceError::InvalidStructure {
                        index: self.descriptor.name.clone(),
                        message: e.to_string(),
                    })?;
                let pk = full[1..].to_vec();
                let values = stratum_primitives::tuple::unpack(&row.value).map_err(|e| {
                    MaintenanceError::InvalidStructure { index: self.descriptor.name.clone(), message: e.to_string() }
                })?;
                let vector = decode_vector(&self.descriptor.name, values.first().unwrap_or(&Value::Null), self.dims())?;
                heap.push(distance(self.metric(), query, &vector), pk);
            }
        }
        Ok(heap.into_sorted_ascending().into_iter().map(|(d, pk)| (pk, d)).collect())
    }

    fn clusters_to_probe(&self, query: &[f32]) -> Vec<u32> {
        let state = self.state.read();
        if !state.trained || state.centroids.is_empty() {
            return vec![0];
        }
        let mut scored: Vec<(u32, f32)> = state
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i as u32, distance(self.metric(), query, c)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(self.config.nprobe as usize)
            .map(|(i, _)| i)
            .collect()
    }
}

fn decode_cluster_id(bytes: &[u8]) -> Result<u32, MaintenanceError> {
    let values = stratum_primitives::tuple::unpack(bytes)
        .map_err(|e| MaintenanceError::InvalidStructure { index: String::new(), message: e.to_string() })?;
    match values.first() {
        Some(Value::Int(i)) => Ok(*i as u32),
        _ => Err(MaintenanceError::InvalidStructure { index: String::new(), message: "corrupt cluster id".into() }),
    }
}

/// Lloyd's algorithm, deterministic seed via first-k-points init, capped
/// at `max_iterations` (§4.3.3, default 20).
fn kmeans(vectors: &[Vec<f32>], k: usize, max_iterations: u32, metric: VectorMetric) -> Vec<Vec<f32>> {
    let mut centroids: Vec<Vec<f32>> = vectors.iter().take(k).cloned().collect();
    if centroids.is_empty() {
        return centroids;
    }

    for _ in 0..max_iterations {
        let mut sums = vec![vec![0f32; centroids[0].len()]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];

        for vector in vectors {
            let nearest = centroids
                .iter()
                .enumerate()
                .map(|(i, c)| (i, distance(metric, vector, c)))
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(i, _)| i)
                .unwrap_or(0);
            counts[nearest] += 1;
            for (s, v) in sums[nearest].iter_mut().zip(vector.iter()) {
                *s += v;
            }
        }

        let mut moved = false;
        for (i, centroid) in centroids.iter_mut().enumerate() {
            if counts[i] == 0 {
                continue;
            }
            let new_centroid: Vec<f32> = sums[i].iter().map(|s| s / counts[i] as f32).collect();
            if new_centroid != *centroid {
                moved = true;
            }
            *centroid = new_centroid;
        }
        if !moved {
            break;
        }
    }
    centroids
}

#[async_trait]
impl<R: Record> IndexMaintainer<R> for IvfMaintainer {
    async fn update(
        &self,
        old: Option<&R>,
        new: Option<&R>,
        primary_key: &[Value],
        tx: &dyn Transaction,
    ) -> Result<(), MaintenanceError> {
        if old.is_some() {
            let assignment_key = self.subspaces.assignments.pack(primary_key).unwrap_or_default();
            if let Some(bytes) = tx.get(&assignment_key, false).await.map_err(MaintenanceError::from)? {
                let old_cluster = decode_cluster_id(&bytes)?;
                tx.clear(&assignment_key);
                let mut list_parts = vec![Value::Int(i64::from(old_cluster))];
                list_parts.extend(primary_key.iter().cloned());
                let list_key = self.subspaces.lists.pack(&list_parts).unwrap_or_default();
                tx.clear(&list_key);
            }
        }
        if let Some(new) = new {
            let field = self.descriptor.field_ids()[0];
            let raw = new.field(field);
            let vector = decode_vector(&self.descriptor.name, &raw, self.dims())?;
            let cluster_id = self.assign(&vector);
            self.write_assignment(primary_key, &vector, cluster_id, tx)?;
        }
        Ok(())
    }

    async fn scan_item(
        &self,
        record: &R,
        primary_key: &[Value],
        tx: &dyn Transaction,
    ) -> Result<Vec<MaintenanceError>, MaintenanceError> {
        <Self as IndexMaintainer<R>>::update(self, None, Some(record), primary_key, tx).await?;
        Ok(Vec::new())
    }

    fn compute_keys(&self, _record: &R, primary_key: &[Value]) -> Vec<Vec<u8>> {
        vec![self.subspaces.assignments.pack(primary_key).unwrap_or_default()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::mem::MemoryDatabase;
    use crate::kv::Database;
    use crate::model::{IndexKind, VectorKind};
    use crate::record::FieldTable;

    struct Doc {
        id: i64,
        embedding: Vec<f32>,
    }

    impl Record for Doc {
        const TYPE_NAME: &'static str = "doc";
        const FIELD_TABLE: FieldTable = FieldTable::new(&["embedding"]);

        fn field(&self, id: u16) -> Value {
            match id {
                0 => Value::Array(self.embedding.iter().map(|&f| Value::Double(f64::from(f))).collect()),
                _ => Value::Null,
            }
        }

        fn primary_key(&self) -> Vec<Value> {
            vec![Value::Int(self.id)]
        }
    }

    fn descriptor() -> IndexDescriptor {
        IndexDescriptor::new(
            "docs_embedding_ivf",
            IndexKind::Vector(VectorKind::Ivf(IvfConfig::default())),
            Capability::vector(2, VectorMetric::Euclidean),
            &Doc::FIELD_TABLE,
            &["embedding"],
            false,
            false,
            &[],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn unassigned_vectors_park_under_cluster_zero() {
        let db = MemoryDatabase::new();
        let maintainer = IvfMaintainer::new(descriptor(), Subspace::new(b"idx/ivf".to_vec()), IvfConfig::default());
        let doc = Doc { id: 1, embedding: vec![1.0, 2.0] };
        let tx = db.begin();
        maintainer.update(None, Some(&doc), &doc.primary_key(), &tx).await.unwrap();
        db.commit(&tx).await.unwrap();
        assert_eq!(maintainer.assign(&[1.0, 2.0]), 0);
    }

    #[tokio::test]
    async fn retrain_groups_vectors_into_distinct_clusters() {
        let db = MemoryDatabase::new();
        let maintainer = IvfMaintainer::new(descriptor(), Subspace::new(b"idx/ivf2".to_vec()), IvfConfig { nlist: 2, nprobe: 2, kmeans_iterations: 10 });
        let docs = vec![
            Doc { id: 1, embedding: vec![0.0, 0.0] },
            Doc { id: 2, embedding: vec![0.1, 0.1] },
            Doc { id: 3, embedding: vec![100.0, 100.0] },
            Doc { id: 4, embedding: vec![100.1, 100.1] },
        ];
        for doc in &docs {
            let tx = db.begin();
            maintainer.update(None, Some(doc), &doc.primary_key(), &tx).await.unwrap();
            db.commit(&tx).await.unwrap();
        }

        let tx = db.begin();
        maintainer.retrain(&tx).await.unwrap();
        db.commit(&tx).await.unwrap();

        let tx = db.begin();
        let results = maintainer.search(&[0.0, 0.0], 2, &tx).await.unwrap();
        let ids: Vec<i64> = results.iter().map(|(pk, _)| match &pk[0] { Value::Int(i) => *i, _ => 0 }).collect();
        assert!(ids.contains(&1) && ids.contains(&2));
    }
}
