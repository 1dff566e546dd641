//! Module: index::vector::flat
//! Responsibility: the flat vector maintainer (§4.3.3): stores every
//! vector under `subspace || primary_key`; k-NN is an exhaustive scan
//! into a bounded max-heap.

use async_trait::async_trait;
use stratum_primitives::{Subspace, Value};

use crate::kv::{RangeOptions, Transaction};
use crate::model::{Capability, IndexDescriptor};
use crate::record::Record;

use super::super::{IndexMaintainer, MaintenanceError};
use super::{decode_vector, distance, encode_vector, TopK};

///
/// FlatMaintainer
///

pub struct FlatMaintainer {
    descriptor: IndexDescriptor,
    subspace: Subspace,
    capability: Capability,
}

impl FlatMaintainer {
    #[must_use]
    pub fn new(descriptor: IndexDescriptor, subspace: Subspace) -> Self {
        let capability = descriptor.capability;
        Self { descriptor, subspace, capability }
    }

    fn dims(&self) -> u32 {
        self.capability.dims.unwrap_or(0)
    }

    fn key_for(&self, primary_key: &[Value]) -> Vec<u8> {
        self.subspace.pack(primary_key).unwrap_or_default()
    }

    /// Exhaustive k-NN: scans every stored vector, scoring each into a
    /// size-`k` max-heap (§4.3.3).
    pub async fn search(
        &self,
        query: &[f32],
        k: usize,
        tx: &dyn Transaction,
    ) -> Result<Vec<(Vec<Value>, f32)>, MaintenanceError> {
        let (begin, end) = self.subspace.range();
        let rows = tx
            .get_range(&begin, &end, RangeOptions::default())
            .await
            .map_err(MaintenanceError::from)?;

        let mut heap = TopK::new(k);
        for row in rows {
            let primary_key = self
                .subspace
                .unpack(&row.key)
                .map_err(|e| MaintenanceError::InvalidStructure {
                    index: self.descriptor.name.clone(),
                    message: e.to_string(),
                })?;
            let values = stratum_primitives::tuple::unpack(&row.value).map_err(|e| {
                MaintenanceError::InvalidStructure {
                    index: self.descriptor.name.clone(),
                    message: e.to_string(),
                }
            })?;
            let vector: Vec<f32> = values
                .iter()
                .map(|v| match v {
                    Value::Double(d) => *d as f32,
                    Value::Int(i) => *i as f32,
                    _ => 0.0,
                })
                .collect();
            let metric = self.capability.metric.unwrap_or(crate::model::VectorMetric::Euclidean);
            heap.push(distance(metric, query, &vector), primary_key);
        }
        Ok(heap
            .into_sorted_ascending()
            .into_iter()
            .map(|(d, pk)| (pk, d))
            .collect())
    }
}

#[async_trait]
impl<R: Record> IndexMaintainer<R> for FlatMaintainer {
    async fn update(
        &self,
        old: Option<&R>,
        new: Option<&R>,
        primary_key: &[Value],
        tx: &dyn Transaction,
    ) -> Result<(), MaintenanceError> {
        if old.is_some() {
            tx.clear(&self.key_for(primary_key));
        }
        if let Some(new) = new {
            let field = self.descriptor.field_ids()[0];
            let raw = new.field(field);
            let vector = decode_vector(&self.descriptor.name, &raw, self.dims())?;
            tx.set(self.key_for(primary_key), stratum_primitives::tuple::pack(&[encode_vector(&vector)]));
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
        vec![self.key_for(primary_key)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::mem::MemoryDatabase;
    use crate::kv::Database;
    use crate::model::{IndexKind, VectorKind, VectorMetric};
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

    fn maintainer() -> FlatMaintainer {
        let descriptor = IndexDescriptor::new(
            "docs_embedding",
            IndexKind::Vector(VectorKind::Flat),
            Capability::vector(2, VectorMetric::Euclidean),
            &Doc::FIELD_TABLE,
            &["embedding"],
            false,
            false,
            &[],
        )
        .unwrap();
        FlatMaintainer::new(descriptor, Subspace::new(b"idx/flat".to_vec()))
    }

    #[tokio::test]
    async fn mismatched_dims_raise_dimension_mismatch() {
        let db = MemoryDatabase::new();
        let maintainer = maintainer();
        let doc = Doc { id: 1, embedding: vec![1.0, 2.0, 3.0] };
        let tx = db.begin();
        let result = maintainer.update(None, Some(&doc), &doc.primary_key(), &tx).await;
        assert!(matches!(result, Err(MaintenanceError::DimensionMismatch { expected: 2, actual: 3, .. })));
    }

    #[tokio::test]
    async fn search_returns_nearest_first() {
        let db = MemoryDatabase::new();
        let maintainer = maintainer();
        let docs = vec![
            Doc { id: 1, embedding: vec![0.0, 0.0] },
            Doc { id: 2, embedding: vec![10.0, 10.0] },
            Doc { id: 3, embedding: vec![1.0, 1.0] },
        ];
        for doc in &docs {
            let tx = db.begin();
            maintainer.update(None, Some(doc), &doc.primary_key(), &tx).await.unwrap();
            db.commit(&tx).await.unwrap();
        }

        let tx = db.begin();
        let results = maintainer.search(&[0.0, 0.0], 2, &tx).await.unwrap();
        assert_eq!(results[0].0, vec![Value::Int(1)]);
        assert_eq!(results[1].0, vec![Value::Int(3)]);
    }
}
