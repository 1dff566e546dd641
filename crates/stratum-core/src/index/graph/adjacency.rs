//! Module: index::graph::adjacency
//! Responsibility: the adjacency-list graph maintainer (§4.3.4): each
//! record is an edge `(src, dst)`; entries are kept under both
//! `src -> dst` and `dst -> src` subspaces so traversal works either
//! direction without a reverse scan.

use async_trait::async_trait;
use stratum_primitives::{Subspace, Value};

use crate::kv::{RangeOptions, Transaction};
use crate::model::IndexDescriptor;
use crate::record::Record;

use super::super::{IndexMaintainer, MaintenanceError};

///
/// AdjacencyMaintainer
///

pub struct AdjacencyMaintainer {
    descriptor: IndexDescriptor,
    forward: Subspace,
    reverse: Subspace,
}

impl AdjacencyMaintainer {
    #[must_use]
    pub fn new(descriptor: IndexDescriptor, subspace: Subspace) -> Self {
        Self {
            forward: subspace.subspace("src"),
            reverse: subspace.subspace("dst"),
            descriptor,
        }
    }

    fn edge<R: Record>(&self, record: &R) -> (Value, Value) {
        let ids = self.descriptor.field_ids();
        (record.field(ids[0]), record.field(ids[1]))
    }

    fn forward_key(&self, src: &Value, dst: &Value) -> Vec<u8> {
        self.forward.pack(&[src.clone(), dst.clone()]).unwrap_or_default()
    }

    fn reverse_key(&self, src: &Value, dst: &Value) -> Vec<u8> {
        self.reverse.pack(&[dst.clone(), src.clone()]).unwrap_or_default()
    }

    /// Outgoing neighbors of `node`, for traversal and the PageRank /
    /// label-propagation algorithms.
    pub async fn out_neighbors(
        &self,
        node: &Value,
        tx: &dyn Transaction,
    ) -> Result<Vec<Value>, MaintenanceError> {
        self.neighbors(&self.forward, node, tx).await
    }

    /// Incoming neighbors of `node`.
    pub async fn in_neighbors(
        &self,
        node: &Value,
        tx: &dyn Transaction,
    ) -> Result<Vec<Value>, MaintenanceError> {
        self.neighbors(&self.reverse, node, tx).await
    }

    async fn neighbors(
        &self,
        subspace: &Subspace,
        node: &Value,
        tx: &dyn Transaction,
    ) -> Result<Vec<Value>, MaintenanceError> {
        let prefix = subspace.pack(&[node.clone()]).unwrap_or_default();
        let mut end = prefix.clone();
        end.push(0xFF);
        let rows = tx
            .get_range(&prefix, &end, RangeOptions::default())
            .await
            .map_err(MaintenanceError::from)?;
        rows.iter()
            .map(|row| {
                let parts = subspace
                    .unpack(&row.key)
                    .map_err(|e| MaintenanceError::InvalidStructure {
                        index: self.descriptor.name.clone(),
                        message: e.to_string(),
                    })?;
                Ok(parts[1].clone())
            })
            .collect()
    }
}

#[async_trait]
impl<R: Record> IndexMaintainer<R> for AdjacencyMaintainer {
    async fn update(
        &self,
        old: Option<&R>,
        new: Option<&R>,
        _primary_key: &[Value],
        tx: &dyn Transaction,
    ) -> Result<(), MaintenanceError> {
        if let Some(old) = old {
            let (src, dst) = self.edge(old);
            tx.clear(&self.forward_key(&src, &dst));
            tx.clear(&self.reverse_key(&src, &dst));
        }
        if let Some(new) = new {
            let (src, dst) = self.edge(new);
            tx.set(self.forward_key(&src, &dst), Vec::new());
            tx.set(self.reverse_key(&src, &dst), Vec::new());
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

    fn compute_keys(&self, record: &R, _primary_key: &[Value]) -> Vec<Vec<u8>> {
        let (src, dst) = self.edge(record);
        vec![self.forward_key(&src, &dst), self.reverse_key(&src, &dst)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::mem::MemoryDatabase;
    use crate::kv::Database;
    use crate::model::{Capability, IndexKind};
    use crate::record::FieldTable;

    struct Edge {
        src: String,
        dst: String,
    }

    impl Record for Edge {
        const TYPE_NAME: &'static str = "edge";
        const FIELD_TABLE: FieldTable = FieldTable::new(&["src", "dst"]);

        fn field(&self, id: u16) -> Value {
            match id {
                0 => Value::String(self.src.clone()),
                1 => Value::String(self.dst.clone()),
                _ => Value::Null,
            }
        }

        fn primary_key(&self) -> Vec<Value> {
            vec![Value::String(format!("{}->{}", self.src, self.dst))]
        }
    }

    fn maintainer() -> AdjacencyMaintainer {
        let descriptor = IndexDescriptor::new(
            "follows",
            IndexKind::Graph(crate::model::GraphKind::Adjacency),
            Capability::default(),
            &Edge::FIELD_TABLE,
            &["src", "dst"],
            false,
            false,
            &[],
        )
        .unwrap();
        AdjacencyMaintainer::new(descriptor, Subspace::new(b"idx/graph".to_vec()))
    }

    #[tokio::test]
    async fn traversal_works_both_directions() {
        let db = MemoryDatabase::new();
        let maintainer = maintainer();
        let edge = Edge { src: "alice".into(), dst: "bob".into() };
        let tx = db.begin();
        maintainer.update(None, Some(&edge), &edge.primary_key(), &tx).await.unwrap();
        db.commit(&tx).await.unwrap();

        let tx = db.begin();
        let out = maintainer.out_neighbors(&Value::String("alice".into()), &tx).await.unwrap();
        let inc = maintainer.in_neighbors(&Value::String("bob".into()), &tx).await.unwrap();
        assert_eq!(out, vec![Value::String("bob".into())]);
        assert_eq!(inc, vec![Value::String("alice".into())]);
    }
}
