//! Module: index::graph
//! Responsibility: the graph `IndexMaintainer` family (§4.3.4): bidirectional
//! adjacency, a triple store with the three SPARQL-pattern row orders, and
//! a persistent union-find supporting `owl:sameAs`-style equivalence
//! classes, plus bounded PageRank/label-propagation over the adjacency
//! view.

mod adjacency;
mod algorithms;
mod triple;
mod union_find;

pub use adjacency::AdjacencyMaintainer;
pub use algorithms::{label_propagation, page_rank};
pub use triple::TripleMaintainer;
pub use union_find::UnionFind;

use async_trait::async_trait;
use stratum_primitives::Value;

use crate::kv::Transaction;
use crate::record::Record;

use super::{IndexMaintainer, MaintenanceError};

/// Dispatches to `Adjacency` or `Triple` by kind (§9 "sum types over
/// protocols").
pub enum GraphMaintainer {
    Adjacency(AdjacencyMaintainer),
    Triple(TripleMaintainer),
}

#[async_trait]
impl<R: Record> IndexMaintainer<R> for GraphMaintainer {
    async fn update(
        &self,
        old: Option<&R>,
        new: Option<&R>,
        primary_key: &[Value],
        tx: &dyn Transaction,
    ) -> Result<(), MaintenanceError> {
        match self {
            Self::Adjacency(m) => m.update(old, new, primary_key, tx).await,
            Self::Triple(m) => m.update(old, new, primary_key, tx).await,
        }
    }

    async fn scan_item(
        &self,
        record: &R,
        primary_key: &[Value],
        tx: &dyn Transaction,
    ) -> Result<Vec<MaintenanceError>, MaintenanceError> {
        match self {
            Self::Adjacency(m) => m.scan_item(record, primary_key, tx).await,
            Self::Triple(m) => m.scan_item(record, primary_key, tx).await,
        }
    }

    fn compute_keys(&self, record: &R, primary_key: &[Value]) -> Vec<Vec<u8>> {
        match self {
            Self::Adjacency(m) => m.compute_keys(record, primary_key),
            Self::Triple(m) => m.compute_keys(record, primary_key),
        }
    }
}
