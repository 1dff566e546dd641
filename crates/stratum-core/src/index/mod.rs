//! Module: index
//! Responsibility: the `IndexMaintainer` protocol (§4.3) and its four
//! closed-variant implementations (scalar, rank, vector, graph). Every
//! maintainer is written against `kv::Transaction` and `record::Record`;
//! none of them know about the planner or the online indexer beyond the
//! `update`/`scan_item`/`compute_keys` contract.
//! Does not own: deciding *which* maintainers apply to a write (that's
//! the data store's job, out of this crate's scope) or query planning.

pub mod graph;
pub mod rank;
pub mod scalar;
pub mod vector;

use async_trait::async_trait;
use thiserror::Error as ThisError;

use crate::kv::{KvError, Transaction};
use crate::record::Record;

pub use graph::GraphMaintainer;
pub use rank::RankMaintainer;
pub use scalar::ScalarMaintainer;
pub use vector::VectorMaintainer;

///
/// MaintenanceError
/// Leaf error for the `index` subsystem, per §7 and the `From` impl in
/// `error.rs`.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum MaintenanceError {
    #[error("index '{index}' uniqueness violated by value {value}: existing={existing_pk}, new={new_pk}")]
    UniquenessViolation {
        index: String,
        value: String,
        existing_pk: String,
        new_pk: String,
    },
    #[error("index '{index}' expected {expected} dims, got {actual}")]
    DimensionMismatch {
        index: String,
        expected: u32,
        actual: u32,
    },
    #[error("index '{index}' structure invalid: {message}")]
    InvalidStructure { index: String, message: String },
}

impl From<KvError> for MaintenanceError {
    fn from(err: KvError) -> Self {
        Self::InvalidStructure {
            index: String::new(),
            message: err.to_string(),
        }
    }
}

///
/// IndexMaintainer
///
/// Closed variant set replacing a `dyn`-style protocol hierarchy (§9):
/// every maintainer kind is modeled here and dispatches by `match`. `R`
/// is generic over the record type a given `IndexDescriptor` was
/// resolved against.
///

#[async_trait]
pub trait IndexMaintainer<R: Record>: Send + Sync {
    /// `(None, Some)` insert, `(Some, None)` delete, `(Some, Some)`
    /// update. Transactional: no partial writes survive a rollback, and
    /// effects are idempotent across a retried transaction.
    async fn update(
        &self,
        old: Option<&R>,
        new: Option<&R>,
        primary_key: &[stratum_primitives::Value],
        tx: &dyn Transaction,
    ) -> Result<(), MaintenanceError>;

    /// Equivalent to `update(None, Some(record), ..)` but used by the
    /// online builder: uniqueness violations are recorded to a tracker
    /// subspace instead of failing the transaction.
    async fn scan_item(
        &self,
        record: &R,
        primary_key: &[stratum_primitives::Value],
        tx: &dyn Transaction,
    ) -> Result<Vec<MaintenanceError>, MaintenanceError>;

    /// Pure: the keys this record would occupy in this index. Used by
    /// the scrubber to verify entries exist without touching storage.
    fn compute_keys(
        &self,
        record: &R,
        primary_key: &[stratum_primitives::Value],
    ) -> Vec<Vec<u8>>;
}
