//! Module: online
//! Responsibility: the resumable online indexer and uniqueness-violation
//! tracker (§4.5), plus the `GraphAlgorithmError` leaf type the graph
//! maintainers' union-find and traversal algorithms return (§7).
//! Does not own: maintainer behavior itself — this module only drives
//! `scan_item` across the record space and tracks what it finds.

mod indexer;
mod uniqueness;

pub use indexer::{IndexState, OnlineIndexer};
pub use uniqueness::{UniquenessTracker, ViolationRecord};

use thiserror::Error as ThisError;

///
/// GraphAlgorithmError
/// Leaf error for the graph/union-find algorithms, per §7.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum GraphAlgorithmError {
    #[error("graph index not configured for '{name}'")]
    IndexNotConfigured { name: String },
    #[error("individual '{iri}' not found")]
    IndexNotFound { iri: String },
}
