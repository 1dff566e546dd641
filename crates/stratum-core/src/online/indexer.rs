//! Module: online::indexer
//! Responsibility: the resumable online indexer (§4.5): scans the record
//! space in primary-key order, batching `N` records per transaction, and
//! invokes `scan_item` on each newly built maintainer. Progress is the
//! last primary key processed, so an interrupted build resumes without
//! rescanning from the start.

use async_trait::async_trait;
use stratum_primitives::Value;

use crate::index::{IndexMaintainer, MaintenanceError};
use crate::kv::Transaction;
use crate::record::Record;

use super::UniquenessTracker;

///
/// IndexState
///
/// One-way except `Readable -> Disabled` via drop (§4.5): writes attach
/// new maintainers at `WriteOnly`; the planner only considers an index
/// once it reaches `Readable`.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IndexState {
    Disabled,
    WriteOnly,
    ReadableWrite,
    Readable,
}

impl IndexState {
    /// Whether `self -> next` is a legal one-way transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disabled, Self::WriteOnly)
                | (Self::WriteOnly, Self::ReadableWrite)
                | (Self::ReadableWrite, Self::Readable)
                | (Self::Readable, Self::Disabled)
        )
    }

    #[must_use]
    pub const fn accepts_writes(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadableWrite | Self::Readable)
    }

    #[must_use]
    pub const fn visible_to_planner(self) -> bool {
        matches!(self, Self::Readable)
    }
}

/// The record space an `OnlineIndexer` walks: batches of `(primary_key,
/// record)` in ascending primary-key order, resumable from a cursor.
/// Implemented against whatever table/subspace actually stores records —
/// out of this crate's scope (§1) beyond this contract.
#[async_trait]
pub trait RecordSource<R: Record>: Send + Sync {
    async fn scan_batch(
        &self,
        after: Option<&[Value]>,
        batch_size: usize,
        tx: &dyn Transaction,
    ) -> Result<Vec<(Vec<Value>, R)>, MaintenanceError>;
}

///
/// OnlineIndexer
///

pub struct OnlineIndexer<R: Record> {
    batch_size: usize,
    progress: parking_lot::Mutex<Option<Vec<Value>>>,
    _marker: std::marker::PhantomData<fn() -> R>,
}

impl<R: Record> OnlineIndexer<R> {
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            progress: parking_lot::Mutex::new(None),
            _marker: std::marker::PhantomData,
        }
    }

    #[must_use]
    pub fn last_primary_key(&self) -> Option<Vec<Value>> {
        self.progress.lock().clone()
    }

    /// Resume from a previously persisted cursor, e.g. after a crash.
    pub fn resume_from(&self, last_primary_key: Vec<Value>) {
        *self.progress.lock() = Some(last_primary_key);
    }

    /// Process one batch: pulls up to `batch_size` records after the
    /// current progress cursor, calls `scan_item` on each, and records
    /// uniqueness violations instead of aborting the batch. Returns the
    /// number of records processed; `0` means the scan is complete.
    pub async fn index_batch<M, S>(
        &self,
        maintainer: &M,
        source: &S,
        violations: &UniquenessTracker,
        record_type: &str,
        detected_at: i64,
        tx: &dyn Transaction,
    ) -> Result<usize, MaintenanceError>
    where
        M: IndexMaintainer<R>,
        S: RecordSource<R>,
    {
        let cursor = self.progress.lock().clone();
        let batch = source.scan_batch(cursor.as_deref(), self.batch_size, tx).await?;
        if batch.is_empty() {
            return Ok(0);
        }

        for (primary_key, record) in &batch {
            let found = maintainer.scan_item(record, primary_key, tx).await?;
            for violation in found {
                if let MaintenanceError::UniquenessViolation { index, value, existing_pk, new_pk } = violation {
                    violations
                        .record(&index, record_type, value.as_bytes(), new_pk.as_bytes(), detected_at, tx)
                        .await?;
                    tracing::warn!(index = %index, %existing_pk, %new_pk, "uniqueness violation recorded during online build");
                }
            }
        }

        let processed = batch.len();
        *self.progress.lock() = batch.last().map(|(pk, _)| pk.clone());
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_only_allows_forward_transitions() {
        assert!(IndexState::Disabled.can_transition_to(IndexState::WriteOnly));
        assert!(IndexState::WriteOnly.can_transition_to(IndexState::ReadableWrite));
        assert!(IndexState::ReadableWrite.can_transition_to(IndexState::Readable));
        assert!(!IndexState::Disabled.can_transition_to(IndexState::Readable));
        assert!(!IndexState::Readable.can_transition_to(IndexState::WriteOnly));
    }

    #[test]
    fn only_readable_is_visible_to_the_planner() {
        assert!(!IndexState::ReadableWrite.visible_to_planner());
        assert!(IndexState::Readable.visible_to_planner());
    }
}
