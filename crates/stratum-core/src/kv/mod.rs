//! Module: kv
//! Responsibility: the transactional KV store contract every other module
//! in this crate is written against (§6), plus the generic retry wrapper
//! (§5). The contract is consumed, never owned: the real FDB client lives
//! outside this crate's scope, and `mem` below is only a test double.
//! Does not own: directory-layer mapping, record envelope splitting, or
//! anything about how a concrete store turns bytes into durable storage.

pub mod mem;

use std::{future::Future, pin::Pin};
use thiserror::Error as ThisError;

use crate::config::TransactionConfig;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

///
/// KvError
/// KV-layer failure classification, per §7: transient (retryable) vs.
/// fatal (propagated immediately).
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum KvError {
    #[error("transaction conflict")]
    Conflict,
    #[error("commit result unknown")]
    CommitUnknown,
    #[error("transaction timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u32 },
    #[error("data corruption detected: {message}")]
    Corruption { message: String },
    #[error("permission denied")]
    PermissionDenied,
}

impl KvError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict | Self::CommitUnknown | Self::Timeout { .. })
    }
}

///
/// KvPair
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KvPair {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

///
/// RangeOptions
///

#[derive(Clone, Copy, Debug, Default)]
pub struct RangeOptions {
    pub limit: Option<usize>,
    pub reverse: bool,
    pub snapshot: bool,
}

///
/// Transaction
///
/// One FDB-style transaction: reads observe all of its own prior writes;
/// `get_range` yields ascending key order (descending when `reverse`).
/// Mutating methods are synchronous buffer operations (they stage writes
/// in the transaction, per FDB's own client API); only I/O-bound
/// operations (`get`, `get_range`, read-version negotiation) are async
/// suspension points, per §5.
///

#[async_trait::async_trait]
pub trait Transaction: Send + Sync {
    async fn get(&self, key: &[u8], snapshot: bool) -> Result<Option<Vec<u8>>, KvError>;
    fn set(&self, key: Vec<u8>, value: Vec<u8>);
    fn clear(&self, key: &[u8]);
    fn clear_range(&self, begin: &[u8], end: &[u8]);
    async fn get_range(
        &self,
        begin: &[u8],
        end: &[u8],
        opts: RangeOptions,
    ) -> Result<Vec<KvPair>, KvError>;
    /// Atomic little-endian `i64` add, per the byte convention in §6.
    fn atomic_add(&self, key: Vec<u8>, delta: i64);
    async fn get_read_version(&self) -> Result<i64, KvError>;
    fn set_read_version(&self, version: i64);
}

///
/// Database
///
/// The transaction factory. `run` is the only entry point maintainers,
/// the online indexer, and cursors use: it owns the retry loop so every
/// caller gets the same exponential-backoff-with-jitter policy (§5)
/// without re-implementing it.
///

#[async_trait::async_trait]
pub trait Database: Send + Sync {
    type Tx: Transaction;

    fn begin(&self) -> Self::Tx;
    async fn commit(&self, tx: &Self::Tx) -> Result<(), KvError>;

    async fn run<T, F>(&self, config: TransactionConfig, mut body: F) -> Result<T, KvError>
    where
        T: Send,
        F: for<'a> FnMut(&'a Self::Tx) -> BoxFuture<'a, Result<T, KvError>> + Send,
    {
        let mut attempt = 0u32;
        loop {
            let tx = self.begin();
            match body(&tx).await {
                Ok(value) => {
                    self.commit(&tx).await?;
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < config.retry_limit => {
                    tracing::warn!(attempt, error = %err, "kv transaction retrying");
                    let delay = backoff_delay(attempt);
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// `delay = min(initial * 2^attempt, max) + jitter∈[0, 0.5·delay]`, per §5.
fn backoff_delay(attempt: u32) -> std::time::Duration {
    use rand::Rng;

    let policy = crate::config::RetryPolicy::default();
    let base = policy.base_delay(attempt);
    let jitter_ms = rand::thread_rng().gen_range(0..=(base.as_millis() as u64 / 2).max(1));
    base + std::time::Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(KvError::Conflict.is_retryable());
        assert!(KvError::CommitUnknown.is_retryable());
        assert!(!KvError::PermissionDenied.is_retryable());
    }
}
