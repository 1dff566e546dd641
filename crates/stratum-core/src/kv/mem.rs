//! In-memory `Database`/`Transaction` implementation used by this crate's
//! own test suite and available to embedders who want to exercise the
//! maintainer/planner/cursor stack without a live FDB cluster. Not a
//! conflict-checking MVCC engine: writes from a committed transaction are
//! applied in full, last-committer-wins. Production conflict detection is
//! FDB's job and out of this crate's scope (§1).

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;

use super::{Database, KvError, KvPair, RangeOptions, Transaction};

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>,
    read_version: Arc<AtomicI64>,
}

impl MemoryDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the full keyspace; used by tests to assert on index shape
    /// directly rather than through the maintainer API.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.inner.lock().clone()
    }
}

pub struct MemoryTransaction {
    store: Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>,
    read_version: Arc<AtomicI64>,
    writes: Mutex<Vec<WriteOp>>,
}

enum WriteOp {
    Set(Vec<u8>, Vec<u8>),
    Clear(Vec<u8>),
    ClearRange(Vec<u8>, Vec<u8>),
    Add(Vec<u8>, i64),
}

#[async_trait::async_trait]
impl Database for MemoryDatabase {
    type Tx = MemoryTransaction;

    fn begin(&self) -> Self::Tx {
        MemoryTransaction {
            store: Arc::clone(&self.inner),
            read_version: Arc::clone(&self.read_version),
            writes: Mutex::new(Vec::new()),
        }
    }

    async fn commit(&self, tx: &Self::Tx) -> Result<(), KvError> {
        let mut store = self.inner.lock();
        for op in tx.writes.lock().drain(..) {
            match op {
                WriteOp::Set(k, v) => {
                    store.insert(k, v);
                }
                WriteOp::Clear(k) => {
                    store.remove(&k);
                }
                WriteOp::ClearRange(begin, end) => {
                    let keys: Vec<_> = store.range(begin..end).map(|(k, _)| k.clone()).collect();
                    for k in keys {
                        store.remove(&k);
                    }
                }
                WriteOp::Add(k, delta) => {
                    let existing = store.get(&k).map_or(0i64, |v| {
                        let mut buf = [0u8; 8];
                        let n = v.len().min(8);
                        buf[..n].copy_from_slice(&v[..n]);
                        i64::from_le_bytes(buf)
                    });
                    store.insert(k, (existing + delta).to_le_bytes().to_vec());
                }
            }
        }
        self.read_version.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&self, key: &[u8], _snapshot: bool) -> Result<Option<Vec<u8>>, KvError> {
        for op in self.writes.lock().iter().rev() {
            match op {
                WriteOp::Set(k, v) if k == key => return Ok(Some(v.clone())),
                WriteOp::Clear(k) if k == key => return Ok(None),
                _ => {}
            }
        }
        Ok(self.store.lock().get(key).cloned())
    }

    fn set(&self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.lock().push(WriteOp::Set(key, value));
    }

    fn clear(&self, key: &[u8]) {
        self.writes.lock().push(WriteOp::Clear(key.to_vec()));
    }

    fn clear_range(&self, begin: &[u8], end: &[u8]) {
        self.writes
            .lock()
            .push(WriteOp::ClearRange(begin.to_vec(), end.to_vec()));
    }

    async fn get_range(
        &self,
        begin: &[u8],
        end: &[u8],
        opts: RangeOptions,
    ) -> Result<Vec<KvPair>, KvError> {
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = self
            .store
            .lock()
            .range(begin.to_vec()..end.to_vec())
            .map(|(k, v)| (k.clone(), Some(v.clone())))
            .collect();

        for op in self.writes.lock().iter() {
            match op {
                WriteOp::Set(k, v) if k.as_slice() >= begin && k.as_slice() < end => {
                    merged.insert(k.clone(), Some(v.clone()));
                }
                WriteOp::Clear(k) if k.as_slice() >= begin && k.as_slice() < end => {
                    merged.insert(k.clone(), None);
                }
                WriteOp::ClearRange(b, e) => {
                    let keys: Vec<_> = merged
                        .range(b.clone()..e.clone())
                        .map(|(k, _)| k.clone())
                        .collect();
                    for k in keys {
                        merged.insert(k, None);
                    }
                }
                _ => {}
            }
        }

        let mut pairs: Vec<KvPair> = merged
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| KvPair { key, value }))
            .collect();

        if opts.reverse {
            pairs.reverse();
        }
        if let Some(limit) = opts.limit {
            pairs.truncate(limit);
        }
        Ok(pairs)
    }

    fn atomic_add(&self, key: Vec<u8>, delta: i64) {
        self.writes.lock().push(WriteOp::Add(key, delta));
    }

    async fn get_read_version(&self) -> Result<i64, KvError> {
        Ok(self.read_version.load(Ordering::SeqCst))
    }

    fn set_read_version(&self, version: i64) {
        self.read_version.store(version, Ordering::SeqCst);
    }
}
