//! Module: index::graph::triple
//! Responsibility: the triple-store graph maintainer (§4.3.4): each
//! record is an `(s, p, o)` edge; three row orders (SPO, POS, OSP) are
//! maintained so any two-bound SPARQL-style pattern is a single prefix
//! scan.

use async_trait::async_trait;
use stratum_primitives::{Subspace, Value};

use crate::kv::{RangeOptions, Transaction};
use crate::model::IndexDescriptor;
use crate::record::Record;

use super::super::{IndexMaintainer, MaintenanceError};

///
/// TriplePattern
/// A SPARQL-style pattern with zero, one, or two bound positions; the
/// maintainer picks whichever of SPO/POS/OSP has the longest bound
/// prefix.
///

#[derive(Clone, Debug, Default)]
pub struct TriplePattern {
    pub subject: Option<Value>,
    pub predicate: Option<Value>,
    pub object: Option<Value>,
}

///
/// TripleMaintainer
///

pub struct TripleMaintainer {
    descriptor: IndexDescriptor,
    spo: Subspace,
    pos: Subspace,
    osp: Subspace,
}

impl TripleMaintainer {
    #[must_use]
    pub fn new(descriptor: IndexDescriptor, subspace: Subspace) -> Self {
        Self {
            spo: subspace.subspace("spo"),
            pos: subspace.subspace("pos"),
            osp: subspace.subspace("osp"),
            descriptor,
        }
    }

    fn triple<R: Record>(&self, record: &R) -> (Value, Value, Value) {
        let ids = self.descriptor.field_ids();
        (record.field(ids[0]), record.field(ids[1]), record.field(ids[2]))
    }

    fn keys(&self, s: &Value, p: &Value, o: &Value) -> [Vec<u8>; 3] {
        [
            self.spo.pack(&[s.clone(), p.clone(), o.clone()]).unwrap_or_default(),
            self.pos.pack(&[p.clone(), o.clone(), s.clone()]).unwrap_or_default(),
            self.osp.pack(&[o.clone(), s.clone(), p.clone()]).unwrap_or_default(),
        ]
    }

    /// Query by pattern, choosing whichever index has the longest
    /// contiguous bound prefix among `(s,p,o)`, `(p,o,s)`, `(o,s,p)`.
    pub async fn query(
        &self,
        pattern: &TriplePattern,
        tx: &dyn Transaction,
    ) -> Result<Vec<(Value, Value, Value)>, MaintenanceError> {
        let (subspace, prefix, unpack_order): (&Subspace, Vec<Value>, [usize; 3]) =
            match (&pattern.subject, &pattern.predicate, &pattern.object) {
                (Some(s), Some(p), _) => (&self.spo, vec![s.clone(), p.clone()], [0, 1, 2]),
                (_, Some(p), Some(o)) => (&self.pos, vec![p.clone(), o.clone()], [2, 0, 1]),
                (Some(s), _, Some(o)) => (&self.osp, vec![o.clone(), s.clone()], [1, 2, 0]),
                (Some(s), None, None) => (&self.spo, vec![s.clone()], [0, 1, 2]),
                (None, Some(p), None) => (&self.pos, vec![p.clone()], [2, 0, 1]),
                (None, None, Some(o)) => (&self.osp, vec![o.clone()], [1, 2, 0]),
                (None, None, None) => (&self.spo, vec![], [0, 1, 2]),
            };

        let begin = subspace.pack(&prefix).unwrap_or_default();
        let mut end = begin.clone();
        end.push(0xFF);
        let rows = tx.get_range(&begin, &end, RangeOptions::default()).await.map_err(MaintenanceError::from)?;

        rows.iter()
            .map(|row| {
                let parts = subspace
                    .unpack(&row.key)
                    .map_err(|e| MaintenanceError::InvalidStructure {
                        index: self.descriptor.name.clone(),
                        message: e.to_string(),
                    })?;
                Ok((
                    parts[unpack_order[0]].clone(),
                    parts[unpack_order[1]].clone(),
                    parts[unpack_order[2]].clone(),
                ))
            })
            .collect()
    }
}

#[async_trait]
impl<R: Record> IndexMaintainer<R> for TripleMaintainer {
    async fn update(
        &self,
        old: Option<&R>,
        new: Option<&R>,
        _primary_key: &[Value],
        tx: &dyn Transaction,
    ) -> Result<(), MaintenanceError> {
        if let Some(old) = old {
            let (s, p, o) = self.triple(old);
            for key in self.keys(&s, &p, &o) {
                tx.clear(&key);
            }
        }
        if let Some(new) = new {
            let (s, p, o) = self.triple(new);
            for key in self.keys(&s, &p, &o) {
                tx.set(key, Vec::new());
            }
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
        let (s, p, o) = self.triple(record);
        self.keys(&s, &p, &o).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::mem::MemoryDatabase;
    use crate::kv::Database;
    use crate::model::{Capability, GraphKind, IndexKind};
    use crate::record::FieldTable;

    struct Triple {
        s: String,
        p: String,
        o: String,
    }

    impl Record for Triple {
        const TYPE_NAME: &'static str = "triple";
        const FIELD_TABLE: FieldTable = FieldTable::new(&["s", "p", "o"]);

        fn field(&self, id: u16) -> Value {
            match id {
                0 => Value::String(self.s.clone()),
                1 => Value::String(self.p.clone()),
                2 => Value::String(self.o.clone()),
                _ => Value::Null,
            }
        }

        fn primary_key(&self) -> Vec<Value> {
            vec![Value::String(format!("{}|{}|{}", self.s, self.p, self.o))]
        }
    }

    fn maintainer() -> TripleMaintainer {
        let descriptor = IndexDescriptor::new(
            "triples",
            IndexKind::Graph(GraphKind::Triple),
            Capability::default(),
            &Triple::FIELD_TABLE,
            &["s", "p", "o"],
            false,
            false,
            &[],
        )
        .unwrap();
        TripleMaintainer::new(descriptor, Subspace::new(b"idx/triple".to_vec()))
    }

    #[tokio::test]
    async fn any_two_bound_pattern_resolves_via_prefix_scan() {
        let db = MemoryDatabase::new();
        let maintainer = maintainer();
        let triple = Triple { s: "alice".into(), p: "knows".into(), o: "bob".into() };
        let tx = db.begin();
        maintainer.update(None, Some(&triple), &triple.primary_key(), &tx).await.unwrap();
        db.commit(&tx).await.unwrap();

        let tx = db.begin();
        let by_po = maintainer
            .query(
                &TriplePattern {
                    subject: None,
                    predicate: Some(Value::String("knows".into())),
                    object: Some(Value::String("bob".into())),
                },
                &tx,
            )
            .await
            .unwrap();
        assert_eq!(
            by_po,
            vec![(
                Value::String("alice".into()),
                Value::String("knows".into()),
                Value::String("bob".into())
            )]
        );
    }
}
