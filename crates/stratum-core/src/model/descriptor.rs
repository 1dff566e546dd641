use thiserror::Error as ThisError;

use crate::record::{FieldId, FieldTable};

use super::{Capability, IndexKind};

///
/// IndexDescriptorError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum IndexDescriptorError {
    #[error("index '{index}' references unknown field '{field}'")]
    UnknownField { index: String, field: String },
    #[error("index '{index}' must name at least one field")]
    EmptyFieldList { index: String },
    #[error("index '{index}' has more than {limit} stored fields")]
    TooManyStoredFields { index: String, limit: usize },
}

///
/// IndexDescriptor
///
/// Built once against a record type's `FieldTable`; resolves string field
/// names to `FieldId`s so maintainers never touch strings again (§3a).
/// Invariants enforced at construction, per §3:
/// - `field_names` is non-empty.
/// - every name resolves against the given `FieldTable`.
/// - `stored_field_names` fits in the 64-bit covering-value bitmap.
///

#[derive(Clone, Debug)]
pub struct IndexDescriptor {
    pub name: String,
    pub kind: IndexKind,
    pub capability: Capability,
    pub unique: bool,
    pub sparse: bool,
    field_names: Vec<String>,
    field_ids: Vec<FieldId>,
    stored_field_names: Vec<String>,
    stored_field_ids: Vec<FieldId>,
}

impl IndexDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        kind: IndexKind,
        capability: Capability,
        field_table: &FieldTable,
        field_names: &[&str],
        unique: bool,
        sparse: bool,
        stored_field_names: &[&str],
    ) -> Result<Self, IndexDescriptorError> {
        let name = name.into();
        if field_names.is_empty() {
            return Err(IndexDescriptorError::EmptyFieldList { index: name });
        }

        let field_ids = resolve_all(&name, field_table, field_names)?;
        if stored_field_names.len() > stratum_primitives::covering::MAX_COVERED_FIELDS {
            return Err(IndexDescriptorError::TooManyStoredFields {
                index: name,
                limit: stratum_primitives::covering::MAX_COVERED_FIELDS,
            });
        }
        let stored_field_ids = resolve_all(&name, field_table, stored_field_names)?;

        Ok(Self {
            name,
            kind,
            capability,
            unique,
            sparse,
            field_names: field_names.iter().map(|s| (*s).to_string()).collect(),
            field_ids,
            stored_field_names: stored_field_names.iter().map(|s| (*s).to_string()).collect(),
            stored_field_ids,
        })
    }

    #[must_use]
    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    #[must_use]
    pub fn field_ids(&self) -> &[FieldId] {
        &self.field_ids
    }

    #[must_use]
    pub fn stored_field_names(&self) -> &[String] {
        &self.stored_field_names
    }

    #[must_use]
    pub fn stored_field_ids(&self) -> &[FieldId] {
        &self.stored_field_ids
    }

    /// Whether this index's field prefix matches the start of `other`'s,
    /// used by the planner to recognize composite-index prefix coverage.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.field_names.len() < other.field_names.len()
            && other.field_names.starts_with(&self.field_names)
    }
}

fn resolve_all(
    index_name: &str,
    field_table: &FieldTable,
    names: &[&str],
) -> Result<Vec<FieldId>, IndexDescriptorError> {
    names
        .iter()
        .map(|name| {
            field_table
                .resolve(name)
                .ok_or_else(|| IndexDescriptorError::UnknownField {
                    index: index_name.to_string(),
                    field: (*name).to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VectorMetric;

    fn table() -> FieldTable {
        FieldTable::new(&["customer_id", "status", "created_at"])
    }

    #[test]
    fn resolves_field_names_to_ids() {
        let d = IndexDescriptor::new(
            "by_customer_status_created",
            IndexKind::Scalar,
            Capability::default(),
            &table(),
            &["customer_id", "status", "created_at"],
            false,
            false,
            &[],
        )
        .unwrap();
        assert_eq!(d.field_ids(), &[0, 1, 2]);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = IndexDescriptor::new(
            "bad",
            IndexKind::Scalar,
            Capability::default(),
            &table(),
            &["nonexistent"],
            false,
            false,
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, IndexDescriptorError::UnknownField { .. }));
    }

    #[test]
    fn prefix_relationship_detected() {
        let full = IndexDescriptor::new(
            "full",
            IndexKind::Scalar,
            Capability::default(),
            &table(),
            &["customer_id", "status", "created_at"],
            false,
            false,
            &[],
        )
        .unwrap();
        let prefix = IndexDescriptor::new(
            "prefix",
            IndexKind::Scalar,
            Capability::default(),
            &table(),
            &["customer_id", "status"],
            false,
            false,
            &[],
        )
        .unwrap();
        assert!(prefix.is_prefix_of(&full));
        assert!(!full.is_prefix_of(&prefix));
    }

    #[test]
    fn vector_capability_carries_dims_and_metric() {
        let cap = Capability::vector(128, VectorMetric::Cosine);
        assert_eq!(cap.dims, Some(128));
    }
}
