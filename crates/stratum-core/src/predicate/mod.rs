//! Module: predicate
//! Responsibility: the tagged predicate-expression tree the planner
//! accepts (§4.8, §6): `Comparison`/`And`/`Or`/`Not`/`IsNull`/`IsNotNull`/
//! `True`/`False` over the `record::FieldId` address space. Conversion to
//! and from a generic expression tree is lossless for this subset.

use stratum_primitives::Value;

use crate::record::FieldId;

///
/// ComparisonOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    Ilike,
    In,
}

///
/// Predicate
///

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Comparison { field: FieldId, op: ComparisonOp, value: Value },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    IsNull(FieldId),
    IsNotNull(FieldId),
    True,
    False,
}

impl Predicate {
    #[must_use]
    pub fn eq(field: FieldId, value: impl Into<Value>) -> Self {
        Self::Comparison { field, op: ComparisonOp::Eq, value: value.into() }
    }

    /// Fields referenced anywhere in the tree, in traversal order
    /// (duplicates kept — callers that need a set can dedup).
    #[must_use]
    pub fn referenced_fields(&self) -> Vec<FieldId> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields(&self, out: &mut Vec<FieldId>) {
        match self {
            Self::Comparison { field, .. } | Self::IsNull(field) | Self::IsNotNull(field) => {
                out.push(*field);
            }
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            Self::Not(inner) => inner.collect_fields(out),
            Self::True | Self::False => {}
        }
    }

    /// Whether this predicate is a single equality/range comparison (or
    /// a conjunction of them) on a prefix of `field_order`, the shape
    /// rule 1 (`Filter(Scan) -> IndexSeek`) looks for.
    #[must_use]
    pub fn equality_prefix(&self, field_order: &[FieldId]) -> Vec<(FieldId, Value)> {
        let conjuncts = match self {
            Self::And(children) => children.clone(),
            other => vec![other.clone()],
        };

        let mut by_field = std::collections::HashMap::new();
        for conjunct in &conjuncts {
            if let Self::Comparison { field, op: ComparisonOp::Eq, value } = conjunct {
                by_field.insert(*field, value.clone());
            }
        }

        let mut prefix = Vec::new();
        for field in field_order {
            match by_field.get(field) {
                Some(value) => prefix.push((*field, value.clone())),
                None => break,
            }
        }
        prefix
    }
}
