//! Module: record
//! Responsibility: the typed-record contract (§3, §3a, §6) maintainers and
//! the planner are written against. Replaces the dynamic string-keyed
//! field lookup a reflective source language would use with a compile-time
//! `FieldTable` and a `FieldId` dispatcher, per the redesign notes in §9.
//! Does not own: schema parsing, derive-macro generation, or anything
//! about *how* a record type's fields were declared — only the contract a
//! generated or hand-written `impl Record` must satisfy.

use stratum_primitives::Value;

/// Index into a record type's `FieldTable`, assigned in declaration order.
pub type FieldId = u16;

///
/// FieldTable
///
/// Ordered field-name table for one record type. Built once (typically by
/// a derive macro, out of this crate's scope) and held as a `'static`
/// associated const; index descriptors resolve their string
/// `field_names` against this table exactly once, at registration time,
/// and cache the resulting `FieldId`s (§3a).
///

#[derive(Clone, Copy, Debug)]
pub struct FieldTable {
    names: &'static [&'static str],
}

impl FieldTable {
    #[must_use]
    pub const fn new(names: &'static [&'static str]) -> Self {
        Self { names }
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<FieldId> {
        self.names
            .iter()
            .position(|candidate| *candidate == name)
            .map(|i| i as FieldId)
    }

    #[must_use]
    pub fn name(&self, id: FieldId) -> Option<&'static str> {
        self.names.get(id as usize).copied()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

///
/// Record
///
/// A stable `TYPE_NAME`, a `FIELD_TABLE` giving `FieldId`s their names, a
/// `FieldId`-addressed accessor, and a primary-key extractor. Maintainers
/// never materialize a full record more than once per `update` call (§6);
/// callers own fetching the record, this trait only owns reading fields
/// out of it.
///

pub trait Record: Send + Sync {
    const TYPE_NAME: &'static str;
    const FIELD_TABLE: FieldTable;

    /// Read one field by its stable `FieldId`. Returns `Value::Null` for
    /// fields the record genuinely has no value for (never panics).
    fn field(&self, id: FieldId) -> Value;

    /// Primary key tuple, stable across the record's lifetime.
    fn primary_key(&self) -> Vec<Value>;

    fn field_by_name(&self, name: &str) -> Option<Value> {
        Self::FIELD_TABLE.resolve(name).map(|id| self.field(id))
    }
}
