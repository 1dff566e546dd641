//! Module: online::uniqueness
//! Responsibility: the Uniqueness Violation Tracker (§4.5): online-build
//! `scan_item` calls downgrade a `UniquenessViolation` into an appended
//! record here instead of aborting the batch (§7's "only error-downgrade
//! in the core").

use serde::{Deserialize, Serialize};
use stratum_primitives::{Subspace, Value};

use crate::index::MaintenanceError;
use crate::kv::{RangeOptions, Transaction};

///
/// ViolationRecord
/// Persisted as JSON per §6: `{index_name, type, value_key, primary_keys,
/// detected_at}`.
///

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViolationRecord {
    pub index_name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub value_key: Vec<u8>,
    pub primary_keys: Vec<Vec<u8>>,
    pub detected_at: i64,
}

///
/// UniquenessTracker
///

pub struct UniquenessTracker {
    subspace: Subspace,
}

impl UniquenessTracker {
    #[must_use]
    pub fn new(subspace: Subspace) -> Self {
        Self { subspace }
    }

    fn key(&self, index_name: &str, value_key: &[u8]) -> Vec<u8> {
        self.subspace
            .pack(&[Value::String(index_name.to_string()), Value::Bytes(value_key.to_vec())])
            .unwrap_or_default()
    }

    /// Record a violation, merging `new_pk` into an existing entry's
    /// `primary_keys` for the same `(index_name, value_key)` rather than
    /// creating a duplicate row.
    pub async fn record(
        &self,
        index_name: &str,
        record_type: &str,
        value_key: &[u8],
        new_pk: &[u8],
        detected_at: i64,
        tx: &dyn Transaction,
    ) -> Result<(), MaintenanceError> {
        let key = self.key(index_name, value_key);
        let mut record = match tx.get(&key, false).await.map_err(MaintenanceError::from)? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| MaintenanceError::InvalidStructure {
                index: index_name.to_string(),
                message: e.to_string(),
            })?,
            None => ViolationRecord {
                index_name: index_name.to_string(),
                record_type: record_type.to_string(),
                value_key: value_key.to_vec(),
                primary_keys: Vec::new(),
                detected_at,
            },
        };
        if !record.primary_keys.iter().any(|pk| pk == new_pk) {
            record.primary_keys.push(new_pk.to_vec());
        }
        let bytes = serde_json::to_vec(&record).map_err(|e| MaintenanceError::InvalidStructure {
            index: index_name.to_string(),
            message: e.to_string(),
        })?;
        tx.set(key, bytes);
        Ok(())
    }

    /// All violations recorded for `index_name`.
    pub async fn scan(
        &self,
        index_name: &str,
        tx: &dyn Transaction,
    ) -> Result<Vec<ViolationRecord>, MaintenanceError> {
        let prefix = self.subspace.pack(&[Value::String(index_name.to_string())]).unwrap_or_default();
        let mut end = prefix.clone();
        end.push(0xFF);
        let rows = tx
            .get_range(&prefix, &end, RangeOptions::default())
            .await
            .map_err(MaintenanceError::from)?;
        rows.iter()
            .map(|row| {
                serde_json::from_slice(&row.value).map_err(|e| MaintenanceError::InvalidStructure {
                    index: index_name.to_string(),
                    message: e.to_string(),
                })
            })
            .collect()
    }

    /// Whether a prior violation for `(index_name, value_key)` has been
    /// resolved (all but one conflicting primary key since deleted).
    /// Returns `true` (resolved) when no record remains, or the record's
    /// `primary_keys` now has at most one entry.
    pub async fn verify_resolution(
        &self,
        index_name: &str,
        value_key: &[u8],
        tx: &dyn Transaction,
    ) -> Result<bool, MaintenanceError> {
        let key = self.key(index_name, value_key);
        match tx.get(&key, false).await.map_err(MaintenanceError::from)? {
            None => Ok(true),
            Some(bytes) => {
                let record: ViolationRecord =
                    serde_json::from_slice(&bytes).map_err(|e| MaintenanceError::InvalidStructure {
                        index: index_name.to_string(),
                        message: e.to_string(),
                    })?;
                Ok(record.primary_keys.len() <= 1)
            }
        }
    }

    pub fn clear(&self, index_name: &str, value_key: &[u8], tx: &dyn Transaction) {
        tx.clear(&self.key(index_name, value_key));
    }

    pub fn clear_all(&self, index_name: &str, tx: &dyn Transaction) {
        let prefix = self.subspace.pack(&[Value::String(index_name.to_string())]).unwrap_or_default();
        let mut end = prefix.clone();
        end.push(0xFF);
        tx.clear_range(&prefix, &end);
    }
}
