use crate::{
    error::CodecError,
    tuple::{self, MAX_KEY_BYTES},
    value::Value,
};

///
/// Subspace
///
/// A byte-prefix plus the tuple codec, per §3. Subspaces compose:
/// `parent.subspace(x)` extends the prefix by the packed form of a single
/// value, the way a directory layer nests logical namespaces under one
/// physical key range.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subspace {
    prefix: Vec<u8>,
}

impl Subspace {
    #[must_use]
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Extend this subspace with one more path component.
    #[must_use]
    pub fn subspace(&self, component: impl Into<Value>) -> Self {
        let mut prefix = self.prefix.clone();
        prefix.extend_from_slice(&tuple::pack(&[component.into()]));
        Self { prefix }
    }

    /// Pack a tuple under this subspace, rejecting keys over the 10 KB limit.
    pub fn pack(&self, values: &[Value]) -> Result<Vec<u8>, CodecError> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(&tuple::pack(values));
        if key.len() > MAX_KEY_BYTES {
            return Err(CodecError::KeyTooLarge {
                len: key.len(),
                limit: MAX_KEY_BYTES,
            });
        }
        Ok(key)
    }

    /// Strip this subspace's prefix from `key` and unpack the remainder.
    pub fn unpack(&self, key: &[u8]) -> Result<Vec<Value>, CodecError> {
        let rest = key.strip_prefix(self.prefix.as_slice()).ok_or_else(|| {
            CodecError::corrupted_tuple("key does not belong to this subspace")
        })?;
        tuple::unpack(rest)
    }

    /// Pure byte-prefix check.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.prefix)
    }

    /// `(begin, end)` bytes bounding every key under this subspace, half-open
    /// `[begin, end)`. `end` is the strict successor of the prefix (the
    /// smallest byte string that is not prefixed by it).
    #[must_use]
    pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
        (self.prefix.clone(), strinc(&self.prefix))
    }
}

/// Smallest byte string greater than every string prefixed by `prefix`:
/// increment the last byte that isn't `0xFF`, dropping any trailing `0xFF`
/// bytes first. If `prefix` is all `0xFF` (including empty), append `0xFF`.
fn strinc(prefix: &[u8]) -> Vec<u8> {
    let mut out = prefix.to_vec();
    while let Some(&last) = out.last() {
        if last == 0xFF {
            out.pop();
        } else {
            break;
        }
    }
    match out.last_mut() {
        Some(last) => {
            *last += 1;
        }
        None => out.push(0xFF),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composed_subspace_extends_prefix() {
        let root = Subspace::new(b"users".to_vec());
        let by_email = root.subspace("by_email");
        assert!(by_email.prefix().starts_with(b"users"));
        assert_ne!(by_email.prefix(), root.prefix());
    }

    #[test]
    fn range_bounds_all_prefixed_keys() {
        let sub = Subspace::new(vec![0x01, 0x02]);
        let (begin, end) = sub.range();
        assert!(begin.as_slice() < [0x01, 0x02, 0x00].as_slice());
        assert!(end.as_slice() > [0x01, 0x02, 0xFF, 0xFF].as_slice());
        assert!(sub.contains(&[0x01, 0x02, 0x99]));
        assert!(!sub.contains(&[0x01, 0x03]));
    }

    #[test]
    fn pack_unpack_round_trips_through_prefix() {
        let sub = Subspace::new(b"idx".to_vec());
        let key = sub.pack(&[Value::String("a".into()), Value::Int(1)]).unwrap();
        assert!(sub.contains(&key));
        let values = sub.unpack(&key).unwrap();
        assert_eq!(values, vec![Value::String("a".into()), Value::Int(1)]);
    }

    #[test]
    fn oversized_key_is_rejected() {
        let sub = Subspace::new(Vec::new());
        let big = Value::Bytes(vec![0u8; super::MAX_KEY_BYTES]);
        assert!(matches!(
            sub.pack(&[big]),
            Err(CodecError::KeyTooLarge { .. })
        ));
    }

    #[test]
    fn strinc_all_ff_prefix_appends_byte() {
        assert_eq!(strinc(&[0xFF, 0xFF]), vec![0xFF, 0xFF, 0xFF]);
        assert_eq!(strinc(&[]), vec![0xFF]);
        assert_eq!(strinc(&[0x01, 0xFF]), vec![0x02]);
    }
}
