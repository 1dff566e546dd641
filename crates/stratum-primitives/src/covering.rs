use crate::{error::CodecError, tuple, value::Value};

/// Maximum number of fields a single covering index entry may carry,
/// bounded by the width of the presence bitmap (§3).
pub const MAX_COVERED_FIELDS: usize = 64;

///
/// CoveringValue
///
/// `value = tuple(presenceBitmap:u64, present_values...)`. Bit `i` is set
/// iff the field at that position in `stored_field_names` was non-null.
/// An empty byte array means "no covering fields" (§4.4).
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoveringValue {
    bitmap: u64,
    values: Vec<Value>,
}

impl CoveringValue {
    /// Build from the stored fields in descriptor order, one slot per
    /// `stored_field_names` entry, `None` where the field resolved to null.
    pub fn build(fields: &[Option<Value>]) -> Result<Self, CodecError> {
        if fields.len() > MAX_COVERED_FIELDS {
            return Err(CodecError::UnsupportedType {
                type_name: "covering value with more than 64 stored fields",
            });
        }

        let mut bitmap = 0u64;
        let mut values = Vec::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if let Some(value) = field {
                bitmap |= 1 << i;
                values.push(value.clone());
            }
        }
        Ok(Self { bitmap, values })
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bitmap == 0
    }

    /// Look up the value stored at `field_index` in the original
    /// `stored_field_names` order, or `None` if that field was absent.
    #[must_use]
    pub fn get(&self, field_index: usize) -> Option<&Value> {
        if field_index >= MAX_COVERED_FIELDS || self.bitmap & (1 << field_index) == 0 {
            return None;
        }
        let mask = (1u64 << field_index) - 1;
        let position = (self.bitmap & mask).count_ones() as usize;
        self.values.get(position)
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut payload = Vec::with_capacity(self.values.len() + 1);
        payload.push(Value::Int(self.bitmap as i64));
        payload.extend(self.values.iter().cloned());
        tuple::pack(&payload)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.is_empty() {
            return Ok(Self {
                bitmap: 0,
                values: Vec::new(),
            });
        }

        let mut decoded = tuple::unpack(bytes)?;
        if decoded.is_empty() {
            return Err(CodecError::corrupted_covering("missing presence bitmap"));
        }
        let bitmap = match decoded.remove(0) {
            Value::Int(raw) => raw as u64,
            other => {
                return Err(CodecError::corrupted_covering(format!(
                    "presence bitmap must be an int64, got {}",
                    other.type_name()
                )));
            }
        };

        let expected = bitmap.count_ones() as usize;
        if expected != decoded.len() {
            return Err(CodecError::corrupted_covering(format!(
                "bitmap declares {expected} present fields but {} values were encoded",
                decoded.len()
            )));
        }

        Ok(Self {
            bitmap,
            values: decoded,
        })
    }
}
