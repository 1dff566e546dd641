use std::fmt;
use thiserror::Error as ThisError;

///
/// CodecError
///
/// Failures from tuple packing/unpacking, subspace boundary checks, and the
/// covering-value codec. These are pure, deterministic failures: the same
/// input always produces the same error.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum CodecError {
    #[error("corrupted tuple encoding: {message}")]
    CorruptedTuple { message: String },

    #[error("key of {len} bytes exceeds the {limit}-byte subspace key limit")]
    KeyTooLarge { len: usize, limit: usize },

    #[error("unsupported value type for tuple encoding: {type_name}")]
    UnsupportedType { type_name: &'static str },

    #[error("corrupted covering value: {message}")]
    CorruptedCoveringValue { message: String },
}

impl CodecError {
    pub(crate) fn corrupted_tuple(message: impl Into<String>) -> Self {
        Self::CorruptedTuple {
            message: message.into(),
        }
    }

    pub(crate) fn corrupted_covering(message: impl Into<String>) -> Self {
        Self::CorruptedCoveringValue {
            message: message.into(),
        }
    }
}

///
/// ValueTypeName
///
/// Stable type-name strings used in `UnsupportedType` errors and diagnostics.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ValueTypeName(pub &'static str);

impl fmt::Display for ValueTypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
