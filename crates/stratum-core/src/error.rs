use std::fmt;
use stratum_primitives::CodecError;
use thiserror::Error as ThisError;

use crate::{
    cursor::CursorError, index::MaintenanceError, kv::KvError, online::GraphAlgorithmError,
    planner::PlannerError,
};

///
/// InternalError
///
/// Structured runtime error with a stable internal classification: a
/// coarse `ErrorClass` (what went wrong), an `ErrorOrigin` (which
/// subsystem noticed), and the subsystem-specific leaf error that caused
/// it. Every fallible boundary in this crate returns a `Result<_,
/// InternalError>` (or a narrower leaf type that converts into one); there
/// is exactly one error surface.
///

#[derive(Debug, ThisError)]
#[error("{origin}:{class}: {message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl InternalError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Whether the retry wrapper (§5) should replay the transaction.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.class, ErrorClass::Transient)
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification, per §7.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// Retryable KV transient failure (conflict, commit-unknown, timeout).
    Transient,
    /// Non-retryable KV failure (corruption, permission).
    Fatal,
    Corruption,
    NotFound,
    Conflict,
    Unsupported,
    InvariantViolation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Transient => "transient",
            Self::Fatal => "fatal",
            Self::Corruption => "corruption",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Unsupported => "unsupported",
            Self::InvariantViolation => "invariant_violation",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification, per §7.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Kv,
    Codec,
    Index,
    Online,
    Cursor,
    Planner,
    Graph,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Kv => "kv",
            Self::Codec => "codec",
            Self::Index => "index",
            Self::Online => "online",
            Self::Cursor => "cursor",
            Self::Planner => "planner",
            Self::Graph => "graph",
        };
        write!(f, "{label}")
    }
}

impl From<CodecError> for InternalError {
    fn from(err: CodecError) -> Self {
        let class = match err {
            CodecError::KeyTooLarge { .. } => ErrorClass::InvariantViolation,
            CodecError::UnsupportedType { .. } => ErrorClass::Unsupported,
            CodecError::CorruptedTuple { .. } | CodecError::CorruptedCoveringValue { .. } => {
                ErrorClass::Corruption
            }
        };
        Self::new(class, ErrorOrigin::Codec, err.to_string()).with_source(err)
    }
}

impl From<KvError> for InternalError {
    fn from(err: KvError) -> Self {
        let class = if err.is_retryable() {
            ErrorClass::Transient
        } else {
            ErrorClass::Fatal
        };
        Self::new(class, ErrorOrigin::Kv, err.to_string()).with_source(err)
    }
}

impl From<MaintenanceError> for InternalError {
    fn from(err: MaintenanceError) -> Self {
        let class = match err {
            MaintenanceError::UniquenessViolation { .. } => ErrorClass::Conflict,
            MaintenanceError::DimensionMismatch { .. } => ErrorClass::InvariantViolation,
            MaintenanceError::InvalidStructure { .. } => ErrorClass::InvariantViolation,
        };
        Self::new(class, ErrorOrigin::Index, err.to_string()).with_source(err)
    }
}

impl From<CursorError> for InternalError {
    fn from(err: CursorError) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Cursor, err.to_string())
            .with_source(err)
    }
}

impl From<PlannerError> for InternalError {
    fn from(err: PlannerError) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Planner, err.to_string())
            .with_source(err)
    }
}

impl From<GraphAlgorithmError> for InternalError {
    fn from(err: GraphAlgorithmError) -> Self {
        Self::new(ErrorClass::NotFound, ErrorOrigin::Graph, err.to_string()).with_source(err)
    }
}
