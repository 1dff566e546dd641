//! Module: cursor
//! Responsibility: the continuation-token protocol (§4.6): a versioned,
//! opaque, tuple-encoded state wrapping a plan, validated against the
//! plan's fingerprint on decode, giving stateless pagination across
//! transactions under the KV store's per-transaction budgets.
//! Does not own: executing the plan itself — `Cursor::next` is generic
//! over a `PlanExecutor` that actually runs a batch.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use stratum_primitives::Value;
use thiserror::Error as ThisError;

pub const CURRENT_VERSION: i64 = 1;

///
/// CursorError
/// Leaf error for the `cursor` subsystem, per §7.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum CursorError {
    #[error("invalid continuation token format: {message}")]
    InvalidTokenFormat { message: String },
    #[error("continuation token version {found} does not match current version {expected}")]
    VersionMismatch { expected: i64, found: i64 },
    #[error("continuation token is corrupted: {message}")]
    CorruptedToken { message: String },
    #[error("continuation token's plan fingerprint does not match the current plan")]
    PlanMismatch,
    #[error("continuation token's scan type does not match the current plan")]
    ScanTypeMismatch,
}

///
/// NoNextReason
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NoNextReason {
    SourceExhausted,
    ReturnLimitReached,
    TimeLimitReached,
    TransactionLimitReached,
    ScanLimitReached,
}

///
/// ScanType
/// Which resumption strategy `last_key`/`offset` belong to; key-based is
/// the primary path once a plan supports it, offset-based is the
/// fallback (§4.6, §9 resolved open question).
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScanType {
    KeyBased,
    OffsetBased,
}

///
/// ContinuationState
/// Tuple-encoded fields, in order, per §3/§6: `version, scan_type,
/// last_key, reverse, remaining_limit, original_limit, plan_fingerprint
/// [, operator_state]`.
///

#[derive(Clone, Debug, PartialEq)]
pub struct ContinuationState {
    pub version: i64,
    pub scan_type: ScanType,
    pub last_key: Vec<u8>,
    pub offset: i64,
    pub reverse: bool,
    pub remaining_limit: Option<i64>,
    pub original_limit: Option<i64>,
    pub plan_fingerprint: Vec<u8>,
    pub operator_state: Option<Vec<u8>>,
}

impl ContinuationState {
    fn to_values(&self) -> Vec<Value> {
        let scan_type_tag = match self.scan_type {
            ScanType::KeyBased => 0i64,
            ScanType::OffsetBased => 1i64,
        };
        let mut values = vec![
            Value::Int(self.version),
            Value::Int(scan_type_tag),
            Value::Bytes(self.last_key.clone()),
            Value::Int(self.offset),
            Value::Bool(self.reverse),
            Value::Int(self.remaining_limit.unwrap_or(-1)),
            Value::Int(self.original_limit.unwrap_or(-1)),
            Value::Bytes(self.plan_fingerprint.clone()),
        ];
        if let Some(state) = &self.operator_state {
            values.push(Value::Bytes(state.clone()));
        }
        values
    }

    fn from_values(values: Vec<Value>) -> Result<Self, CursorError> {
        if values.len() < 7 {
            return Err(CursorError::CorruptedToken {
                message: format!("expected at least 7 fields, got {}", values.len()),
            });
        }
        let mut it = values.into_iter();
        let version = expect_int(it.next())?;
        let scan_type = match expect_int(it.next())? {
            0 => ScanType::KeyBased,
            1 => ScanType::OffsetBased,
            other => {
                return Err(CursorError::CorruptedToken {
                    message: format!("unknown scan_type tag {other}"),
                })
            }
        };
        let last_key = expect_bytes(it.next())?;
        let offset = expect_int(it.next())?;
        let reverse = expect_bool(it.next())?;
        let remaining_limit = expect_int(it.next())?;
        let original_limit = expect_int(it.next())?;
        let plan_fingerprint = expect_bytes(it.next())?;
        let operator_state = it.next().map(|v| match v {
            Value::Bytes(b) => Ok(b),
            other => Err(CursorError::CorruptedToken {
                message: format!("operator_state must be bytes, got {}", other.type_name()),
            }),
        }).transpose()?;

        Ok(Self {
            version,
            scan_type,
            last_key,
            offset,
            reverse,
            remaining_limit: (remaining_limit != -1).then_some(remaining_limit),
            original_limit: (original_limit != -1).then_some(original_limit),
            plan_fingerprint,
            operator_state,
        })
    }

    /// Encode to the wire format: tuple-pack then base64 URL-safe (§6).
    /// Empty bytes is the end-of-results sentinel and is never produced
    /// by this function directly — callers encode `None` instead.
    #[must_use]
    pub fn encode(&self) -> String {
        let packed = stratum_primitives::tuple::pack(&self.to_values());
        URL_SAFE.encode(packed)
    }

    /// Decode and validate against the executing plan's fingerprint and
    /// scan type; `version`/`plan_fingerprint` mismatches are the only
    /// checks performed here, per §4.6.
    pub fn decode(
        token: &str,
        expected_plan_fingerprint: &[u8],
        expected_scan_type: ScanType,
    ) -> Result<Self, CursorError> {
        let bytes = URL_SAFE
            .decode(token)
            .map_err(|e| CursorError::InvalidTokenFormat { message: e.to_string() })?;
        let values = stratum_primitives::tuple::unpack(&bytes)
            .map_err(|e| CursorError::CorruptedToken { message: e.to_string() })?;
        let state = Self::from_values(values)?;

        if state.version != CURRENT_VERSION {
            return Err(CursorError::VersionMismatch { expected: CURRENT_VERSION, found: state.version });
        }
        if state.plan_fingerprint != expected_plan_fingerprint {
            return Err(CursorError::PlanMismatch);
        }
        if state.scan_type != expected_scan_type {
            return Err(CursorError::ScanTypeMismatch);
        }
        Ok(state)
    }
}

fn expect_int(value: Option<Value>) -> Result<i64, CursorError> {
    match value {
        Some(Value::Int(i)) => Ok(i),
        other => Err(CursorError::CorruptedToken {
            message: format!("expected int64, got {:?}", other.map(|v| v.type_name())),
        }),
    }
}

fn expect_bool(value: Option<Value>) -> Result<bool, CursorError> {
    match value {
        Some(Value::Bool(b)) => Ok(b),
        other => Err(CursorError::CorruptedToken {
            message: format!("expected bool, got {:?}", other.map(|v| v.type_name())),
        }),
    }
}

fn expect_bytes(value: Option<Value>) -> Result<Vec<u8>, CursorError> {
    match value {
        Some(Value::Bytes(b)) => Ok(b),
        other => Err(CursorError::CorruptedToken {
            message: format!("expected bytes, got {:?}", other.map(|v| v.type_name())),
        }),
    }
}

///
/// Page
/// Result of one `Cursor::next` call (§4.6 steps 4-5).
///

pub enum Page<T> {
    More { items: Vec<T>, next_token: String },
    Done { items: Vec<T>, reason: NoNextReason },
    Empty { reason: NoNextReason },
}

/// Executes a plan for up to `limit` items starting after `state`,
/// returning raw `(key, item)` pairs in the plan's natural order. Plan
/// execution itself is out of this crate's scope (§1); cursors are
/// written against this trait so the same state machine works for any
/// physical plan.
#[async_trait]
pub trait PlanExecutor<T: Send>: Send + Sync {
    async fn execute(
        &self,
        state: Option<&ContinuationState>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, T)>, CursorError>;

    fn plan_fingerprint(&self) -> Vec<u8>;
    fn scan_type(&self) -> ScanType;
}

///
/// Cursor
/// One-writer-at-a-time: `next` owns `&mut self`, matching the
/// single-lock-held-around-I/O discipline in §5.
///

pub struct Cursor<T> {
    batch_size: usize,
    state: Option<ContinuationState>,
    exhausted: bool,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Send> Cursor<T> {
    #[must_use]
    pub fn new(batch_size: usize, original_limit: Option<i64>) -> Self {
        Self {
            batch_size,
            state: original_limit.map(|limit| ContinuationState {
                version: CURRENT_VERSION,
                scan_type: ScanType::KeyBased,
                last_key: Vec::new(),
                offset: 0,
                reverse: false,
                remaining_limit: Some(limit),
                original_limit: Some(limit),
                plan_fingerprint: Vec::new(),
                operator_state: None,
            }),
            exhausted: false,
            _marker: std::marker::PhantomData,
        }
    }

    /// Resume an existing cursor from a previously issued token. `batch_size`
    /// is the caller's desired page size for subsequent calls — the token
    /// itself carries no page-size field (§4.6), only resumption state.
    pub fn from_token(
        token: &str,
        batch_size: usize,
        executor: &dyn PlanExecutor<T>,
    ) -> Result<Self, CursorError> {
        if token.is_empty() {
            return Ok(Self {
                batch_size,
                state: None,
                exhausted: true,
                _marker: std::marker::PhantomData,
            });
        }
        let state = ContinuationState::decode(token, &executor.plan_fingerprint(), executor.scan_type())?;
        Ok(Self {
            batch_size,
            state: Some(state),
            exhausted: false,
            _marker: std::marker::PhantomData,
        })
    }

    /// Per §4.6 steps 1-5: compute the effective limit, execute with
    /// `limit + 1`, and decide `More`/`Done`/`Empty` from how many rows
    /// came back.
    pub async fn next(&mut self, executor: &dyn PlanExecutor<T>) -> Result<Page<T>, CursorError> {
        if self.exhausted {
            return Ok(Page::Empty { reason: NoNextReason::SourceExhausted });
        }

        let remaining = self.state.as_ref().and_then(|s| s.remaining_limit);
        let effective_limit = match remaining {
            Some(r) if r <= 0 => {
                self.exhausted = true;
                return Ok(Page::Empty { reason: NoNextReason::ReturnLimitReached });
            }
            Some(r) => self.batch_size.min(r as usize),
            None => self.batch_size,
        };
        let effective_limit = effective_limit.max(1);

        let rows = executor.execute(self.state.as_ref(), effective_limit + 1).await?;
        let done = rows.len() <= effective_limit;
        let mut returned_rows: Vec<(Vec<u8>, T)> = rows.into_iter().take(effective_limit).collect();
        let last_returned_key = returned_rows.last().map(|(key, _)| key.clone());
        let items: Vec<T> = returned_rows.drain(..).map(|(_, item)| item).collect();
        let returned = items.len() as i64;

        let next_remaining = remaining.map(|r| (r - returned).max(0));

        if done {
            self.exhausted = true;
            return Ok(Page::Done { items, reason: NoNextReason::SourceExhausted });
        }

        // The last key actually returned this page, per spec.md:139 — not the
        // previous state's key, which would pin every page to the same spot.
        let last_key = last_returned_key
            .unwrap_or_else(|| self.state.as_ref().map_or_else(Vec::new, |s| s.last_key.clone()));
        let next_state = ContinuationState {
            version: CURRENT_VERSION,
            scan_type: executor.scan_type(),
            last_key,
            offset: self.state.as_ref().map_or(0, |s| s.offset) + returned,
            reverse: self.state.as_ref().is_some_and(|s| s.reverse),
            remaining_limit: next_remaining,
            original_limit: self.state.as_ref().and_then(|s| s.original_limit),
            plan_fingerprint: executor.plan_fingerprint(),
            operator_state: None,
        };
        let next_token = next_state.encode();
        self.state = Some(next_state);
        Ok(Page::More { items, next_token })
    }
}
