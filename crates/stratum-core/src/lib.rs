//! stratum-core
//!
//! Index family, online indexer, Cascades query planner, and cursor
//! protocol for an FDB-backed persistence engine. This crate owns
//! everything above the raw key-value contract (`kv`) and below query
//! execution: maintaining indexes transactionally as records change,
//! bringing an index online without blocking writers, estimating
//! selectivity from streaming sketches, planning a predicate/sort/limit
//! query into a physical plan, and paging through results with a
//! resumable cursor token.
//!
//! Does not own: the concrete KV client (only its contract, `kv::Transaction`),
//! schema/derive-macro generation for `record::Record` implementations, or
//! executing a `planner::PhysicalPlan` against live storage — the cursor's
//! `PlanExecutor` trait is the seam where an embedding application plugs
//! that in.

pub mod config;
pub mod cursor;
pub mod error;
pub mod index;
pub mod kv;
pub mod model;
pub mod obs;
pub mod online;
pub mod planner;
pub mod predicate;
pub mod record;
pub mod stats;

pub use error::{ErrorClass, ErrorOrigin, InternalError};
