//! Module: stats
//! Responsibility: the two mergeable statistics sketches the planner's cost
//! model draws selectivity estimates from (§2, §4.7): `Hll` for distinct-
//! value cardinality, `TDigest` for value-distribution quantiles.
//! Does not own: when/how these sketches get sampled from live data —
//! maintainers feed them, the planner reads them.

mod hll;
mod tdigest;

pub use hll::Hll;
pub use tdigest::TDigest;
