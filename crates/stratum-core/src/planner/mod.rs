//! Module: planner
//! Responsibility: the Cascades-style top-down query planner (§4.7):
//! rewrites a predicate/sort/limit logical tree into a physical plan
//! (index seek, range scan, union/intersection, top-k, vector search)
//! plus an estimated cost, informed by out-of-band statistics.
//! Does not own: executing the chosen plan — that's the cursor/executor
//! boundary (§1), out of this crate's scope.

pub mod cost;
pub mod rules;

use std::collections::{HashMap, HashSet};

use thiserror::Error as ThisError;

use crate::model::IndexDescriptor;
use crate::predicate::Predicate;
use crate::record::FieldId;

pub use cost::{CostWeights, Statistics};

///
/// PlannerError
/// Leaf error for the `planner` subsystem, per §7.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum PlannerError {
    #[error("no viable physical plan satisfies the required properties")]
    NoViablePlan,
    #[error("expression is not supported by this planner: {detail}")]
    UnsupportedExpression { detail: String },
}

///
/// SortKey
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SortKey {
    pub field: FieldId,
    pub ascending: bool,
    pub nulls_first: bool,
}

///
/// LogicalOperator
/// The query shape the planner accepts, built by the caller from a
/// predicate tree plus optional sort/limit/similarity request (§6).
///

#[derive(Clone, Debug)]
pub enum LogicalOperator {
    Scan,
    Filter { predicate: Predicate, input: Box<LogicalOperator> },
    Sort { keys: Vec<SortKey>, input: Box<LogicalOperator> },
    TopK { k: usize, input: Box<LogicalOperator> },
    Similar { field: FieldId, query: Vec<f32>, k: usize },
}

///
/// PhysicalPlan
///

#[derive(Clone, Debug, PartialEq)]
pub enum PhysicalPlan {
    FullScan,
    IndexSeek { index: String, prefix_len: usize },
    OrderedIndexScan { index: String },
    Intersection(Vec<PhysicalPlan>),
    Union { children: Vec<PhysicalPlan>, dedup: bool },
    RankIndexTopK { index: String, k: usize },
    VectorIndexSearch { index: String, k: usize, approximate: bool },
    PostFilter { predicate: Predicate, input: Box<PhysicalPlan> },
}

///
/// RequiredProperties
/// What the caller needs delivered: an optional sort order and/or a row
/// limit. `optimize_group` only accepts winners whose plan satisfies
/// both (§4.7).
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct RequiredProperties {
    pub sorted_by: Option<Vec<FieldId>>,
    pub limit: Option<usize>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum GroupState {
    Unexplored,
    Explored,
    Implemented,
}

struct Group {
    logical: LogicalOperator,
    state: GroupState,
    winners: HashMap<RequiredProperties, (PhysicalPlan, f64)>,
}

///
/// Memo
/// A single-group memo: real Cascades memoizes every subexpression
/// across nested groups, but this query shape (§6's
/// predicate/sort/limit triple) has no independently-optimizable
/// children, so one group suffices while still exercising the
/// `Unexplored -> Explored -> Implemented -> Optimized(req)` state
/// machine (§4.7) and the cycle-guarding busy-set.
///

pub struct Memo {
    group: Group,
    busy: HashSet<RequiredProperties>,
}

impl Memo {
    #[must_use]
    pub fn new(root: LogicalOperator) -> Self {
        Self {
            group: Group { logical: root, state: GroupState::Unexplored, winners: HashMap::new() },
            busy: HashSet::new(),
        }
    }

    /// `optimize_group(g, required_props)`: explore + implement once,
    /// then pick the lowest-cost physical plan matching `required`,
    /// memoizing the winner (§4.7).
    pub fn optimize_group(
        &mut self,
        required: &RequiredProperties,
        catalog: &[IndexDescriptor],
        stats: &Statistics,
        weights: &CostWeights,
    ) -> Result<(PhysicalPlan, f64), PlannerError> {
        if let Some(winner) = self.group.winners.get(required) {
            return Ok(winner.clone());
        }
        if !self.busy.insert(required.clone()) {
            return Err(PlannerError::NoViablePlan);
        }

        if self.group.state == GroupState::Unexplored {
            self.group.state = GroupState::Explored;
        }

        let candidates = rules::apply_rules(&self.group.logical, catalog, stats, weights)?;
        self.group.state = GroupState::Implemented;

        let mut viable: Vec<(PhysicalPlan, f64)> = candidates
            .into_iter()
            .filter(|(plan, _)| satisfies(plan, required))
            .collect();
        viable.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        self.busy.remove(required);

        let winner = viable.into_iter().next().ok_or(PlannerError::NoViablePlan)?;
        self.group.winners.insert(required.clone(), winner.clone());
        Ok(winner)
    }
}

fn satisfies(plan: &PhysicalPlan, required: &RequiredProperties) -> bool {
    if let Some(sort_fields) = &required.sorted_by {
        if !plan_delivers_sort(plan, sort_fields) {
            return false;
        }
    }
    true
}

fn plan_delivers_sort(plan: &PhysicalPlan, sort_fields: &[FieldId]) -> bool {
    match plan {
        PhysicalPlan::OrderedIndexScan { .. } | PhysicalPlan::RankIndexTopK { .. } => true,
        PhysicalPlan::PostFilter { input, .. } => plan_delivers_sort(input, sort_fields),
        _ => sort_fields.is_empty(),
    }
}

/// Convenience entry point: build a fresh `Memo` for `root`, optimize
/// once for `required`, and return the winner without exposing the memo
/// (useful when a caller doesn't need repeated `optimize_group` calls
/// for different required-properties keys).
pub fn optimize(
    root: LogicalOperator,
    required: &RequiredProperties,
    catalog: &[IndexDescriptor],
    stats: &Statistics,
    weights: &CostWeights,
) -> Result<(PhysicalPlan, f64), PlannerError> {
    Memo::new(root).optimize_group(required, catalog, stats, weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Capability, IndexKind};
    use crate::record::FieldTable;

    fn catalog() -> Vec<IndexDescriptor> {
        let table = FieldTable::new(&["status", "created_at"]);
        vec![IndexDescriptor::new(
            "by_status",
            IndexKind::Scalar,
            Capability::default(),
            &table,
            &["status"],
            false,
            false,
            &[],
        )
        .unwrap()]
    }

    #[test]
    fn filter_on_indexed_field_prefers_index_seek_over_full_scan() {
        let predicate = Predicate::eq(0, "active");
        let root = LogicalOperator::Filter { predicate, input: Box::new(LogicalOperator::Scan) };
        let (plan, _) = optimize(
            root,
            &RequiredProperties::default(),
            &catalog(),
            &Statistics::new(10_000.0),
            &CostWeights::default(),
        )
        .unwrap();
        assert!(matches!(plan, PhysicalPlan::IndexSeek { .. } | PhysicalPlan::PostFilter { .. }));
    }

    #[test]
    fn repeated_optimize_group_calls_memoize_the_winner() {
        let predicate = Predicate::eq(0, "active");
        let root = LogicalOperator::Filter { predicate, input: Box::new(LogicalOperator::Scan) };
        let mut memo = Memo::new(root);
        let required = RequiredProperties::default();
        let first = memo.optimize_group(&required, &catalog(), &Statistics::new(10_000.0), &CostWeights::default()).unwrap();
        let second = memo.optimize_group(&required, &catalog(), &Statistics::new(10_000.0), &CostWeights::default()).unwrap();
        assert_eq!(first, second);
    }
}
