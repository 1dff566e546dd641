//! Module: planner::rules
//! Responsibility: the six minimum transformation rules of §4.7, each
//! taking the logical tree plus the index catalog and statistics and
//! producing zero or more costed physical-plan candidates. `apply_rules`
//! is the single entry point `Memo::optimize_group` calls; every rule
//! that matches the shape contributes its candidates independently so
//! the caller can pick the cheapest one satisfying the required
//! properties.

use crate::model::IndexDescriptor;
use crate::predicate::Predicate;

use super::cost::{CostWeights, Statistics};
use super::{LogicalOperator, PhysicalPlan, PlannerError};

/// Dispatches on the shape of `root` and returns every candidate
/// physical plan the matching rules produce, each paired with its
/// estimated cost.
pub fn apply_rules(
    root: &LogicalOperator,
    catalog: &[IndexDescriptor],
    stats: &Statistics,
    weights: &CostWeights,
) -> Result<Vec<(PhysicalPlan, f64)>, PlannerError> {
    match root {
        LogicalOperator::Scan => Ok(vec![full_scan(stats, weights)]),

        LogicalOperator::Filter { predicate, input } => {
            let mut candidates = filter_rules(predicate, input, catalog, stats, weights)?;
            if candidates.is_empty() {
                candidates.push(post_filter_over_full_scan(predicate, stats, weights));
            }
            Ok(candidates)
        }

        LogicalOperator::Sort { keys, input } => sort_rules(keys, input, catalog, stats, weights),

        LogicalOperator::TopK { k, input } => top_k_rules(*k, input, catalog, stats, weights),

        LogicalOperator::Similar { field, query, k } => {
            similar_rules(*field, query, *k, catalog, stats, weights)
        }
    }
}

fn full_scan(stats: &Statistics, weights: &CostWeights) -> (PhysicalPlan, f64) {
    let n = stats.estimated_row_count();
    (PhysicalPlan::FullScan, weights.fetch_cost(n))
}

fn post_filter_over_full_scan(
    predicate: &Predicate,
    stats: &Statistics,
    weights: &CostWeights,
) -> (PhysicalPlan, f64) {
    let (scan, scan_cost) = full_scan(stats, weights);
    let n = stats.estimated_row_count();
    let selectivity = overall_selectivity(predicate, stats);
    let cost = scan_cost + weights.filter_cost(n, selectivity);
    (PhysicalPlan::PostFilter { predicate: predicate.clone(), input: Box::new(scan) }, cost)
}

fn overall_selectivity(predicate: &Predicate, stats: &Statistics) -> f64 {
    match predicate {
        Predicate::Comparison { field, op, .. } => match op {
            crate::predicate::ComparisonOp::Eq => stats.eq_selectivity(*field),
            _ => stats.range_selectivity(*field),
        },
        Predicate::And(children) => {
            children.iter().map(|c| overall_selectivity(c, stats)).fold(1.0, |a, b| a * b)
        }
        Predicate::Or(children) => {
            let miss = children.iter().map(|c| 1.0 - overall_selectivity(c, stats)).product::<f64>();
            1.0 - miss
        }
        Predicate::Not(inner) => 1.0 - overall_selectivity(inner, stats),
        Predicate::IsNull(_) | Predicate::IsNotNull(_) => 0.5,
        Predicate::True => 1.0,
        Predicate::False => 0.0,
    }
}

/// Rule 1 (`Filter(Scan) -> IndexSeek`) and rule 2
/// (`Filter(AND) -> Intersection(IndexSeek...)`), plus rule 3
/// (`OR -> Union(IndexSeek...) + Dedup`).
fn filter_rules(
    predicate: &Predicate,
    input: &LogicalOperator,
    catalog: &[IndexDescriptor],
    stats: &Statistics,
    weights: &CostWeights,
) -> Result<Vec<(PhysicalPlan, f64)>, PlannerError> {
    if !matches!(input, LogicalOperator::Scan) {
        return Ok(Vec::new());
    }

    let mut candidates = Vec::new();

    if let Predicate::Or(branches) = predicate {
        if let Some(candidate) = union_rule(branches, catalog, stats, weights) {
            candidates.push(candidate);
        }
        return Ok(candidates);
    }

    for index in catalog {
        let prefix = predicate.equality_prefix(index.field_ids());
        if prefix.is_empty() {
            continue;
        }
        if is_dominated(index, &prefix, catalog, predicate) {
            continue;
        }
        let selectivity = prefix
            .iter()
            .map(|(field, _)| stats.eq_selectivity(*field))
            .fold(1.0, |a, b| a * b);
        let n = stats.estimated_row_count();
        let entries = n * selectivity;
        let seek = PhysicalPlan::IndexSeek { index: index.name.clone(), prefix_len: prefix.len() };
        let seek_cost = weights.index_cost(entries, true) + weights.fetch_cost(entries);

        let remaining_predicates = remaining_after_prefix(predicate, &prefix);
        let (plan, cost) = match remaining_predicates {
            Some(residual) => {
                let residual_selectivity = overall_selectivity(&residual, stats);
                (
                    PhysicalPlan::PostFilter { predicate: residual, input: Box::new(seek) },
                    seek_cost + weights.filter_cost(entries, residual_selectivity),
                )
            }
            None => (seek, seek_cost),
        };
        candidates.push((plan, cost));
    }

    if let Predicate::And(conjuncts) = predicate {
        if let Some(candidate) = intersection_rule(conjuncts, catalog, stats, weights) {
            candidates.push(candidate);
        }
    }

    Ok(candidates)
}

/// Whether `index` is a strict field-prefix of some other catalog index
/// that also matches a strictly longer equality prefix of `predicate` —
/// the narrower seek is then strictly dominated and not worth costing.
fn is_dominated(
    index: &IndexDescriptor,
    prefix: &[(crate::record::FieldId, stratum_primitives::Value)],
    catalog: &[IndexDescriptor],
    predicate: &Predicate,
) -> bool {
    catalog.iter().any(|other| {
        index.is_prefix_of(other) && predicate.equality_prefix(other.field_ids()).len() > prefix.len()
    })
}

/// Whatever of `predicate` isn't covered by the matched equality
/// `prefix`, as a residual predicate to post-filter, or `None` when the
/// prefix covers the whole predicate.
fn remaining_after_prefix(
    predicate: &Predicate,
    prefix: &[(crate::record::FieldId, stratum_primitives::Value)],
) -> Option<Predicate> {
    let covered: std::collections::HashSet<_> = prefix.iter().map(|(f, _)| *f).collect();
    let conjuncts = match predicate {
        Predicate::And(children) => children.clone(),
        other => vec![other.clone()],
    };
    let residual: Vec<Predicate> = conjuncts
        .into_iter()
        .filter(|c| !matches!(c, Predicate::Comparison { field, op: crate::predicate::ComparisonOp::Eq, .. } if covered.contains(field)))
        .collect();
    match residual.len() {
        0 => None,
        1 => Some(residual.into_iter().next().unwrap()),
        _ => Some(Predicate::And(residual)),
    }
}

/// Rule 2: each conjunct that has its own viable single-field index seek
/// becomes an `Intersection` child; conjuncts with no matching index
/// fall back to a post-filter over the intersection result.
fn intersection_rule(
    conjuncts: &[Predicate],
    catalog: &[IndexDescriptor],
    stats: &Statistics,
    weights: &CostWeights,
) -> Option<(PhysicalPlan, f64)> {
    let mut children = Vec::new();
    let mut child_costs = Vec::new();
    let mut leftover = Vec::new();

    for conjunct in conjuncts {
        let prefix = catalog
            .iter()
            .find_map(|index| {
                let p = conjunct.equality_prefix(index.field_ids());
                (!p.is_empty()).then(|| (index, p))
            });
        match prefix {
            Some((index, p)) => {
                let selectivity = stats.eq_selectivity(p[0].0);
                let entries = stats.estimated_row_count() * selectivity;
                children.push(PhysicalPlan::IndexSeek { index: index.name.clone(), prefix_len: p.len() });
                child_costs.push(weights.index_cost(entries, true));
            }
            None => leftover.push(conjunct.clone()),
        }
    }

    if children.len() < 2 {
        return None;
    }

    let result_cardinality = stats.estimated_row_count() * conjuncts.iter().map(|c| overall_selectivity(c, stats)).fold(1.0, |a, b| a * b);
    let intersect_cost = weights.intersect_cost(&child_costs, result_cardinality);
    let intersection = PhysicalPlan::Intersection(children);

    if leftover.is_empty() {
        Some((intersection, intersect_cost))
    } else {
        let residual = if leftover.len() == 1 { leftover.into_iter().next().unwrap() } else { Predicate::And(leftover) };
        let residual_selectivity = overall_selectivity(&residual, stats);
        let cost = intersect_cost + weights.filter_cost(result_cardinality, residual_selectivity);
        Some((PhysicalPlan::PostFilter { predicate: residual, input: Box::new(intersection) }, cost))
    }
}

/// Rule 3: every OR branch gets its own index seek (or a full scan when
/// a branch has no viable index), unioned and deduplicated.
fn union_rule(
    branches: &[Predicate],
    catalog: &[IndexDescriptor],
    stats: &Statistics,
    weights: &CostWeights,
) -> Option<(PhysicalPlan, f64)> {
    let mut children = Vec::new();
    let mut total_cost = 0.0;
    let mut total_entries = 0.0;

    for branch in branches {
        let best = catalog
            .iter()
            .filter_map(|index| {
                let prefix = branch.equality_prefix(index.field_ids());
                (!prefix.is_empty()).then(|| {
                    let selectivity = prefix.iter().map(|(f, _)| stats.eq_selectivity(*f)).fold(1.0, |a, b| a * b);
                    let entries = stats.estimated_row_count() * selectivity;
                    (
                        PhysicalPlan::IndexSeek { index: index.name.clone(), prefix_len: prefix.len() },
                        weights.index_cost(entries, true),
                        entries,
                    )
                })
            })
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        match best {
            Some((plan, cost, entries)) => {
                children.push(plan);
                total_cost += cost;
                total_entries += entries;
            }
            None => return None,
        }
    }

    total_cost += weights.dedup_cost(total_entries);
    Some((PhysicalPlan::Union { children, dedup: true }, total_cost))
}

/// Rule 4 (`Sort(Scan) -> OrderedIndexScan`, generalized to
/// `Sort(Filter(Scan)) -> OrderedIndexScan` when a composite index's
/// field order is the filter's equality prefix followed immediately by
/// the requested sort keys): a full scan with an in-memory sort is the
/// fallback when no index covers the requested order.
fn sort_rules(
    keys: &[super::SortKey],
    input: &LogicalOperator,
    catalog: &[IndexDescriptor],
    stats: &Statistics,
    weights: &CostWeights,
) -> Result<Vec<(PhysicalPlan, f64)>, PlannerError> {
    let requested: Vec<_> = keys.iter().map(|k| k.field).collect();
    let mut candidates = Vec::new();

    match input {
        LogicalOperator::Scan => {
            for index in catalog {
                if index.field_ids() == requested.as_slice() {
                    let n = stats.estimated_row_count();
                    let cost = weights.index_cost(n, true) + weights.fetch_cost(n);
                    candidates.push((PhysicalPlan::OrderedIndexScan { index: index.name.clone() }, cost));
                }
            }
        }
        LogicalOperator::Filter { predicate, input: inner } if matches!(**inner, LogicalOperator::Scan) => {
            candidates.extend(sort_over_filtered_scan(&requested, predicate, catalog, stats, weights));
        }
        _ => {}
    }

    if candidates.is_empty() {
        let n = stats.estimated_row_count();
        let (scan, scan_cost) = full_scan(stats, weights);
        candidates.push((scan, scan_cost + weights.sort_cost(n)));
    }
    Ok(candidates)
}

/// A composite index covers `Sort(Filter(Scan))` when its field order is
/// the filter's equality prefix immediately followed by the requested
/// sort keys — e.g. index `(customer_id, status, created_at)` covers a
/// filter on `customer_id`/`status` sorted by `created_at`. Any conjunct
/// not absorbed into the prefix becomes a residual post-filter.
fn sort_over_filtered_scan(
    requested: &[crate::record::FieldId],
    predicate: &Predicate,
    catalog: &[IndexDescriptor],
    stats: &Statistics,
    weights: &CostWeights,
) -> Vec<(PhysicalPlan, f64)> {
    let mut candidates = Vec::new();
    for index in catalog {
        let prefix = predicate.equality_prefix(index.field_ids());
        if prefix.is_empty() {
            continue;
        }
        let suffix = &index.field_ids()[prefix.len()..];
        if suffix != requested {
            continue;
        }

        let selectivity = prefix.iter().map(|(field, _)| stats.eq_selectivity(*field)).fold(1.0, |a, b| a * b);
        let entries = stats.estimated_row_count() * selectivity;
        let scan = PhysicalPlan::OrderedIndexScan { index: index.name.clone() };
        let scan_cost = weights.index_cost(entries, true) + weights.fetch_cost(entries);

        let (plan, cost) = match remaining_after_prefix(predicate, &prefix) {
            Some(residual) => {
                let residual_selectivity = overall_selectivity(&residual, stats);
                (
                    PhysicalPlan::PostFilter { predicate: residual, input: Box::new(scan) },
                    scan_cost + weights.filter_cost(entries, residual_selectivity),
                )
            }
            None => (scan, scan_cost),
        };
        candidates.push((plan, cost));
    }
    candidates
}

/// Rule 5 (`TopK(Sort(...)) -> RankIndexTopK`): recognizes a `TopK` over
/// a `Sort` on a single field and prefers a rank index over that field
/// when one exists.
fn top_k_rules(
    k: usize,
    input: &LogicalOperator,
    catalog: &[IndexDescriptor],
    stats: &Statistics,
    weights: &CostWeights,
) -> Result<Vec<(PhysicalPlan, f64)>, PlannerError> {
    let LogicalOperator::Sort { keys, input: sort_input } = input else {
        return Ok(Vec::new());
    };
    let mut candidates = Vec::new();
    if matches!(**sort_input, LogicalOperator::Scan) && keys.len() == 1 {
        let field = keys[0].field;
        for index in catalog {
            if matches!(index.kind, crate::model::IndexKind::Rank) && index.field_ids() == [field].as_slice() {
                let cost = weights.index_cost(k as f64, true);
                candidates.push((PhysicalPlan::RankIndexTopK { index: index.name.clone(), k }, cost));
            }
        }
    }
    if candidates.is_empty() {
        // Falls through to `sort_rules`, which also composes a composite
        // index's prefix seek with a suffix sort over `Filter(Scan)`.
        let inner = sort_rules(keys, sort_input, catalog, stats, weights)?;
        candidates.extend(inner.into_iter().map(|(plan, cost)| (plan, cost * (k as f64 / stats.estimated_row_count().max(1.0)).max(0.01))));
    }
    Ok(candidates)
}

/// Rule 6 (`Similar(...) -> VectorIndexSearch`).
fn similar_rules(
    field: crate::record::FieldId,
    _query: &[f32],
    k: usize,
    catalog: &[IndexDescriptor],
    _stats: &Statistics,
    weights: &CostWeights,
) -> Result<Vec<(PhysicalPlan, f64)>, PlannerError> {
    let mut candidates = Vec::new();
    for index in catalog {
        if matches!(index.kind, crate::model::IndexKind::Vector(_)) && index.field_ids() == [field].as_slice() {
            let approximate = matches!(index.kind, crate::model::IndexKind::Vector(crate::model::VectorKind::Ivf(_)));
            let cost = weights.index_cost(k as f64 * if approximate { 4.0 } else { 50.0 }, true);
            candidates.push((PhysicalPlan::VectorIndexSearch { index: index.name.clone(), k, approximate }, cost));
        }
    }
    if candidates.is_empty() {
        return Err(PlannerError::UnsupportedExpression {
            detail: "no vector index covers the requested field".to_string(),
        });
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Capability, IndexKind, VectorKind};
    use crate::record::FieldTable;

    fn table() -> FieldTable {
        FieldTable::new(&["status", "score", "embedding"])
    }

    #[test]
    fn top_k_over_sort_over_filter_composes_a_composite_index_seek() {
        let t = FieldTable::new(&["customer_id", "status", "created_at"]);
        let composite = IndexDescriptor::new(
            "by_customer_status_created",
            IndexKind::Scalar,
            Capability::default(),
            &t,
            &["customer_id", "status", "created_at"],
            false,
            false,
            &[],
        )
        .unwrap();
        let catalog = vec![composite];
        let predicate = Predicate::And(vec![Predicate::eq(0, 7i64), Predicate::eq(1, "open")]);
        let filter = LogicalOperator::Filter { predicate, input: Box::new(LogicalOperator::Scan) };
        let sort = LogicalOperator::Sort {
            keys: vec![super::super::SortKey { field: 2, ascending: true, nulls_first: false }],
            input: Box::new(filter),
        };
        let candidates = top_k_rules(10, &sort, &catalog, &Statistics::new(1000.0), &CostWeights::default()).unwrap();
        assert!(
            candidates.iter().any(|(plan, _)| matches!(plan, PhysicalPlan::OrderedIndexScan { .. })),
            "expected an ordered-index-scan candidate, got {candidates:?}"
        );
    }

    #[test]
    fn a_narrower_index_is_pruned_when_a_wider_composite_index_matches_a_longer_prefix() {
        let t = FieldTable::new(&["customer_id", "status", "created_at"]);
        let narrow = IndexDescriptor::new("by_customer", IndexKind::Scalar, Capability::default(), &t, &["customer_id"], false, false, &[]).unwrap();
        let wide = IndexDescriptor::new(
            "by_customer_status",
            IndexKind::Scalar,
            Capability::default(),
            &t,
            &["customer_id", "status"],
            false,
            false,
            &[],
        )
        .unwrap();
        let catalog = vec![narrow, wide];
        let predicate = Predicate::And(vec![Predicate::eq(0, 7i64), Predicate::eq(1, "open")]);
        let candidates = filter_rules(&predicate, &LogicalOperator::Scan, &catalog, &Statistics::new(1000.0), &CostWeights::default()).unwrap();
        let seeks: Vec<_> = candidates
            .iter()
            .filter_map(|(plan, _)| match plan {
                PhysicalPlan::IndexSeek { index, .. } => Some(index.as_str()),
                _ => None,
            })
            .collect();
        assert!(!seeks.contains(&"by_customer"), "narrower index should be pruned, got {seeks:?}");
    }

    #[test]
    fn and_of_two_indexed_equalities_produces_an_intersection_candidate() {
        let t = table();
        let by_status = IndexDescriptor::new("by_status", IndexKind::Scalar, Capability::default(), &t, &["status"], false, false, &[]).unwrap();
        let by_score = IndexDescriptor::new("by_score", IndexKind::Scalar, Capability::default(), &t, &["score"], false, false, &[]).unwrap();
        let catalog = vec![by_status, by_score];
        let predicate = Predicate::And(vec![Predicate::eq(0, "active"), Predicate::eq(1, 5i64)]);
        let candidates = filter_rules(&predicate, &LogicalOperator::Scan, &catalog, &Statistics::new(1000.0), &CostWeights::default()).unwrap();
        assert!(candidates.iter().any(|(plan, _)| matches!(plan, PhysicalPlan::Intersection(_))));
    }

    #[test]
    fn or_without_a_covering_index_on_every_branch_yields_no_union_candidate() {
        let t = table();
        let by_status = IndexDescriptor::new("by_status", IndexKind::Scalar, Capability::default(), &t, &["status"], false, false, &[]).unwrap();
        let catalog = vec![by_status];
        let predicate = Predicate::Or(vec![Predicate::eq(0, "active"), Predicate::eq(1, 5i64)]);
        let candidates = filter_rules(&predicate, &LogicalOperator::Scan, &catalog, &Statistics::new(1000.0), &CostWeights::default()).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn similar_with_no_vector_index_on_the_field_is_unsupported() {
        let catalog: Vec<IndexDescriptor> = vec![];
        let result = similar_rules(2, &[1.0, 2.0], 5, &catalog, &Statistics::new(1000.0), &CostWeights::default());
        assert!(matches!(result, Err(PlannerError::UnsupportedExpression { .. })));
    }

    #[test]
    fn similar_prefers_the_configured_vector_index() {
        let t = table();
        let idx = IndexDescriptor::new(
            "by_embedding",
            IndexKind::Vector(VectorKind::Flat),
            Capability::vector(3, crate::model::VectorMetric::Cosine),
            &t,
            &["embedding"],
            false,
            false,
            &[],
        )
        .unwrap();
        let candidates = similar_rules(2, &[1.0, 2.0, 3.0], 5, &[idx], &Statistics::new(1000.0), &CostWeights::default()).unwrap();
        assert!(matches!(candidates[0].0, PhysicalPlan::VectorIndexSearch { approximate: false, .. }));
    }
}
