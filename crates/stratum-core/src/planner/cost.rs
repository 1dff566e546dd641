//! Module: planner::cost
//! Responsibility: the weighted cost functions of §4.7 and the
//! statistics-driven selectivity estimates that feed them.

use crate::record::FieldId;
use crate::stats::{Hll, TDigest};

///
/// CostWeights
/// Per-operator weights; defaults are illustrative constants in the
/// absence of a calibrated cost model (§4.7).
///

#[derive(Clone, Copy, Debug)]
pub struct CostWeights {
    pub index_read: f64,
    pub record_fetch: f64,
    pub post_filter: f64,
    pub sort: f64,
    pub range_initiation: f64,
    pub dedup: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            index_read: 1.0,
            record_fetch: 4.0,
            post_filter: 0.5,
            sort: 2.0,
            range_initiation: 50.0,
            dedup: 1.5,
        }
    }
}

impl CostWeights {
    #[must_use]
    pub fn index_cost(&self, entries: f64, initiation: bool) -> f64 {
        entries * self.index_read + if initiation { self.range_initiation } else { 0.0 }
    }

    #[must_use]
    pub fn fetch_cost(&self, n: f64) -> f64 {
        n * self.record_fetch
    }

    #[must_use]
    pub fn filter_cost(&self, n: f64, selectivity: f64) -> f64 {
        n * (1.0 - selectivity) * self.post_filter
    }

    #[must_use]
    pub fn sort_cost(&self, n: f64) -> f64 {
        n * n.max(2.0).log2() * self.sort
    }

    #[must_use]
    pub fn dedup_cost(&self, n: f64) -> f64 {
        n * self.dedup
    }

    /// Sum of each child's own cost plus the cost of fetching the
    /// expected intersection result, computed from `child_cardinalities`
    /// and the overall `result_cardinality` estimate (§4.7).
    #[must_use]
    pub fn intersect_cost(&self, child_costs: &[f64], result_cardinality: f64) -> f64 {
        child_costs.iter().sum::<f64>() + self.fetch_cost(result_cardinality)
    }
}

/// Default selectivity applied when no statistics are available for a
/// field, keyed loosely by predicate class (§4.7).
pub const DEFAULT_EQ_SELECTIVITY: f64 = 0.1;
pub const DEFAULT_RANGE_SELECTIVITY: f64 = 0.3;

///
/// Statistics
/// Per-field HLL/t-digest sketches the cost model draws selectivity
/// estimates from (§2, §4.7). Absent entries fall back to the defaults
/// above.
///

#[derive(Default)]
pub struct Statistics {
    cardinalities: std::collections::HashMap<FieldId, Hll>,
    distributions: std::collections::HashMap<FieldId, TDigest>,
    row_count: f64,
}

impl Statistics {
    #[must_use]
    pub fn new(row_count: f64) -> Self {
        Self { row_count, ..Self::default() }
    }

    pub fn record_cardinality(&mut self, field: FieldId, hll: Hll) {
        self.cardinalities.insert(field, hll);
    }

    pub fn record_distribution(&mut self, field: FieldId, digest: TDigest) {
        self.distributions.insert(field, digest);
    }

    #[must_use]
    pub fn cardinality(&self, field: FieldId) -> Option<f64> {
        self.cardinalities.get(&field).map(Hll::estimate)
    }

    #[must_use]
    pub fn quantile(&self, field: FieldId, q: f64) -> Option<f64> {
        self.distributions.get(&field).map(|d| d.quantile(q))
    }

    /// Estimated fraction of rows matching an equality predicate on
    /// `field`: `1 / cardinality(field)` when known, else the default.
    #[must_use]
    pub fn eq_selectivity(&self, field: FieldId) -> f64 {
        self.cardinality(field).filter(|c| *c > 0.0).map_or(DEFAULT_EQ_SELECTIVITY, |c| 1.0 / c)
    }

    #[must_use]
    pub fn range_selectivity(&self, _field: FieldId) -> f64 {
        DEFAULT_RANGE_SELECTIVITY
    }

    #[must_use]
    pub fn estimated_row_count(&self) -> f64 {
        self.row_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_cost_adds_children_and_result_fetch() {
        let weights = CostWeights::default();
        let cost = weights.intersect_cost(&[10.0, 20.0], 5.0);
        assert_eq!(cost, 30.0 + weights.fetch_cost(5.0));
    }

    #[test]
    fn eq_selectivity_falls_back_to_default_without_statistics() {
        let stats = Statistics::new(1000.0);
        assert_eq!(stats.eq_selectivity(0), DEFAULT_EQ_SELECTIVITY);
    }

    #[test]
    fn eq_selectivity_uses_cardinality_when_present() {
        let mut stats = Statistics::new(1000.0);
        let mut hll = Hll::new(crate::config::HllConfig::default());
        for i in 0..100 {
            hll.add(format!("v{i}").as_bytes());
        }
        stats.record_cardinality(0, hll);
        let selectivity = stats.eq_selectivity(0);
        assert!((selectivity - 0.01).abs() < 0.005);
    }
}
