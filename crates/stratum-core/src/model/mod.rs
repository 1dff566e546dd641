//! Module: model
//! Responsibility: the closed-variant `IndexKind`/`Capability` model (§9
//! "sum types over protocols") and the `IndexDescriptor` built from it.
//! Does not own: maintainer behavior — this module is pure data plus the
//! validation that makes an `IndexDescriptor` constructible only when it
//! satisfies the invariants in §3.

mod descriptor;

pub use descriptor::{IndexDescriptor, IndexDescriptorError};

use crate::config::IvfConfig;

///
/// VectorMetric
/// §6: `{cosine, euclidean, dotProduct}`.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VectorMetric {
    Cosine,
    Euclidean,
    DotProduct,
}

///
/// VectorKind
///

#[derive(Clone, Copy, Debug)]
pub enum VectorKind {
    Flat,
    Ivf(IvfConfig),
}

///
/// GraphKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GraphKind {
    Adjacency,
    Triple,
}

///
/// IndexKind
///
/// Closed variant set replacing a protocol-oriented `dyn` hierarchy (§9).
/// Kind-specific parameters live in the `Capability` carried alongside.
///

#[derive(Clone, Copy, Debug)]
pub enum IndexKind {
    Scalar,
    Rank,
    Vector(VectorKind),
    Graph(GraphKind),
}

impl IndexKind {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Rank => "rank",
            Self::Vector(VectorKind::Flat) => "vector(flat)",
            Self::Vector(VectorKind::Ivf(_)) => "vector(ivf)",
            Self::Graph(GraphKind::Adjacency) => "graph(adjacency)",
            Self::Graph(GraphKind::Triple) => "graph(triple)",
        }
    }
}

///
/// Capability
///
/// Kind-specific parameters that don't belong on every index: vector
/// dimensionality/metric, graph ontology scoping. Rank and scalar indexes
/// carry `None` — their tuning lives in `RankConfig`/nothing respectively.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct Capability {
    pub dims: Option<u32>,
    pub metric: Option<VectorMetric>,
}

impl Capability {
    #[must_use]
    pub const fn vector(dims: u32, metric: VectorMetric) -> Self {
        Self {
            dims: Some(dims),
            metric: Some(metric),
        }
    }
}
