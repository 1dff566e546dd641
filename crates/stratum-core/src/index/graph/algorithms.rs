//! Module: index::graph::algorithms
//! Responsibility: PageRank and label propagation over an
//! `AdjacencyMaintainer` view (§4.3.4), bounded by `max_iterations` and a
//! convergence threshold, committing per-node scores in batches under a
//! scratch subspace.

use std::collections::HashMap;

use stratum_primitives::{Subspace, Value};

use super::super::MaintenanceError;
use super::AdjacencyMaintainer;
use crate::kv::Transaction;

const DAMPING: f64 = 0.85;

/// PageRank over every node reachable from `seed_nodes`, iterating until
/// either `max_iterations` is hit or the total score delta drops below
/// `convergence_threshold`. Scores are persisted under `scratch` after
/// each iteration so a long-running computation survives interruption.
pub async fn page_rank(
    adjacency: &AdjacencyMaintainer,
    seed_nodes: &[Value],
    max_iterations: u32,
    convergence_threshold: f64,
    scratch: &Subspace,
    tx: &dyn Transaction,
) -> Result<HashMap<String, f64>, MaintenanceError> {
    let nodes = discover_nodes(adjacency, seed_nodes, tx).await?;
    if nodes.is_empty() {
        return Ok(HashMap::new());
    }
    let n = nodes.len() as f64;
    let mut scores: HashMap<String, f64> = nodes.iter().map(|k| (k.clone(), 1.0 / n)).collect();

    let mut out_degree: HashMap<String, usize> = HashMap::new();
    let mut out_edges: HashMap<String, Vec<String>> = HashMap::new();
    for key in &nodes {
        let neighbors = adjacency.out_neighbors(&Value::String(key.clone()), tx).await?;
        let names: Vec<String> = neighbors.iter().map(value_key).collect();
        out_degree.insert(key.clone(), names.len());
        out_edges.insert(key.clone(), names);
    }

    for _ in 0..max_iterations {
        let mut next: HashMap<String, f64> = nodes.iter().map(|k| (k.clone(), (1.0 - DAMPING) / n)).collect();
        for (source, targets) in &out_edges {
            let degree = out_degree.get(source).copied().unwrap_or(0);
            if degree == 0 {
                continue;
            }
            let share = DAMPING * scores[source] / degree as f64;
            for target in targets {
                *next.entry(target.clone()).or_insert(0.0) += share;
            }
        }

        let delta: f64 = nodes.iter().map(|k| (next[k] - scores[k]).abs()).sum();
        scores = next;
        if delta < convergence_threshold {
            break;
        }
    }

    for (node, score) in &scores {
        let key = scratch.pack(&[Value::String(node.clone())]).unwrap_or_default();
        tx.set(key, stratum_primitives::tuple::pack(&[Value::Double(*score)]));
    }
    Ok(scores)
}

/// Community detection via synchronous label propagation: each node
/// adopts the most frequent label among its neighbors, ties broken by
/// keeping the current label. Bounded by `max_iterations`.
pub async fn label_propagation(
    adjacency: &AdjacencyMaintainer,
    seed_nodes: &[Value],
    max_iterations: u32,
    scratch: &Subspace,
    tx: &dyn Transaction,
) -> Result<HashMap<String, String>, MaintenanceError> {
    let nodes = discover_nodes(adjacency, seed_nodes, tx).await?;
    let mut labels: HashMap<String, String> = nodes.iter().map(|k| (k.clone(), k.clone())).collect();

    for _ in 0..max_iterations {
        let mut changed = false;
        let mut next = labels.clone();
        for node in &nodes {
            let neighbors = adjacency.out_neighbors(&Value::String(node.clone()), tx).await?;
            if neighbors.is_empty() {
                continue;
            }
            let mut counts: HashMap<String, usize> = HashMap::new();
            for neighbor in &neighbors {
                let label = labels.get(&value_key(neighbor)).cloned().unwrap_or_else(|| value_key(neighbor));
                *counts.entry(label).or_insert(0) += 1;
            }
            let mut best = (labels[node].clone(), 0usize);
            let mut ranked: Vec<_> = counts.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            if let Some((label, count)) = ranked.into_iter().next() {
                if count > best.1 || (count == best.1 && label < best.0) {
                    best = (label, count);
                }
            }
            if best.0 != labels[node] {
                changed = true;
            }
            next.insert(node.clone(), best.0);
        }
        labels = next;
        if !changed {
            break;
        }
    }

    for (node, label) in &labels {
        let key = scratch.pack(&[Value::String(node.clone())]).unwrap_or_default();
        tx.set(key, label.clone().into_bytes());
    }
    Ok(labels)
}

fn value_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

/// BFS outward from `seed_nodes` over the forward adjacency, the working
/// set both algorithms iterate. Not exposed: callers only need the
/// resulting score/label maps.
async fn discover_nodes(
    adjacency: &AdjacencyMaintainer,
    seed_nodes: &[Value],
    tx: &dyn Transaction,
) -> Result<Vec<String>, MaintenanceError> {
    let mut visited: Vec<String> = Vec::new();
    let mut frontier: Vec<Value> = seed_nodes.to_vec();
    while let Some(node) = frontier.pop() {
        let key = value_key(&node);
        if visited.contains(&key) {
            continue;
        }
        visited.push(key);
        let neighbors = adjacency.out_neighbors(&node, tx).await?;
        frontier.extend(neighbors);
    }
    visited.sort();
    Ok(visited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::mem::MemoryDatabase;
    use crate::kv::Database;
    use crate::model::{Capability, GraphKind, IndexKind};
    use crate::model::IndexDescriptor;
    use crate::record::{FieldTable, Record};

    struct Edge {
        src: String,
        dst: String,
    }

    impl Record for Edge {
        const TYPE_NAME: &'static str = "edge";
        const FIELD_TABLE: FieldTable = FieldTable::new(&["src", "dst"]);

        fn field(&self, id: u16) -> Value {
            match id {
                0 => Value::String(self.src.clone()),
                1 => Value::String(self.dst.clone()),
                _ => Value::Null,
            }
        }

        fn primary_key(&self) -> Vec<Value> {
            vec![Value::String(format!("{}->{}", self.src, self.dst))]
        }
    }

    #[tokio::test]
    async fn page_rank_converges_within_iteration_bound() {
        use crate::index::IndexMaintainer;

        let db = MemoryDatabase::new();
        let descriptor = IndexDescriptor::new(
            "follows",
            IndexKind::Graph(GraphKind::Adjacency),
            Capability::default(),
            &Edge::FIELD_TABLE,
            &["src", "dst"],
            false,
            false,
            &[],
        )
        .unwrap();
        let adjacency = AdjacencyMaintainer::new(descriptor, Subspace::new(b"idx/pr".to_vec()));
        let edges = vec![
            Edge { src: "a".into(), dst: "b".into() },
            Edge { src: "b".into(), dst: "c".into() },
            Edge { src: "c".into(), dst: "a".into() },
        ];
        for edge in &edges {
            let tx = db.begin();
            IndexMaintainer::<Edge>::update(&adjacency, None, Some(edge), &edge.primary_key(), &tx)
                .await
                .unwrap();
            db.commit(&tx).await.unwrap();
        }

        let tx = db.begin();
        let scratch = Subspace::new(b"scratch/pr".to_vec());
        let scores = page_rank(&adjacency, &[Value::String("a".into())], 50, 1e-6, &scratch, &tx)
            .await
            .unwrap();
        assert_eq!(scores.len(), 3);
        let total: f64 = scores.values().sum();
        assert!((total - 1.0).abs() < 0.05);
    }
}
