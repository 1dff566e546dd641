//! Module: index::graph::union_find
//! Responsibility: the persistent union-find over graph IRIs (§4.3.4),
//! backing `owl:sameAs`-style equivalence classes: `make_set`, `find`
//! with path compression, `union` by rank with a deterministic tie-break,
//! and `members`/`expand` reads of an equivalence class.

use stratum_primitives::{Subspace, Value};

use crate::kv::{RangeOptions, Transaction};
use crate::online::GraphAlgorithmError;

///
/// UnionFind
///
/// Storage layout, per §3: `parent/[individual] -> parent_IRI` (self-loop
/// for roots), `rank/[individual] -> i64`, `members/[root]/[member] ->
/// ''`. Every call is transactional; callers batch `find`/`union` calls
/// under one `kv::Transaction` the way maintainers do.
///

pub struct UnionFind {
    parent: Subspace,
    rank: Subspace,
    members: Subspace,
}

impl UnionFind {
    #[must_use]
    pub fn new(subspace: Subspace) -> Self {
        Self {
            parent: subspace.subspace("parent"),
            rank: subspace.subspace("rank"),
            members: subspace.subspace("members"),
        }
    }

    fn parent_key(&self, individual: &str) -> Vec<u8> {
        self.parent.pack(&[Value::String(individual.to_string())]).unwrap_or_default()
    }

    fn rank_key(&self, individual: &str) -> Vec<u8> {
        self.rank.pack(&[Value::String(individual.to_string())]).unwrap_or_default()
    }

    fn members_key(&self, root: &str, member: &str) -> Vec<u8> {
        self.members
            .pack(&[Value::String(root.to_string()), Value::String(member.to_string())])
            .unwrap_or_default()
    }

    /// Registers `individual` as its own root if it has no entry yet.
    pub async fn make_set(&self, individual: &str, tx: &dyn Transaction) -> Result<(), GraphAlgorithmError> {
        let key = self.parent_key(individual);
        if tx.get(&key, false).await.map_err(|_| GraphAlgorithmError::IndexNotConfigured {
            name: individual.to_string(),
        })?.is_none()
        {
            tx.set(key, Value::String(individual.to_string()).into_bytes());
            tx.set(self.rank_key(individual), 0i64.to_le_bytes().to_vec());
            tx.set(self.members_key(individual, individual), Vec::new());
        }
        Ok(())
    }

    /// Follows parent pointers to the root, writing back every traversed
    /// node directly to the root (path compression, §4.3.4).
    pub async fn find(&self, individual: &str, tx: &dyn Transaction) -> Result<String, GraphAlgorithmError> {
        let mut path = Vec::new();
        let mut current = individual.to_string();
        loop {
            let key = self.parent_key(&current);
            let raw = tx
                .get(&key, false)
                .await
                .map_err(|_| GraphAlgorithmError::IndexNotFound { iri: current.clone() })?
                .ok_or_else(|| GraphAlgorithmError::IndexNotFound { iri: current.clone() })?;
            let parent = String::from_utf8_lossy(&raw).to_string();
            if parent == current {
                break;
            }
            path.push(current);
            current = parent;
        }
        let root = current;
        for node in path {
            tx.set(self.parent_key(&node), root.clone().into_bytes());
        }
        Ok(root)
    }

    /// Union by rank; a tie is broken by the lexicographically smaller
    /// IRI winning as the new root (§4.3.4, deterministic). Migrates
    /// `members` rows from the losing root to the winning one.
    pub async fn union(&self, a: &str, b: &str, tx: &dyn Transaction) -> Result<String, GraphAlgorithmError> {
        let root_a = self.find(a, tx).await?;
        let root_b = self.find(b, tx).await?;
        if root_a == root_b {
            return Ok(root_a);
        }

        let rank_a = self.read_rank(&root_a, tx).await?;
        let rank_b = self.read_rank(&root_b, tx).await?;

        let (winner, loser, winner_rank) = match rank_a.cmp(&rank_b) {
            std::cmp::Ordering::Greater => (root_a.clone(), root_b.clone(), rank_a),
            std::cmp::Ordering::Less => (root_b.clone(), root_a.clone(), rank_b),
            std::cmp::Ordering::Equal if root_a <= root_b => (root_a.clone(), root_b.clone(), rank_a + 1),
            std::cmp::Ordering::Equal => (root_b.clone(), root_a.clone(), rank_b + 1),
        };

        tx.set(self.parent_key(&loser), winner.clone().into_bytes());
        tx.set(self.rank_key(&winner), winner_rank.to_le_bytes().to_vec());

        let loser_members = self.members(&loser, tx).await?;
        for member in loser_members {
            tx.clear(&self.members_key(&loser, &member));
            tx.set(self.members_key(&winner, &member), Vec::new());
        }
        Ok(winner)
    }

    async fn read_rank(&self, individual: &str, tx: &dyn Transaction) -> Result<i64, GraphAlgorithmError> {
        let raw = tx
            .get(&self.rank_key(individual), false)
            .await
            .map_err(|_| GraphAlgorithmError::IndexNotFound { iri: individual.to_string() })?
            .ok_or_else(|| GraphAlgorithmError::IndexNotFound { iri: individual.to_string() })?;
        let mut buf = [0u8; 8];
        let n = raw.len().min(8);
        buf[..n].copy_from_slice(&raw[..n]);
        Ok(i64::from_le_bytes(buf))
    }

    /// All members of the equivalence class rooted at `root`, always
    /// including `root` itself.
    pub async fn members(&self, root: &str, tx: &dyn Transaction) -> Result<Vec<String>, GraphAlgorithmError> {
        let prefix = self.members.pack(&[Value::String(root.to_string())]).unwrap_or_default();
        let mut end = prefix.clone();
        end.push(0xFF);
        let rows = tx
            .get_range(&prefix, &end, RangeOptions::default())
            .await
            .map_err(|_| GraphAlgorithmError::IndexNotFound { iri: root.to_string() })?;
        rows.iter()
            .map(|row| {
                let parts = self.members.unpack(&row.key).map_err(|_| GraphAlgorithmError::IndexNotFound {
                    iri: root.to_string(),
                })?;
                match &parts[1] {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(GraphAlgorithmError::IndexNotFound { iri: root.to_string() }),
                }
            })
            .collect()
    }

    /// `find(individual)` followed by `members(root)`: the full
    /// equivalence class `individual` currently belongs to.
    pub async fn expand(&self, individual: &str, tx: &dyn Transaction) -> Result<Vec<String>, GraphAlgorithmError> {
        let root = self.find(individual, tx).await?;
        self.members(&root, tx).await
    }
}

trait IntoBytes {
    fn into_bytes(self) -> Vec<u8>;
}

impl IntoBytes for Value {
    fn into_bytes(self) -> Vec<u8> {
        match self {
            Value::String(s) => s.into_bytes(),
            other => format!("{other:?}").into_bytes(),
        }
    }
}
