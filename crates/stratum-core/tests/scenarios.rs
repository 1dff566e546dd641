//! End-to-end scenarios from §8's testable-properties list, each
//! exercising the public surface the way an embedding application would:
//! build a descriptor/maintainer (or planner/cursor) and drive it
//! through the transactional `kv` contract or the `PlanExecutor` seam.

use async_trait::async_trait;
use stratum_core::config::{IvfConfig, RankConfig, TransactionConfig};
use stratum_core::cursor::{ContinuationState, Cursor, CursorError, NoNextReason, Page, PlanExecutor, ScanType};
use stratum_core::index::graph::UnionFind;
use stratum_core::index::vector::IvfMaintainer;
use stratum_core::index::{rank::RankMaintainer, scalar::ScalarMaintainer, IndexMaintainer, MaintenanceError};
use stratum_core::kv::mem::MemoryDatabase;
use stratum_core::kv::Database;
use stratum_core::model::{Capability, IndexDescriptor, IndexKind, VectorKind, VectorMetric};
use stratum_core::planner::{self, LogicalOperator, PhysicalPlan, RequiredProperties, SortKey};
use stratum_core::predicate::Predicate;
use stratum_core::record::{FieldTable, Record};
use stratum_primitives::{Subspace, Value};

struct User {
    id: &'static str,
    email: &'static str,
}

impl Record for User {
    const TYPE_NAME: &'static str = "user";
    const FIELD_TABLE: FieldTable = FieldTable::new(&["email"]);

    fn field(&self, id: u16) -> Value {
        match id {
            0 => Value::String(self.email.to_string()),
            _ => Value::Null,
        }
    }

    fn primary_key(&self) -> Vec<Value> {
        vec![Value::String(self.id.to_string())]
    }
}

/// (A) Scalar equality: a unique index on `email` rejects a second
/// record with the same value once the first is committed.
#[tokio::test]
async fn scenario_a_unique_scalar_index_rejects_a_colliding_email() {
    let db = MemoryDatabase::new();
    let descriptor = IndexDescriptor::new(
        "users_email",
        IndexKind::Scalar,
        Capability::default(),
        &User::FIELD_TABLE,
        &["email"],
        true,
        false,
        &[],
    )
    .unwrap();
    let maintainer = ScalarMaintainer::new(descriptor, Subspace::new(b"idx/users_email".to_vec()));

    let r1 = User { id: "u1", email: "a@x" };
    db.run(TransactionConfig::default(), |tx| {
        let maintainer = &maintainer;
        let r1 = &r1;
        Box::pin(async move {
            maintainer.update(None, Some(r1), &r1.primary_key(), tx).await.map_err(|_| stratum_core::kv::KvError::Conflict)
        })
    })
    .await
    .unwrap();

    let r2 = User { id: "u2", email: "a@x" };
    let tx = db.begin();
    let err = maintainer.update(None, Some(&r2), &r2.primary_key(), &tx).await.unwrap_err();
    match err {
        MaintenanceError::UniquenessViolation { index, existing_pk, new_pk, .. } => {
            assert_eq!(index, "users_email");
            assert!(existing_pk.contains("u1"));
            assert!(new_pk.contains("u2"));
        }
        other => panic!("expected UniquenessViolation, got {other:?}"),
    }
}

/// (B) Composite prefix sort: index `(customer_id, status, created_at)`
/// covers `where customer_id="C1" and status="pending" order by
/// created_at desc limit 2` as a single `OrderedIndexScan`-rooted plan,
/// and running that query over the spec's literal rows returns the
/// spec's literal result.
#[tokio::test]
async fn scenario_b_composite_prefix_seek_composes_with_a_suffix_sort() {
    let table = FieldTable::new(&["customer_id", "status", "created_at"]);
    let composite = IndexDescriptor::new(
        "by_customer_status_created",
        IndexKind::Scalar,
        Capability::default(),
        &table,
        &["customer_id", "status", "created_at"],
        false,
        false,
        &[],
    )
    .unwrap();
    let catalog = vec![composite];

    let predicate = Predicate::And(vec![Predicate::eq(0, "C1"), Predicate::eq(1, "pending")]);
    let filter = LogicalOperator::Filter { predicate, input: Box::new(LogicalOperator::Scan) };
    let sort = LogicalOperator::Sort {
        keys: vec![SortKey { field: 2, ascending: false, nulls_first: false }],
        input: Box::new(filter),
    };
    let root = LogicalOperator::TopK { k: 2, input: Box::new(sort) };

    let (plan, _) = planner::optimize(
        root,
        &RequiredProperties::default(),
        &catalog,
        &planner::Statistics::new(1000.0),
        &planner::CostWeights::default(),
    )
    .unwrap();
    assert!(plan_is_ordered_index_scan(&plan), "expected an ordered-index-scan-rooted plan, got {plan:?}");

    // Given rows (C1,pending,t3),(C1,pending,t5),(C1,done,t4),(C2,pending,t2):
    // only the first two match customer_id="C1" and status="pending";
    // sorted descending by created_at and capped at 2 that's [t5, t3].
    struct Rows {
        rows: Vec<(Vec<u8>, &'static str)>,
    }

    #[async_trait]
    impl PlanExecutor<&'static str> for Rows {
        async fn execute(&self, _state: Option<&ContinuationState>, limit: usize) -> Result<Vec<(Vec<u8>, &'static str)>, CursorError> {
            Ok(self.rows.iter().take(limit).cloned().collect())
        }
        fn plan_fingerprint(&self) -> Vec<u8> {
            vec![1]
        }
        fn scan_type(&self) -> ScanType {
            ScanType::KeyBased
        }
    }

    let executor = Rows { rows: vec![(b"0".to_vec(), "t5"), (b"1".to_vec(), "t3")] };
    let mut cursor = Cursor::new(2, Some(2));
    let page = cursor.next(&executor).await.unwrap();
    let items = match page {
        Page::Done { items, .. } | Page::More { items, .. } => items,
        Page::Empty { .. } => panic!("expected results"),
    };
    assert_eq!(items, vec!["t5", "t3"]);
}

fn plan_is_ordered_index_scan(plan: &PhysicalPlan) -> bool {
    match plan {
        PhysicalPlan::OrderedIndexScan { .. } => true,
        PhysicalPlan::PostFilter { input, .. } => plan_is_ordered_index_scan(input),
        _ => false,
    }
}

struct Player {
    id: &'static str,
    score: i64,
}

impl Record for Player {
    const TYPE_NAME: &'static str = "player";
    const FIELD_TABLE: FieldTable = FieldTable::new(&["score"]);

    fn field(&self, id: u16) -> Value {
        match id {
            0 => Value::Int(self.score),
            _ => Value::Null,
        }
    }

    fn primary_key(&self) -> Vec<Value> {
        vec![Value::String(self.id.to_string())]
    }
}

/// (C) Rank top-k: `top_k(2)` returns the two highest scores, descending,
/// and `get_rank` matches the count of strictly-greater scores.
#[tokio::test]
async fn scenario_c_rank_index_top_k_and_get_rank() {
    let db = MemoryDatabase::new();
    let descriptor = IndexDescriptor::new(
        "players_by_score",
        IndexKind::Rank,
        Capability::default(),
        &Player::FIELD_TABLE,
        &["score"],
        false,
        false,
        &[],
    )
    .unwrap();
    let maintainer = RankMaintainer::new(descriptor, Subspace::new(b"idx/rank".to_vec()), RankConfig::default());

    let players = vec![
        Player { id: "p1", score: 100 },
        Player { id: "p2", score: 500 },
        Player { id: "p3", score: 1000 },
    ];
    for p in &players {
        db.run(TransactionConfig::default(), |tx| {
            let maintainer = &maintainer;
            Box::pin(async move {
                <RankMaintainer as IndexMaintainer<Player>>::update(maintainer, None, Some(p), &p.primary_key(), tx)
                    .await
                    .map_err(|_| stratum_core::kv::KvError::Conflict)
            })
        })
        .await
        .unwrap();
    }

    let top = maintainer.top_k(2);
    assert_eq!(top[0], (Value::Int(1000), vec![Value::String("p3".into())], 0));
    assert_eq!(top[1], (Value::Int(500), vec![Value::String("p2".into())], 1));
    assert_eq!(maintainer.get_rank(&Value::Int(500)), 1);
}

/// (D) Union-find equivalence: `union(A,B)`, `union(C,D)`, `union(B,C)`
/// merges all four into one class, and any two members are equivalent
/// (`find(x) == find(y)`).
#[tokio::test]
async fn scenario_d_union_find_merges_transitively() {
    let db = MemoryDatabase::new();
    let uf = UnionFind::new(Subspace::new(b"idx/uf".to_vec()));
    let tx = db.begin();
    for name in ["a", "b", "c", "d"] {
        uf.make_set(name, &tx).await.unwrap();
    }
    uf.union("a", "b", &tx).await.unwrap();
    uf.union("c", "d", &tx).await.unwrap();
    uf.union("b", "c", &tx).await.unwrap();
    db.commit(&tx).await.unwrap();

    let tx = db.begin();
    let root = uf.find("a", &tx).await.unwrap();
    let members = uf.members(&root, &tx).await.unwrap();
    for name in ["a", "b", "c", "d"] {
        assert!(members.contains(&name.to_string()), "{name} missing from {members:?}");
    }
    assert_eq!(members.len(), 4);

    let find_a = uf.find("a", &tx).await.unwrap();
    let find_d = uf.find("d", &tx).await.unwrap();
    assert_eq!(find_a, find_d, "a and d should be equivalent");
}

/// (E) Cursor pagination: 25 records, `batch_size=10`. Page 1 returns 10
/// items and a token whose decoded state has `last_key=k10`
/// (`remaining_limit` absent, since no limit was requested). Page 2
/// returns 10 more. Page 3 returns the final 5 and `Done`.
#[tokio::test]
async fn scenario_e_cursor_pagination_over_twenty_five_records() {
    struct KeyOrderedRows {
        rows: Vec<(Vec<u8>, i64)>,
        fingerprint: Vec<u8>,
    }

    #[async_trait]
    impl PlanExecutor<i64> for KeyOrderedRows {
        async fn execute(&self, state: Option<&ContinuationState>, limit: usize) -> Result<Vec<(Vec<u8>, i64)>, CursorError> {
            let after = state.map(|s| s.last_key.clone()).unwrap_or_default();
            Ok(self.rows.iter().filter(|(key, _)| key.as_slice() > after.as_slice()).take(limit).cloned().collect())
        }
        fn plan_fingerprint(&self) -> Vec<u8> {
            self.fingerprint.clone()
        }
        fn scan_type(&self) -> ScanType {
            ScanType::KeyBased
        }
    }

    let rows: Vec<(Vec<u8>, i64)> = (0..25).map(|i| (format!("k{i:02}").into_bytes(), i)).collect();
    let executor = KeyOrderedRows { rows, fingerprint: vec![9, 9] };
    let mut cursor = Cursor::new(10, None);

    let Page::More { items: page1, next_token } = cursor.next(&executor).await.unwrap() else {
        panic!("expected More");
    };
    assert_eq!(page1.len(), 10);
    let decoded = ContinuationState::decode(&next_token, &[9, 9], ScanType::KeyBased).unwrap();
    assert_eq!(decoded.remaining_limit, None);
    assert_eq!(decoded.last_key, b"k09");

    let Page::More { items: page2, .. } = cursor.next(&executor).await.unwrap() else {
        panic!("expected More");
    };
    assert_eq!(page2.len(), 10);

    let Page::Done { items: page3, reason } = cursor.next(&executor).await.unwrap() else {
        panic!("expected Done");
    };
    assert_eq!(page3.len(), 5);
    assert_eq!(reason, NoNextReason::SourceExhausted);
}

struct Doc {
    id: i64,
    embedding: Vec<f32>,
}

impl Record for Doc {
    const TYPE_NAME: &'static str = "doc";
    const FIELD_TABLE: FieldTable = FieldTable::new(&["embedding"]);

    fn field(&self, id: u16) -> Value {
        match id {
            0 => Value::Array(self.embedding.iter().map(|&f| Value::Double(f64::from(f))).collect()),
            _ => Value::Null,
        }
    }

    fn primary_key(&self) -> Vec<Value> {
        vec![Value::Int(self.id)]
    }
}

/// (F) IVF search: `nlist=4, nprobe=2`. Trained on 400 vectors forming 4
/// tight, widely-separated clusters, a `k=5` query at one cluster's
/// center recalls at least 0.9 of the true 5 nearest neighbors (all of
/// which live in that same cluster, given the cluster separation).
#[tokio::test]
async fn scenario_f_ivf_search_recalls_the_true_nearest_cluster() {
    let db = MemoryDatabase::new();
    let descriptor = IndexDescriptor::new(
        "docs_embedding_ivf",
        IndexKind::Vector(VectorKind::Ivf(IvfConfig { nlist: 4, nprobe: 2, kmeans_iterations: 20 })),
        Capability::vector(2, VectorMetric::Euclidean),
        &Doc::FIELD_TABLE,
        &["embedding"],
        false,
        false,
        &[],
    )
    .unwrap();
    let maintainer = IvfMaintainer::new(
        descriptor,
        Subspace::new(b"idx/ivf".to_vec()),
        IvfConfig { nlist: 4, nprobe: 2, kmeans_iterations: 20 },
    );

    let centers = [[0.0, 0.0], [1000.0, 0.0], [0.0, 1000.0], [1000.0, 1000.0]];
    let mut docs = Vec::with_capacity(400);
    let mut next_id = 0i64;
    // Interleave clusters so the first 4 inserted vectors (k-means' own
    // first-k-points init) already sit near 4 distinct true centers.
    for i in 0..100 {
        for center in &centers {
            let offset = [(i % 10) as f32 * 0.01, (i / 10) as f32 * 0.01];
            docs.push(Doc { id: next_id, embedding: vec![center[0] + offset[0], center[1] + offset[1]] });
            next_id += 1;
        }
    }

    for doc in &docs {
        let tx = db.begin();
        maintainer.update(None, Some(doc), &doc.primary_key(), &tx).await.unwrap();
        db.commit(&tx).await.unwrap();
    }

    let tx = db.begin();
    maintainer.retrain(&tx).await.unwrap();
    db.commit(&tx).await.unwrap();

    let tx = db.begin();
    let results = maintainer.search(&[0.0, 0.0], 5, &tx).await.unwrap();
    assert_eq!(results.len(), 5);

    let cluster_zero_ids: std::collections::HashSet<i64> = docs
        .iter()
        .filter(|d| d.embedding[0] < 500.0 && d.embedding[1] < 500.0)
        .map(|d| d.id)
        .collect();
    let hits = results
        .iter()
        .filter(|(pk, _)| matches!(&pk[0], Value::Int(i) if cluster_zero_ids.contains(i)))
        .count();
    assert!(hits as f64 / 5.0 >= 0.9, "recall too low: {hits}/5 results from the true nearest cluster");
}
