//! End-to-end properties of the query pipeline over the in-memory engine.

use async_trait::async_trait;
use futures::StreamExt;
use proptest::prelude::*;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tessera_core::{Result, TesseraConfig};
use tessera_search::{
    EmbeddingFunction, EmbeddingRegistry, EmbeddingResolver, FtsSearchRequest, HybridExecutor,
    MemoryEngine, MockEmbeddingFunction, RankedRow, RawResult, RerankStrategy, Row, RowIdentity,
    SearchEngine, VectorSearchRequest, shared_cache,
};
use tokio::sync::Barrier;

const VOCABULARY: [&str; 6] = ["apple", "pear", "plum", "fig", "kiwi", "lime"];

fn row(value: Value) -> Row {
    serde_json::from_value(value).unwrap()
}

fn executor(engine: Arc<dyn SearchEngine>) -> Arc<HybridExecutor> {
    executor_with_embedding(engine, Arc::new(MockEmbeddingFunction::new(3)))
}

fn executor_with_embedding(
    engine: Arc<dyn SearchEngine>,
    function: Arc<dyn EmbeddingFunction>,
) -> Arc<HybridExecutor> {
    let config = TesseraConfig::default();
    let registry = EmbeddingRegistry::new().with("mock", function);
    let resolver = EmbeddingResolver::new(registry, shared_cache(&config.cache));
    let executor = HybridExecutor::new(engine, resolver, config)
        .with_identity(RowIdentity::primary_key(["id"]));
    Arc::new(executor)
}

fn ids(rows: &[RankedRow]) -> Vec<i64> {
    rows.iter().map(|r| r.get("id").and_then(Value::as_i64).unwrap()).collect()
}

fn priced_rows() -> Vec<Row> {
    vec![
        row(json!({"id": 1, "price": 10, "text": "cheap", "vector": [1.0, 0.0]})),
        row(json!({"id": 2, "price": 50, "text": "pricey", "vector": [0.0, 1.0]})),
    ]
}

#[tokio::test]
async fn prefilter_returns_only_matching_row() {
    let rows = executor(Arc::new(MemoryEngine::new(priced_rows())))
        .query()
        .vector(vec![0.9, 0.1])
        .filter("price<15")
        .prefilter(true)
        .execute()
        .unwrap()
        .try_collect_rows()
        .await
        .unwrap();

    assert_eq!(ids(&rows), vec![1]);
}

#[tokio::test]
async fn postfilter_with_small_limit_may_return_nothing() {
    let executor = executor(Arc::new(MemoryEngine::new(priced_rows())));
    let query = executor
        .query()
        .vector(vec![0.1, 0.9])
        .filter("price<15")
        .limit(1);

    // The single nearest candidate is row 2, which the filter then removes.
    let post = query
        .clone()
        .prefilter(false)
        .execute()
        .unwrap()
        .try_collect_rows()
        .await
        .unwrap();
    assert!(post.is_empty());

    let pre = query
        .prefilter(true)
        .execute()
        .unwrap()
        .try_collect_rows()
        .await
        .unwrap();
    assert_eq!(ids(&pre), vec![1]);
}

#[tokio::test]
async fn hybrid_output_contains_shared_row_once() {
    let corpus = vec![
        row(json!({"id": 1, "text": "apple pie", "vector": [1.0, 0.0]})),
        row(json!({"id": 2, "text": "pear tart", "vector": [0.7, 0.3]})),
        row(json!({"id": 3, "text": "apple crumble", "vector": [0.0, 1.0]})),
    ];
    let rows = executor(Arc::new(MemoryEngine::new(corpus)))
        .query()
        .vector(vec![1.0, 0.0])
        .full_text_search("apple")
        .execute()
        .unwrap()
        .try_collect_rows()
        .await
        .unwrap();

    let got = ids(&rows);
    assert_eq!(got.iter().filter(|id| **id == 1).count(), 1);
    assert_eq!(got.len(), 3);
    assert_eq!(got[0], 1);
}

#[tokio::test]
async fn explicit_rrf_matches_default_hybrid() {
    let corpus = vec![
        row(json!({"id": 1, "text": "fig jam", "vector": [1.0, 0.0]})),
        row(json!({"id": 2, "text": "fig roll", "vector": [0.5, 0.5]})),
    ];
    let executor = executor(Arc::new(MemoryEngine::new(corpus)));
    let base = executor.query().vector(vec![1.0, 0.0]).full_text_search("fig");

    let default = base.clone().execute().unwrap().try_collect_rows().await.unwrap();
    let explicit = base
        .rerank(RerankStrategy::rrf_with_k(60))
        .execute()
        .unwrap()
        .try_collect_rows()
        .await
        .unwrap();
    assert_eq!(default, explicit);
}

struct PendingEngine {
    dropped: Arc<AtomicBool>,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SearchEngine for PendingEngine {
    async fn vector_search(&self, _request: VectorSearchRequest) -> Result<Vec<RawResult>> {
        let _flag = DropFlag(self.dropped.clone());
        futures::future::pending().await
    }

    async fn full_text_search(&self, _request: FtsSearchRequest) -> Result<Vec<RawResult>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "pending"
    }
}

#[tokio::test]
async fn dropping_stream_cancels_outstanding_search() {
    let dropped = Arc::new(AtomicBool::new(false));
    let engine = Arc::new(PendingEngine {
        dropped: dropped.clone(),
    });
    let mut stream = executor(engine)
        .query()
        .vector(vec![1.0])
        .full_text_search("anything")
        .execute()
        .unwrap();

    let polled = tokio::time::timeout(Duration::from_millis(20), stream.next()).await;
    assert!(polled.is_err());
    assert!(!dropped.load(Ordering::SeqCst));

    drop(stream);
    assert!(dropped.load(Ordering::SeqCst));
}

/// Each path waits at a shared barrier, so neither can finish unless both
/// are in flight at once.
struct RendezvousEngine {
    inner: MemoryEngine,
    barrier: Barrier,
}

#[async_trait]
impl SearchEngine for RendezvousEngine {
    async fn vector_search(&self, request: VectorSearchRequest) -> Result<Vec<RawResult>> {
        self.barrier.wait().await;
        self.inner.vector_search(request).await
    }

    async fn full_text_search(&self, request: FtsSearchRequest) -> Result<Vec<RawResult>> {
        self.barrier.wait().await;
        self.inner.full_text_search(request).await
    }

    fn name(&self) -> &str {
        "rendezvous"
    }
}

#[tokio::test]
async fn hybrid_paths_run_concurrently() {
    let engine = Arc::new(RendezvousEngine {
        inner: MemoryEngine::new(priced_rows()),
        barrier: Barrier::new(2),
    });
    let stream = executor(engine)
        .query()
        .vector(vec![1.0, 0.0])
        .full_text_search("cheap")
        .execute()
        .unwrap();

    let rows = tokio::time::timeout(Duration::from_secs(5), stream.try_collect_rows())
        .await
        .expect("hybrid sub-searches did not overlap")
        .unwrap();
    assert_eq!(ids(&rows)[0], 1);
}

struct PendingEmbedding {
    dropped: Arc<AtomicBool>,
}

#[async_trait]
impl EmbeddingFunction for PendingEmbedding {
    async fn compute(&self, _input: &str) -> Result<Vec<f32>> {
        let _flag = DropFlag(self.dropped.clone());
        futures::future::pending().await
    }

    fn dimension(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "pending"
    }
}

#[tokio::test]
async fn dropping_stream_cancels_pending_embedding() {
    let dropped = Arc::new(AtomicBool::new(false));
    let embedding = Arc::new(PendingEmbedding {
        dropped: dropped.clone(),
    });
    let executor = executor_with_embedding(Arc::new(MemoryEngine::new(priced_rows())), embedding);
    let mut stream = executor
        .query()
        .nearest_to_text("cheap things", "mock")
        .execute()
        .unwrap();

    let polled = tokio::time::timeout(Duration::from_millis(20), stream.next()).await;
    assert!(polled.is_err());
    assert!(!dropped.load(Ordering::SeqCst));

    drop(stream);
    assert!(dropped.load(Ordering::SeqCst));
    assert!(executor.resolver().cache().lock().unwrap().is_empty());
}

fn corpus_strategy() -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec(
        (
            prop::collection::vec(-1.0f32..1.0f32, 3),
            prop::collection::vec(0usize..VOCABULARY.len(), 1..4),
        ),
        1..30,
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(id, (vector, words))| {
                let text: Vec<&str> = words.into_iter().map(|w| VOCABULARY[w]).collect();
                row(json!({"id": id, "text": text.join(" "), "vector": vector}))
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn output_is_bounded_and_ordered(
        corpus in corpus_strategy(),
        query in prop::collection::vec(-1.0f32..1.0f32, 3),
        word in 0usize..VOCABULARY.len(),
        limit in 1usize..20,
        offset in 0usize..5,
        hybrid in any::<bool>(),
    ) {
        let executor = executor(Arc::new(MemoryEngine::new(corpus)));
        let mut builder = executor.query().vector(query).limit(limit).offset(offset);
        if hybrid {
            builder = builder.full_text_search(VOCABULARY[word]);
        }

        let rows = tokio_test::block_on(builder.execute().unwrap().try_collect_rows()).unwrap();

        prop_assert!(rows.len() <= limit);
        for pair in rows.windows(2) {
            prop_assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
        let unique: HashSet<i64> = ids(&rows).into_iter().collect();
        prop_assert_eq!(unique.len(), rows.len());
    }
}
