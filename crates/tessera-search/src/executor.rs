//! Hybrid query execution.
//!
//! The executor takes a validated [`SearchRequest`], runs the active search
//! paths against the [`SearchEngine`], hands the results to a [`Reranker`]
//! and shapes the reranked rows into the final output:
//!
//! 1. Resolve the query vector (embedding cache, then provider).
//! 2. Run vector and/or full-text search, each fetching `limit + offset`
//!    candidates. In hybrid mode both run concurrently and are joined.
//! 3. Rerank: the requested strategy, else RRF for hybrid and native scores
//!    for single-path queries.
//! 4. Check the reranker's output, then sort by relevance, drop duplicate
//!    rows, apply `offset` and `limit`, and project columns.
//!
//! Any failure fails the whole query. Dropping the result stream before it
//! completes drops every outstanding search and embedding future with it.

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt, TryStreamExt};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tessera_core::{Error, Result, TesseraConfig};

use crate::engine::{FtsSearchRequest, SearchEngine, VectorSearchRequest};
use crate::query::{QueryBuilder, SearchRequest, VectorQuery};
use crate::rerank::{
    PassThroughReranker, RerankContext, Reranker, RrfReranker, SearchMode, distinct_count,
};
use crate::resolver::EmbeddingResolver;
use crate::types::{RELEVANCE_COLUMN, RankedRow, RawResult, Row, RowIdentity, is_internal_column};

/// Runs search requests against one engine.
pub struct HybridExecutor {
    engine: Arc<dyn SearchEngine>,
    resolver: EmbeddingResolver,
    config: TesseraConfig,
    identity: RowIdentity,
}

impl HybridExecutor {
    /// Create an executor. Rows are identified by their full contents until
    /// [`with_identity`](Self::with_identity) declares a primary key.
    pub fn new(
        engine: Arc<dyn SearchEngine>,
        resolver: EmbeddingResolver,
        config: TesseraConfig,
    ) -> Self {
        Self {
            engine,
            resolver,
            config,
            identity: RowIdentity::default(),
        }
    }

    /// Set how duplicate rows are recognised.
    pub fn with_identity(mut self, identity: RowIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &TesseraConfig {
        &self.config
    }

    /// Row identity used for dedup and hybrid merging.
    pub fn identity(&self) -> &RowIdentity {
        &self.identity
    }

    /// The embedding resolver.
    pub fn resolver(&self) -> &EmbeddingResolver {
        &self.resolver
    }

    /// Start building a query.
    pub fn query(self: &Arc<Self>) -> QueryBuilder {
        QueryBuilder::new(Arc::clone(self))
    }

    /// Run `request` lazily; nothing happens until the stream is polled.
    pub fn execute(self: &Arc<Self>, request: SearchRequest) -> RankedRowStream {
        let executor = Arc::clone(self);
        RankedRowStream::new(async move { executor.run(request).await })
    }

    /// Run `request` to completion.
    pub async fn run(&self, request: SearchRequest) -> Result<Vec<RankedRow>> {
        let mode = request.mode();
        let reranker = self.reranker_for(&request)?;
        let fetch = request.fetch_size();

        log::debug!(
            "executing {mode} query on {} (fetch {fetch}, reranker {})",
            self.engine.name(),
            reranker.name()
        );

        let (vector, fts) = match mode {
            SearchMode::VectorOnly => (self.search_vector(&request, fetch).await?, Vec::new()),
            SearchMode::TextOnly => (Vec::new(), self.search_fts(&request, fetch).await?),
            SearchMode::Hybrid => futures::try_join!(
                self.search_vector(&request, fetch),
                self.search_fts(&request, fetch)
            )?,
        };
        log::debug!("search returned {} vector and {} fts rows", vector.len(), fts.len());

        let union = distinct_count(&self.identity, &vector, &fts);
        let ctx = RerankContext {
            query: request.query_text(),
            identity: &self.identity,
        };
        let reranked = match mode {
            SearchMode::VectorOnly => reranker.rerank_vector(&ctx, vector)?,
            SearchMode::TextOnly => reranker.rerank_fts(&ctx, fts)?,
            SearchMode::Hybrid => reranker.rerank_hybrid(&ctx, vector, fts)?,
        };

        let scored = check_contract(reranker.name(), reranked, union)?;
        Ok(self.finalize(scored, &request))
    }

    fn reranker_for(&self, request: &SearchRequest) -> Result<Arc<dyn Reranker>> {
        let reranker: Arc<dyn Reranker> = match (request.reranker(), request.mode()) {
            (Some(strategy), _) => strategy.instantiate(&self.config.rerank)?,
            (None, SearchMode::Hybrid) => Arc::new(RrfReranker::new(self.config.rerank.rrf_k)?),
            (None, _) => Arc::new(PassThroughReranker),
        };
        if !reranker.capabilities().supports(request.mode()) {
            return Err(crate::rerank::unsupported(reranker.name(), request.mode()));
        }
        Ok(reranker)
    }

    async fn search_vector(&self, request: &SearchRequest, top_k: usize) -> Result<Vec<RawResult>> {
        let vector = match request.vector_query() {
            Some(VectorQuery::Vector(v)) => v.clone(),
            Some(VectorQuery::Input { text, function }) => {
                self.resolver.resolve(text, function).await?
            }
            None => return Ok(Vec::new()),
        };
        self.engine
            .vector_search(VectorSearchRequest {
                vector,
                column: request.vector_column().to_string(),
                filter: request.filter().map(str::to_string),
                prefilter: request.prefilter(),
                nprobes: request.nprobes(),
                refine_factor: request.refine_factor(),
                metric: request.metric(),
                top_k,
            })
            .await
    }

    async fn search_fts(&self, request: &SearchRequest, top_k: usize) -> Result<Vec<RawResult>> {
        let Some(text) = request.text_query() else {
            return Ok(Vec::new());
        };
        self.engine
            .full_text_search(FtsSearchRequest {
                text: text.to_string(),
                filter: request.filter().map(str::to_string),
                prefilter: request.prefilter(),
                top_k,
            })
            .await
    }

    // Stable sort, so among equal scores the reranker's order stands and the
    // first occurrence of a duplicate is also its best.
    fn finalize(&self, mut scored: Vec<(f32, Row)>, request: &SearchRequest) -> Vec<RankedRow> {
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        let mut seen = HashSet::new();
        scored
            .into_iter()
            .filter(|(_, row)| seen.insert(self.identity.key(row)))
            .skip(request.offset())
            .take(request.limit())
            .map(|(relevance_score, row)| RankedRow {
                row: project(row, request.select_columns()),
                relevance_score,
            })
            .collect()
    }
}

impl fmt::Debug for HybridExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridExecutor")
            .field("engine", &self.engine.name())
            .field("resolver", &self.resolver)
            .field("identity", &self.identity)
            .finish()
    }
}

fn check_contract(name: &str, rows: Vec<Row>, union: usize) -> Result<Vec<(f32, Row)>> {
    if rows.len() > union {
        return Err(Error::contract_violation(format!(
            "reranker '{name}' returned {} rows from {union} distinct inputs",
            rows.len()
        )));
    }
    rows.into_iter()
        .map(|row| {
            let score = row
                .get(RELEVANCE_COLUMN)
                .and_then(Value::as_f64)
                .map(|s| s as f32)
                .filter(|s| s.is_finite())
                .ok_or_else(|| {
                    Error::contract_violation(format!(
                        "reranker '{name}' returned a row without a finite {RELEVANCE_COLUMN}"
                    ))
                })?;
            Ok((score, row))
        })
        .collect()
}

/// Keep only the `select` columns, or every non-internal column if empty.
fn project(mut row: Row, select: &[String]) -> Row {
    if select.is_empty() {
        row.retain(|column, _| !is_internal_column(column));
        return row;
    }
    select
        .iter()
        .filter_map(|column| row.remove(column).map(|v| (column.clone(), v)))
        .collect()
}

// ============================================================================
// Result stream
// ============================================================================

/// Lazy, single-pass stream of ranked rows.
pub struct RankedRowStream {
    inner: BoxStream<'static, Result<RankedRow>>,
}

impl RankedRowStream {
    fn new<F>(rows: F) -> Self
    where
        F: Future<Output = Result<Vec<RankedRow>>> + Send + 'static,
    {
        let inner = stream::once(rows)
            .map_ok(|rows| stream::iter(rows.into_iter().map(Ok::<RankedRow, Error>)))
            .try_flatten()
            .boxed();
        Self { inner }
    }

    /// Drain the stream into a vector.
    pub async fn try_collect_rows(self) -> Result<Vec<RankedRow>> {
        self.inner.try_collect().await
    }
}

impl Stream for RankedRowStream {
    type Item = Result<RankedRow>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for RankedRowStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RankedRowStream").finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
