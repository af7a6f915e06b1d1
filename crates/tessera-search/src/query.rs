//! Fluent query builder.
//!
//! [`QueryBuilder`] collects search parameters in any order and is consumed
//! and returned by value on every call, so a partially built query can be
//! cloned and branched without aliasing. Nothing is validated until
//! [`QueryBuilder::build`] (or [`QueryBuilder::execute`]), which produces an
//! immutable [`SearchRequest`].
//!
//! # Example
//!
//! ```rust,ignore
//! let rows = executor
//!     .query()
//!     .nearest_to_text("warm drinks", "minilm")
//!     .full_text_search("cocoa")
//!     .filter("price < 5")
//!     .select(["id", "title"])
//!     .limit(10)
//!     .rerank(RerankStrategy::rrf())
//!     .execute()?
//!     .try_collect_rows()
//!     .await?;
//! ```

use std::sync::Arc;
use tessera_core::{Error, Result};

use crate::executor::{HybridExecutor, RankedRowStream};
use crate::rerank::{RerankStrategy, SearchMode};
use crate::types::DistanceType;

/// What the vector path searches with.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorQuery {
    /// A ready-made query vector.
    Vector(Vec<f32>),
    /// Text to embed with a registered embedding function.
    Input {
        /// Text to embed.
        text: String,
        /// Registry id of the embedding function.
        function: String,
    },
}

impl VectorQuery {
    /// The query text, if the vector is yet to be computed from one.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Vector(_) => None,
            Self::Input { text, .. } => Some(text),
        }
    }
}

/// A validated, immutable search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub(crate) vector_query: Option<VectorQuery>,
    pub(crate) text_query: Option<String>,
    pub(crate) filter: Option<String>,
    pub(crate) limit: usize,
    pub(crate) offset: usize,
    pub(crate) select_columns: Vec<String>,
    pub(crate) prefilter: bool,
    pub(crate) nprobes: Option<usize>,
    pub(crate) refine_factor: Option<u32>,
    pub(crate) metric: DistanceType,
    pub(crate) vector_column: String,
    pub(crate) rerank_query: Option<String>,
    pub(crate) reranker: Option<RerankStrategy>,
    pub(crate) mode: SearchMode,
}

impl SearchRequest {
    /// Vector-path query.
    pub fn vector_query(&self) -> Option<&VectorQuery> {
        self.vector_query.as_ref()
    }

    /// Full-text query.
    pub fn text_query(&self) -> Option<&str> {
        self.text_query.as_deref()
    }

    /// Opaque filter predicate.
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Maximum number of rows returned.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Rows skipped before the limit applies.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Projected columns; empty means every non-internal column.
    pub fn select_columns(&self) -> &[String] {
        &self.select_columns
    }

    /// Whether the filter runs before the top-K cut.
    pub fn prefilter(&self) -> bool {
        self.prefilter
    }

    /// IVF partitions to probe.
    pub fn nprobes(&self) -> Option<usize> {
        self.nprobes
    }

    /// Refine factor for the vector path.
    pub fn refine_factor(&self) -> Option<u32> {
        self.refine_factor
    }

    /// Distance metric.
    pub fn metric(&self) -> DistanceType {
        self.metric
    }

    /// Vector column searched.
    pub fn vector_column(&self) -> &str {
        &self.vector_column
    }

    /// Explicit text handed to the reranker.
    pub fn rerank_query(&self) -> Option<&str> {
        self.rerank_query.as_deref()
    }

    /// Selected reranking strategy.
    pub fn reranker(&self) -> Option<&RerankStrategy> {
        self.reranker.as_ref()
    }

    /// Active search paths.
    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Candidates each active path fetches.
    pub fn fetch_size(&self) -> usize {
        self.limit.saturating_add(self.offset)
    }

    /// The text a reranker sees as "the query".
    pub fn query_text(&self) -> Option<&str> {
        self.rerank_query
            .as_deref()
            .or(self.text_query.as_deref())
            .or_else(|| self.vector_query.as_ref().and_then(VectorQuery::text))
    }
}

/// Builder for search requests against one [`HybridExecutor`].
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    executor: Arc<HybridExecutor>,
    vector_query: Option<VectorQuery>,
    text_query: Option<String>,
    filter: Option<String>,
    select_columns: Vec<String>,
    limit: Option<usize>,
    offset: usize,
    prefilter: Option<bool>,
    nprobes: Option<usize>,
    refine_factor: Option<u32>,
    metric: Option<DistanceType>,
    vector_column: Option<String>,
    rerank_query: Option<String>,
    reranker: Option<RerankStrategy>,
}

impl QueryBuilder {
    /// Start an empty query.
    pub fn new(executor: Arc<HybridExecutor>) -> Self {
        Self {
            executor,
            vector_query: None,
            text_query: None,
            filter: None,
            select_columns: Vec::new(),
            limit: None,
            offset: 0,
            prefilter: None,
            nprobes: None,
            refine_factor: None,
            metric: None,
            vector_column: None,
            rerank_query: None,
            reranker: None,
        }
    }

    /// Search with a ready-made vector.
    pub fn vector(mut self, vector: impl Into<Vec<f32>>) -> Self {
        self.vector_query = Some(VectorQuery::Vector(vector.into()));
        self
    }

    /// Search with the embedding of `text` under embedding function `function`.
    pub fn nearest_to_text(mut self, text: impl Into<String>, function: impl Into<String>) -> Self {
        self.vector_query = Some(VectorQuery::Input {
            text: text.into(),
            function: function.into(),
        });
        self
    }

    /// Add a full-text query.
    pub fn full_text_search(mut self, text: impl Into<String>) -> Self {
        self.text_query = Some(text.into());
        self
    }

    /// Restrict results with an engine predicate.
    pub fn filter(mut self, predicate: impl Into<String>) -> Self {
        self.filter = Some(predicate.into());
        self
    }

    /// Alias for [`filter`](Self::filter).
    pub fn only_if(self, predicate: impl Into<String>) -> Self {
        self.filter(predicate)
    }

    /// Project the output onto `columns`.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Maximum rows returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first `offset` ranked rows.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Filter before (true) or after (false) the top-K cut.
    pub fn prefilter(mut self, prefilter: bool) -> Self {
        self.prefilter = Some(prefilter);
        self
    }

    /// Select a reranking strategy.
    pub fn rerank(mut self, strategy: RerankStrategy) -> Self {
        self.reranker = Some(strategy);
        self
    }

    /// Text handed to the reranker in place of the search text.
    pub fn rerank_query(mut self, text: impl Into<String>) -> Self {
        self.rerank_query = Some(text.into());
        self
    }

    /// IVF partitions to probe.
    pub fn nprobes(mut self, nprobes: usize) -> Self {
        self.nprobes = Some(nprobes);
        self
    }

    /// Refine factor for the vector path.
    pub fn refine_factor(mut self, factor: u32) -> Self {
        self.refine_factor = Some(factor);
        self
    }

    /// Distance metric for the vector path.
    pub fn metric(mut self, metric: DistanceType) -> Self {
        self.metric = Some(metric);
        self
    }

    /// Vector column to search.
    pub fn vector_column(mut self, column: impl Into<String>) -> Self {
        self.vector_column = Some(column.into());
        self
    }

    /// Validate and snapshot the request.
    pub fn build(&self) -> Result<SearchRequest> {
        let config = self.executor.config();

        let limit = self.limit.unwrap_or(config.query.default_limit);
        if limit == 0 {
            return Err(Error::validation("limit must be greater than 0"));
        }

        let paths = SearchMode::from_paths(self.vector_query.is_some(), self.text_query.is_some());
        let mode = match paths {
            Some(mode) => mode,
            None if self.reranker.is_some() => {
                return Err(Error::validation("rerank requires a vector or full-text query"));
            }
            None => return Err(Error::validation("no search criteria")),
        };

        if let Some(VectorQuery::Vector(v)) = &self.vector_query {
            if v.is_empty() {
                return Err(Error::validation("query vector must not be empty"));
            }
        }
        if self.select_columns.iter().any(|c| c.trim().is_empty()) {
            return Err(Error::validation("select column names must not be empty"));
        }
        if self.nprobes == Some(0) {
            return Err(Error::validation("nprobes must be greater than 0"));
        }
        if self.refine_factor == Some(0) {
            return Err(Error::validation("refine_factor must be greater than 0"));
        }
        if let Some(strategy) = &self.reranker {
            let reranker = strategy.instantiate(&config.rerank)?;
            if !reranker.capabilities().supports(mode) {
                return Err(crate::rerank::unsupported(reranker.name(), mode));
            }
        }

        Ok(SearchRequest {
            vector_query: self.vector_query.clone(),
            text_query: self.text_query.clone(),
            filter: self.filter.clone(),
            limit,
            offset: self.offset,
            select_columns: self.select_columns.clone(),
            prefilter: self.prefilter.unwrap_or(config.query.prefilter),
            nprobes: self.nprobes.or(config.query.nprobes),
            refine_factor: self.refine_factor,
            metric: self.metric.unwrap_or_default(),
            vector_column: self
                .vector_column
                .clone()
                .unwrap_or_else(|| config.query.vector_column.clone()),
            rerank_query: self.rerank_query.clone(),
            reranker: self.reranker.clone(),
            mode,
        })
    }

    /// Validate and run the query.
    ///
    /// The returned stream is lazy: nothing reaches the engine until it is
    /// first polled. Calling `execute` again runs a fresh query.
    pub fn execute(&self) -> Result<RankedRowStream> {
        let request = self.build()?;
        Ok(self.executor.execute(request))
    }
}

// ============================================================================
// Tests
// ============================================================================
