//! Result reranking.
//!
//! A [`Reranker`] turns the raw results of one or both search paths into
//! rows carrying a `_relevance_score` column. Strategies are chosen when the
//! query is built, via [`RerankStrategy`], and declare up front which search
//! modes they can handle through [`Capabilities`].
//!
//! # Strategies
//!
//! | Strategy | Vector | FTS | Hybrid |
//! |----------|--------|-----|--------|
//! | [`RrfReranker`] | yes | yes | yes |
//! | [`LinearCombinationReranker`] | no | no | yes |
//! | [`PassThroughReranker`] | yes | yes | yes |
//! | `Custom` | declared | declared | declared |

mod linear;
mod rrf;

pub use linear::{LinearCombinationReranker, Normalization};
pub use rrf::RrfReranker;

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tessera_core::{Error, RerankConfig, Result};

use crate::types::{DISTANCE_COLUMN, RELEVANCE_COLUMN, RawResult, Row, RowIdentity, SCORE_COLUMN};

/// Which search paths a query runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchMode {
    /// Vector search only.
    VectorOnly,
    /// Full-text search only.
    TextOnly,
    /// Both paths, merged.
    Hybrid,
}

impl SearchMode {
    /// Mode for the given combination of active paths, if any.
    pub fn from_paths(vector: bool, text: bool) -> Option<Self> {
        match (vector, text) {
            (true, true) => Some(Self::Hybrid),
            (true, false) => Some(Self::VectorOnly),
            (false, true) => Some(Self::TextOnly),
            (false, false) => None,
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::VectorOnly => "vector",
            Self::TextOnly => "fts",
            Self::Hybrid => "hybrid",
        })
    }
}

/// The rerank operations a strategy implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub vector: bool,
    pub fts: bool,
    pub hybrid: bool,
}

impl Capabilities {
    /// Every mode.
    pub const ALL: Self = Self {
        vector: true,
        fts: true,
        hybrid: true,
    };

    /// Hybrid merging only.
    pub const HYBRID_ONLY: Self = Self {
        vector: false,
        fts: false,
        hybrid: true,
    };

    /// Whether `mode` is covered.
    pub fn supports(&self, mode: SearchMode) -> bool {
        match mode {
            SearchMode::VectorOnly => self.vector,
            SearchMode::TextOnly => self.fts,
            SearchMode::Hybrid => self.hybrid,
        }
    }
}

/// What a reranker knows about the query besides the results.
#[derive(Debug, Clone, Copy)]
pub struct RerankContext<'a> {
    /// Query text, when there is one.
    pub query: Option<&'a str>,
    /// How rows from the two paths are matched up.
    pub identity: &'a RowIdentity,
}

/// A result reranking strategy.
///
/// Every returned row must carry a finite numeric `_relevance_score`, and a
/// reranker may not return more rows than the distinct rows it was given.
/// The executor checks both and fails the query otherwise.
///
/// Reranking runs synchronously once the search results are in.
pub trait Reranker: Send + Sync {
    /// Strategy name for diagnostics.
    fn name(&self) -> &str;

    /// Modes this strategy implements.
    fn capabilities(&self) -> Capabilities;

    /// Rerank vector-only results.
    fn rerank_vector(&self, ctx: &RerankContext<'_>, results: Vec<RawResult>) -> Result<Vec<Row>> {
        let _ = (ctx, results);
        Err(unsupported(self.name(), SearchMode::VectorOnly))
    }

    /// Rerank full-text-only results.
    fn rerank_fts(&self, ctx: &RerankContext<'_>, results: Vec<RawResult>) -> Result<Vec<Row>> {
        let _ = (ctx, results);
        Err(unsupported(self.name(), SearchMode::TextOnly))
    }

    /// Merge and rerank the results of both paths.
    fn rerank_hybrid(
        &self,
        ctx: &RerankContext<'_>,
        vector: Vec<RawResult>,
        fts: Vec<RawResult>,
    ) -> Result<Vec<Row>>;
}

pub(crate) fn unsupported(name: &str, mode: SearchMode) -> Error {
    Error::validation(format!("reranker '{name}' does not support {mode} search"))
}

// ============================================================================
// Strategy selection
// ============================================================================

/// Reranking strategy selected on the query builder.
///
/// Unset parameters take their values from [`RerankConfig`].
#[derive(Clone)]
pub enum RerankStrategy {
    /// Reciprocal Rank Fusion.
    Rrf { k: Option<u32> },
    /// Weighted blend of normalised distance and FTS score.
    LinearCombination {
        weight: Option<f32>,
        fill: Option<f32>,
        normalization: Normalization,
    },
    /// Relevance straight from the native scores.
    PassThrough,
    /// A caller-supplied reranker.
    Custom(Arc<dyn Reranker>),
}

impl RerankStrategy {
    /// RRF with the configured `k`.
    pub fn rrf() -> Self {
        Self::Rrf { k: None }
    }

    /// RRF with an explicit `k`.
    pub fn rrf_with_k(k: u32) -> Self {
        Self::Rrf { k: Some(k) }
    }

    /// Linear combination with the configured weight and fill.
    pub fn linear() -> Self {
        Self::LinearCombination {
            weight: None,
            fill: None,
            normalization: Normalization::Score,
        }
    }

    /// Linear combination over per-list ranks instead of raw scores.
    pub fn linear_by_rank() -> Self {
        Self::LinearCombination {
            weight: None,
            fill: None,
            normalization: Normalization::Rank,
        }
    }

    /// Wrap a custom reranker.
    pub fn custom(reranker: Arc<dyn Reranker>) -> Self {
        Self::Custom(reranker)
    }

    /// Instantiate the reranker, validating its parameters.
    pub fn instantiate(&self, config: &RerankConfig) -> Result<Arc<dyn Reranker>> {
        Ok(match self {
            Self::Rrf { k } => Arc::new(RrfReranker::new(k.unwrap_or(config.rrf_k))?),
            Self::LinearCombination {
                weight,
                fill,
                normalization,
            } => Arc::new(
                LinearCombinationReranker::new(
                    weight.unwrap_or(config.linear_weight),
                    fill.unwrap_or(config.linear_fill),
                )?
                .with_normalization(*normalization),
            ),
            Self::PassThrough => Arc::new(PassThroughReranker),
            Self::Custom(reranker) => reranker.clone(),
        })
    }
}

impl fmt::Debug for RerankStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rrf { k } => f.debug_struct("Rrf").field("k", k).finish(),
            Self::LinearCombination {
                weight,
                fill,
                normalization,
            } => f
                .debug_struct("LinearCombination")
                .field("weight", weight)
                .field("fill", fill)
                .field("normalization", normalization)
                .finish(),
            Self::PassThrough => f.write_str("PassThrough"),
            Self::Custom(reranker) => f.debug_tuple("Custom").field(&reranker.name()).finish(),
        }
    }
}

// ============================================================================
// Pass-through
// ============================================================================

/// Uses the native scores as relevance: negated distance, or the raw FTS
/// score. Rows sharing an identity collapse to their first occurrence, and
/// in hybrid mode a row found by both paths keeps the larger of its two
/// relevances.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughReranker;

impl PassThroughReranker {
    fn merge(identity: &RowIdentity, vector: Vec<RawResult>, fts: Vec<RawResult>) -> Vec<Row> {
        merge_candidates(identity, vector, fts)
            .into_iter()
            .map(|c| {
                let relevance = match (c.distance, c.score) {
                    (Some(d), Some(s)) => (-d).max(s),
                    (Some(d), None) => -d,
                    (None, Some(s)) => s,
                    (None, None) => 0.0,
                };
                c.into_row(relevance)
            })
            .collect()
    }
}

impl Reranker for PassThroughReranker {
    fn name(&self) -> &str {
        "pass_through"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn rerank_vector(&self, ctx: &RerankContext<'_>, results: Vec<RawResult>) -> Result<Vec<Row>> {
        Ok(Self::merge(ctx.identity, results, Vec::new()))
    }

    fn rerank_fts(&self, ctx: &RerankContext<'_>, results: Vec<RawResult>) -> Result<Vec<Row>> {
        Ok(Self::merge(ctx.identity, Vec::new(), results))
    }

    fn rerank_hybrid(
        &self,
        ctx: &RerankContext<'_>,
        vector: Vec<RawResult>,
        fts: Vec<RawResult>,
    ) -> Result<Vec<Row>> {
        Ok(Self::merge(ctx.identity, vector, fts))
    }
}

// ============================================================================
// Shared merging
// ============================================================================

/// One distinct row across both result lists.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub row: Row,
    /// 1-based rank in the vector list.
    pub vector_rank: Option<usize>,
    /// 1-based rank in the FTS list.
    pub fts_rank: Option<usize>,
    pub distance: Option<f32>,
    pub score: Option<f32>,
    /// First-seen position across both lists.
    pub order: usize,
}

impl Candidate {
    /// The row with native score columns and `_relevance_score` attached.
    pub fn into_row(self, relevance: f32) -> Row {
        let mut row = self.row;
        if let Some(d) = self.distance {
            row.insert(DISTANCE_COLUMN.to_string(), Value::from(d));
        }
        if let Some(s) = self.score {
            row.insert(SCORE_COLUMN.to_string(), Value::from(s));
        }
        with_relevance(row, relevance)
    }
}

/// Group both lists by row identity, vector list first.
///
/// A row repeated within one list keeps only its best (first) rank there.
pub(crate) fn merge_candidates(
    identity: &RowIdentity,
    vector: Vec<RawResult>,
    fts: Vec<RawResult>,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = Vec::with_capacity(vector.len() + fts.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    let lists = [(true, vector), (false, fts)];
    for (is_vector, list) in lists {
        for (i, RawResult { row, score }) in list.into_iter().enumerate() {
            let rank = i + 1;
            let key = identity.key(&row);
            let slot = match positions.get(&key) {
                Some(&slot) => slot,
                None => {
                    let slot = candidates.len();
                    positions.insert(key, slot);
                    candidates.push(Candidate {
                        row,
                        vector_rank: None,
                        fts_rank: None,
                        distance: None,
                        score: None,
                        order: slot,
                    });
                    slot
                }
            };
            let candidate = &mut candidates[slot];
            if is_vector && candidate.vector_rank.is_none() {
                candidate.vector_rank = Some(rank);
                candidate.distance = Some(score.value());
            } else if !is_vector && candidate.fts_rank.is_none() {
                candidate.fts_rank = Some(rank);
                candidate.score = Some(score.value());
            }
        }
    }
    candidates
}

/// Number of distinct rows across both lists.
pub(crate) fn distinct_count(
    identity: &RowIdentity,
    vector: &[RawResult],
    fts: &[RawResult],
) -> usize {
    vector
        .iter()
        .chain(fts)
        .map(|r| identity.key(&r.row))
        .collect::<std::collections::HashSet<_>>()
        .len()
}

fn with_relevance(mut row: Row, relevance: f32) -> Row {
    row.insert(RELEVANCE_COLUMN.to_string(), Value::from(relevance));
    row
}

// ============================================================================
// Tests
// ============================================================================
