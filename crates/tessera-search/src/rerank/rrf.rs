//! Reciprocal Rank Fusion.
//!
//! RRF score for row `d`: `score(d) = Σ 1/(k + rank_i(d))`
//!
//! Where `rank_i(d)` is the 1-based rank of `d` in result list `i`, and `k`
//! is a constant (default 60) that controls how much weight is given to
//! lower-ranked items. Ties go to the better vector rank, then the better
//! FTS rank, then whichever row was seen first.

use std::cmp::Ordering;
use tessera_core::{Error, Result};

use super::{Candidate, Capabilities, RerankContext, Reranker, merge_candidates};
use crate::types::{RawResult, Row};

/// Default RRF constant.
pub const DEFAULT_K: u32 = 60;

/// Rank-based fusion that ignores the raw native scores.
#[derive(Debug, Clone, Copy)]
pub struct RrfReranker {
    k: u32,
}

impl RrfReranker {
    /// Create a reranker with constant `k`; zero is rejected.
    pub fn new(k: u32) -> Result<Self> {
        if k == 0 {
            return Err(Error::validation("RRF k must be greater than 0"));
        }
        Ok(Self { k })
    }

    /// The fusion constant.
    pub fn k(&self) -> u32 {
        self.k
    }

    fn contribution(&self, rank: Option<usize>) -> f64 {
        rank.map_or(0.0, |r| 1.0 / (self.k as f64 + r as f64))
    }

    fn fuse(
        &self,
        ctx: &RerankContext<'_>,
        vector: Vec<RawResult>,
        fts: Vec<RawResult>,
    ) -> Vec<Row> {
        let mut scored: Vec<(f64, Candidate)> = merge_candidates(ctx.identity, vector, fts)
            .into_iter()
            .map(|c| (self.contribution(c.vector_rank) + self.contribution(c.fts_rank), c))
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| rank_key(a.vector_rank).cmp(&rank_key(b.vector_rank)))
                .then_with(|| rank_key(a.fts_rank).cmp(&rank_key(b.fts_rank)))
                .then_with(|| a.order.cmp(&b.order))
        });

        scored
            .into_iter()
            .map(|(score, c)| c.into_row(score as f32))
            .collect()
    }
}

impl Default for RrfReranker {
    fn default() -> Self {
        Self { k: DEFAULT_K }
    }
}

fn rank_key(rank: Option<usize>) -> usize {
    rank.unwrap_or(usize::MAX)
}

impl Reranker for RrfReranker {
    fn name(&self) -> &str {
        "rrf"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn rerank_vector(&self, ctx: &RerankContext<'_>, results: Vec<RawResult>) -> Result<Vec<Row>> {
        Ok(self.fuse(ctx, results, Vec::new()))
    }

    fn rerank_fts(&self, ctx: &RerankContext<'_>, results: Vec<RawResult>) -> Result<Vec<Row>> {
        Ok(self.fuse(ctx, Vec::new(), results))
    }

    fn rerank_hybrid(
        &self,
        ctx: &RerankContext<'_>,
        vector: Vec<RawResult>,
        fts: Vec<RawResult>,
    ) -> Result<Vec<Row>> {
        Ok(self.fuse(ctx, vector, fts))
    }
}

// ============================================================================
// Tests
// ============================================================================
