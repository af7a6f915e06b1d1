//! Linear combination of normalised vector and full-text scores.
//!
//! Each result list is normalised on its own into a "lower is better" cost
//! in `[0, 1]`, then blended:
//!
//! ```text
//! relevance = 1 - (w * d_cost + (1 - w) * s_cost)
//! ```
//!
//! [`Normalization::Score`] min-max scales the raw distances and scores.
//! [`Normalization::Rank`] first replaces every value with its rank in its
//! own list, so only the ordering of each list matters. A row missing from
//! one list uses `fill` as that side's cost.

use tessera_core::{Error, Result};

use super::{Capabilities, RerankContext, Reranker, merge_candidates};
use crate::types::{RawResult, Row};

/// How native values become costs before blending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Normalization {
    /// Min-max scale the raw distances and scores.
    #[default]
    Score,
    /// Min-max scale each value's rank within its list.
    Rank,
}

/// Weighted score blend; hybrid mode only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearCombinationReranker {
    weight: f32,
    fill: f32,
    normalization: Normalization,
}

impl LinearCombinationReranker {
    /// Create a reranker giving `weight` to the vector side.
    ///
    /// Both `weight` and `fill` must lie in `[0, 1]`.
    pub fn new(weight: f32, fill: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&weight) {
            return Err(Error::validation(format!(
                "linear combination weight must be in [0, 1], got {weight}"
            )));
        }
        if !(0.0..=1.0).contains(&fill) {
            return Err(Error::validation(format!(
                "linear combination fill must be in [0, 1], got {fill}"
            )));
        }
        Ok(Self {
            weight,
            fill,
            normalization: Normalization::Score,
        })
    }

    /// Use `normalization` instead of raw-score scaling.
    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Vector-side weight.
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Cost assumed for a missing side.
    pub fn fill(&self) -> f32 {
        self.fill
    }

    /// How values are normalised.
    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    fn combine(&self, distance_cost: f32, text_cost: f32) -> f32 {
        1.0 - (self.weight * distance_cost + (1.0 - self.weight) * text_cost)
    }
}

impl Default for LinearCombinationReranker {
    fn default() -> Self {
        Self {
            weight: 0.7,
            fill: 1.0,
            normalization: Normalization::Score,
        }
    }
}

/// Maps the values of one result list to costs, 0 being best.
struct CostScale {
    sorted: Vec<f32>,
    lower_is_better: bool,
    normalization: Normalization,
}

impl CostScale {
    fn of(
        values: impl Iterator<Item = f32>,
        lower_is_better: bool,
        normalization: Normalization,
    ) -> Option<Self> {
        let mut sorted: Vec<f32> = values.collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f32::total_cmp);
        Some(Self {
            sorted,
            lower_is_better,
            normalization,
        })
    }

    // Degenerate lists (one value, or all equal) cost 0.
    fn cost(&self, value: f32) -> f32 {
        let n = self.sorted.len();
        match self.normalization {
            Normalization::Score => {
                let (min, max) = (self.sorted[0], self.sorted[n - 1]);
                let range = max - min;
                if range > 0.0 {
                    let scaled = (value - min) / range;
                    if self.lower_is_better { scaled } else { 1.0 - scaled }
                } else {
                    0.0
                }
            }
            Normalization::Rank => {
                // Number of strictly better values; ties share a rank.
                let better = if self.lower_is_better {
                    self.sorted.partition_point(|&x| x < value)
                } else {
                    n - self.sorted.partition_point(|&x| x <= value)
                };
                if n > 1 { better as f32 / (n - 1) as f32 } else { 0.0 }
            }
        }
    }
}

impl Reranker for LinearCombinationReranker {
    fn name(&self) -> &str {
        "linear_combination"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::HYBRID_ONLY
    }

    fn rerank_hybrid(
        &self,
        ctx: &RerankContext<'_>,
        vector: Vec<RawResult>,
        fts: Vec<RawResult>,
    ) -> Result<Vec<Row>> {
        let norm = self.normalization;
        let distances = CostScale::of(vector.iter().map(|r| r.score.value()), true, norm);
        let scores = CostScale::of(fts.iter().map(|r| r.score.value()), false, norm);

        let mut rows: Vec<(f32, Row)> = merge_candidates(ctx.identity, vector, fts)
            .into_iter()
            .map(|c| {
                let distance_cost = match (c.distance, &distances) {
                    (Some(d), Some(scale)) => scale.cost(d),
                    _ => self.fill,
                };
                let text_cost = match (c.score, &scores) {
                    (Some(s), Some(scale)) => scale.cost(s),
                    _ => self.fill,
                };
                let relevance = self.combine(distance_cost, text_cost);
                (relevance, c.into_row(relevance))
            })
            .collect();

        rows.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }
}
