//! Common row and result types.
//!
//! These types flow between the native engine, the rerankers and the
//! executor, and are always available regardless of feature flags.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A result row: column name to value.
///
/// A `BTreeMap` keeps column order stable, which makes full-row identity
/// keys deterministic.
pub type Row = BTreeMap<String, Value>;

/// Column carrying the vector distance of a row (ascending = better).
pub const DISTANCE_COLUMN: &str = "_distance";

/// Column carrying the full-text score of a row (descending = better).
pub const SCORE_COLUMN: &str = "_score";

/// Column carrying the reranker-assigned relevance (descending = better).
pub const RELEVANCE_COLUMN: &str = "_relevance_score";

/// Whether `column` is one of the internal score columns.
pub fn is_internal_column(column: &str) -> bool {
    matches!(column, DISTANCE_COLUMN | SCORE_COLUMN | RELEVANCE_COLUMN)
}

// ============================================================================
// Distance metrics
// ============================================================================

/// Distance metric used for vector search and ANN indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceType {
    /// Euclidean distance.
    #[default]
    L2,
    /// Cosine distance.
    Cosine,
    /// Negative dot product.
    Dot,
}

impl DistanceType {
    /// Lower-case name as understood by the native engine.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L2 => "l2",
            Self::Cosine => "cosine",
            Self::Dot => "dot",
        }
    }

    /// Distance between two vectors of equal length.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            Self::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if na == 0.0 || nb == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (na * nb)
                }
            }
            Self::Dot => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        }
    }
}

// ============================================================================
// Search results
// ============================================================================

/// The score a native search path attaches to a row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum NativeScore {
    /// Vector distance; smaller is better.
    Distance(f32),
    /// Full-text score; larger is better.
    Score(f32),
}

impl NativeScore {
    /// The score mapped onto a "larger is better" axis.
    pub fn relevance(&self) -> f32 {
        match *self {
            Self::Distance(d) => -d,
            Self::Score(s) => s,
        }
    }

    /// The internal column this score is exposed under.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Distance(_) => DISTANCE_COLUMN,
            Self::Score(_) => SCORE_COLUMN,
        }
    }

    /// The raw value.
    pub fn value(&self) -> f32 {
        match *self {
            Self::Distance(v) | Self::Score(v) => v,
        }
    }
}

/// A row as returned by one native search path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    /// Row payload.
    pub row: Row,
    /// Path-native score.
    pub score: NativeScore,
}

impl RawResult {
    /// A vector-search result.
    pub fn with_distance(row: Row, distance: f32) -> Self {
        Self {
            row,
            score: NativeScore::Distance(distance),
        }
    }

    /// A full-text-search result.
    pub fn with_score(row: Row, score: f32) -> Self {
        Self {
            row,
            score: NativeScore::Score(score),
        }
    }

    /// The row with its native score written into `_distance` or `_score`.
    pub fn into_scored_row(self) -> Row {
        let mut row = self.row;
        row.insert(self.score.column().to_string(), Value::from(self.score.value()));
        row
    }
}

/// A final result row with its relevance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRow {
    /// Projected row payload.
    pub row: Row,
    /// Reranker-assigned relevance; larger is better.
    pub relevance_score: f32,
}

impl RankedRow {
    /// Look up a column in the projected payload.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.row.get(column)
    }
}

// ============================================================================
// Row identity
// ============================================================================

/// How rows from different paths are recognised as the same row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RowIdentity {
    /// Equality on the declared primary-key columns.
    PrimaryKey(Vec<String>),
    /// Equality on every non-internal column.
    #[default]
    FullRow,
}

impl RowIdentity {
    /// Identity on the given primary-key columns.
    pub fn primary_key<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::PrimaryKey(columns.into_iter().map(Into::into).collect())
    }

    /// A canonical string key; equal rows produce equal keys.
    ///
    /// A row lacking any primary-key column is identified by its full
    /// contents instead. Such keys never contain every key column, so they
    /// cannot collide with a primary-key identity.
    pub fn key(&self, row: &Row) -> String {
        let view: BTreeMap<&str, &Value> = match self {
            Self::PrimaryKey(columns) if columns.iter().all(|c| row.contains_key(c)) => columns
                .iter()
                .filter_map(|c| row.get_key_value(c))
                .map(|(k, v)| (k.as_str(), v))
                .collect(),
            Self::PrimaryKey(_) | Self::FullRow => row
                .iter()
                .filter(|(k, _)| !is_internal_column(k))
                .map(|(k, v)| (k.as_str(), v))
                .collect(),
        };
        serde_json::to_string(&view).unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
