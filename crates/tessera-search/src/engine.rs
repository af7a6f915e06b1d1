//! Native search engine abstraction and the in-memory engine.
//!
//! The executor never scans data itself. It issues one
//! [`VectorSearchRequest`] and/or one [`FtsSearchRequest`] per query to a
//! [`SearchEngine`] and post-processes whatever comes back.
//!
//! # Backends
//!
//! - [`MemoryEngine`]: brute-force search over a `Vec<Row>`, always available
//! - `LancedbEngine`: LanceDB tables (requires `engine-lancedb` feature)

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Mutex;
use tessera_core::{Error, Result};

use crate::filter::Predicate;
use crate::index::{IndexCatalog, IndexInfo, IndexSpec};
use crate::types::{DistanceType, RawResult, Row};

/// A nearest-neighbor request for one vector column.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearchRequest {
    /// Query vector.
    pub vector: Vec<f32>,
    /// Column holding the stored vectors.
    pub column: String,
    /// Opaque filter predicate.
    pub filter: Option<String>,
    /// Apply the filter before (true) or after (false) the top-K cut.
    pub prefilter: bool,
    /// IVF partitions to probe.
    pub nprobes: Option<usize>,
    /// Re-rank `refine_factor * top_k` candidates with exact distances.
    pub refine_factor: Option<u32>,
    /// Distance metric.
    pub metric: DistanceType,
    /// Number of candidates to return.
    pub top_k: usize,
}

/// A keyword request against the full-text index.
#[derive(Debug, Clone, PartialEq)]
pub struct FtsSearchRequest {
    /// Query text.
    pub text: String,
    /// Opaque filter predicate.
    pub filter: Option<String>,
    /// Apply the filter before (true) or after (false) the top-K cut.
    pub prefilter: bool,
    /// Number of candidates to return.
    pub top_k: usize,
}

/// The native search collaborator.
///
/// Vector results carry [`NativeScore::Distance`](crate::types::NativeScore),
/// full-text results carry [`NativeScore::Score`](crate::types::NativeScore).
/// Each call returns at most `top_k` rows, best first.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Nearest-neighbor search.
    async fn vector_search(&self, request: VectorSearchRequest) -> Result<Vec<RawResult>>;

    /// Keyword search.
    async fn full_text_search(&self, request: FtsSearchRequest) -> Result<Vec<RawResult>>;

    /// Engine name for diagnostics.
    fn name(&self) -> &str;
}

// ============================================================================
// In-memory engine
// ============================================================================

/// Brute-force engine over rows held in memory.
///
/// Vectors are read from the request's column as JSON number arrays. The
/// full-text score is the number of query-term occurrences across the text
/// columns; rows scoring zero are not returned.
#[derive(Debug)]
pub struct MemoryEngine {
    rows: Vec<Row>,
    text_columns: Vec<String>,
    indices: Mutex<Vec<IndexInfo>>,
}

impl MemoryEngine {
    /// Create an engine over `rows`, searching the `text` column for keywords.
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            text_columns: vec!["text".to_string()],
            indices: Mutex::new(Vec::new()),
        }
    }

    /// Replace the columns searched by full-text queries.
    pub fn with_text_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.text_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the engine holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn fts_score(&self, row: &Row, terms: &[String]) -> f32 {
        let mut score = 0usize;
        for column in &self.text_columns {
            if let Some(Value::String(text)) = row.get(column) {
                for token in tokenize(text) {
                    score += terms.iter().filter(|t| **t == token).count();
                }
            }
        }
        score as f32
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn parse_filter(filter: Option<&str>) -> Result<Option<Predicate>> {
    filter.map(Predicate::parse).transpose()
}

fn read_vector(row: &Row, column: &str) -> Result<Option<Vec<f32>>> {
    let Some(value) = row.get(column) else {
        return Ok(None);
    };
    let items = value
        .as_array()
        .ok_or_else(|| Error::schema(format!("column '{column}' is not a vector")))?;
    items
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                Error::schema(format!("column '{column}' holds a non-numeric element"))
            })
        })
        .collect::<Result<Vec<f32>>>()
        .map(Some)
}

// Applies the filter before or after the top-K cut. A postfilter may leave
// fewer than `top_k` rows; nothing is backfilled.
fn select_top_k<F>(
    mut scored: Vec<(f32, &Row)>,
    predicate: Option<&Predicate>,
    prefilter: bool,
    top_k: usize,
    better: F,
) -> Vec<(f32, Row)>
where
    F: Fn(f32, f32) -> std::cmp::Ordering,
{
    let keep = |row: &Row| predicate.is_none_or(|p| p.matches(row));
    if prefilter {
        scored.retain(|(_, row)| keep(row));
    }
    scored.sort_by(|a, b| better(a.0, b.0));
    scored.truncate(top_k);
    if !prefilter {
        scored.retain(|(_, row)| keep(row));
    }
    scored.into_iter().map(|(s, row)| (s, row.clone())).collect()
}

#[async_trait]
impl SearchEngine for MemoryEngine {
    async fn vector_search(&self, request: VectorSearchRequest) -> Result<Vec<RawResult>> {
        let predicate = parse_filter(request.filter.as_deref())?;

        let mut scored = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let Some(stored) = read_vector(row, &request.column)? else {
                continue;
            };
            if stored.len() != request.vector.len() {
                return Err(Error::schema(format!(
                    "query vector has dimension {}, column '{}' has {}",
                    request.vector.len(),
                    request.column,
                    stored.len()
                )));
            }
            scored.push((request.metric.distance(&request.vector, &stored), row));
        }

        let hits = select_top_k(
            scored,
            predicate.as_ref(),
            request.prefilter,
            request.top_k,
            |a, b| a.total_cmp(&b),
        );
        log::trace!("memory vector search returned {} rows", hits.len());
        Ok(hits
            .into_iter()
            .map(|(d, row)| RawResult::with_distance(row, d))
            .collect())
    }

    async fn full_text_search(&self, request: FtsSearchRequest) -> Result<Vec<RawResult>> {
        let predicate = parse_filter(request.filter.as_deref())?;
        let terms: Vec<String> = tokenize(&request.text)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let scored: Vec<(f32, &Row)> = self
            .rows
            .iter()
            .map(|row| (self.fts_score(row, &terms), row))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        let hits = select_top_k(
            scored,
            predicate.as_ref(),
            request.prefilter,
            request.top_k,
            |a, b| b.total_cmp(&a),
        );
        log::trace!("memory full-text search returned {} rows", hits.len());
        Ok(hits
            .into_iter()
            .map(|(s, row)| RawResult::with_score(row, s))
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl IndexCatalog for MemoryEngine {
    async fn list_indices(&self) -> Result<Vec<IndexInfo>> {
        Ok(self.indices.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn build_index(&self, spec: &IndexSpec) -> Result<()> {
        let mut indices = self.indices.lock().unwrap_or_else(|e| e.into_inner());
        indices.retain(|info| info.name != spec.name);
        indices.push(IndexInfo::from(spec));
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NativeScore;
    use serde_json::json;

    fn row(value: Value) -> Row {
        serde_json::from_value(value).unwrap()
    }

    fn engine() -> MemoryEngine {
        MemoryEngine::new(vec![
            row(json!({"id": 1, "text": "red apple pie", "vector": [1.0, 0.0]})),
            row(json!({"id": 2, "text": "green apple", "vector": [0.0, 1.0]})),
            row(json!({"id": 3, "text": "banana bread", "vector": [0.9, 0.1]})),
        ])
    }

    fn vector_request(vector: Vec<f32>, top_k: usize) -> VectorSearchRequest {
        VectorSearchRequest {
            vector,
            column: "vector".to_string(),
            filter: None,
            prefilter: true,
            nprobes: None,
            refine_factor: None,
            metric: DistanceType::L2,
            top_k,
        }
    }

    fn ids(results: &[RawResult]) -> Vec<i64> {
        results.iter().map(|r| r.row["id"].as_i64().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_vector_search_orders_by_distance() {
        let results = engine().vector_search(vector_request(vec![1.0, 0.0], 10)).await.unwrap();
        assert_eq!(ids(&results), vec![1, 3, 2]);
        assert_eq!(results[0].score, NativeScore::Distance(0.0));
    }

    #[tokio::test]
    async fn test_vector_search_top_k() {
        let results = engine().vector_search(vector_request(vec![1.0, 0.0], 1)).await.unwrap();
        assert_eq!(ids(&results), vec![1]);
    }

    #[tokio::test]
    async fn test_prefilter_vs_postfilter() {
        let mut request = vector_request(vec![1.0, 0.0], 1);
        request.filter = Some("id = 2".to_string());

        let pre = engine().vector_search(request.clone()).await.unwrap();
        assert_eq!(ids(&pre), vec![2]);

        request.prefilter = false;
        let post = engine().vector_search(request).await.unwrap();
        assert!(post.is_empty());
    }

    #[tokio::test]
    async fn test_vector_dimension_mismatch() {
        let err = engine()
            .vector_search(vector_request(vec![1.0, 0.0, 0.0], 3))
            .await
            .unwrap_err();
        assert!(err.is_schema());
    }

    #[tokio::test]
    async fn test_bad_filter_is_validation_error() {
        let mut request = vector_request(vec![1.0, 0.0], 3);
        request.filter = Some("id ~ 1".to_string());
        assert!(engine().vector_search(request).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_full_text_search_scores_terms() {
        let results = engine()
            .full_text_search(FtsSearchRequest {
                text: "Apple pie".to_string(),
                filter: None,
                prefilter: true,
                top_k: 10,
            })
            .await
            .unwrap();
        assert_eq!(ids(&results), vec![1, 2]);
        assert_eq!(results[0].score, NativeScore::Score(2.0));
        assert_eq!(results[1].score, NativeScore::Score(1.0));
    }

    #[tokio::test]
    async fn test_full_text_search_empty_query() {
        let results = engine()
            .full_text_search(FtsSearchRequest {
                text: "  ".to_string(),
                filter: None,
                prefilter: true,
                top_k: 10,
            })
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_custom_text_columns() {
        let engine = MemoryEngine::new(vec![row(json!({"id": 1, "title": "apple"}))])
            .with_text_columns(["title"]);
        let results = engine
            .full_text_search(FtsSearchRequest {
                text: "apple".to_string(),
                filter: None,
                prefilter: true,
                top_k: 10,
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }
}
