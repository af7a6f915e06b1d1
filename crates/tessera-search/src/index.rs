//! Index configuration builders.
//!
//! Assembles and validates [`IndexSpec`]s for the native index-build
//! collaborator ([`IndexCatalog`]). Nothing here trains or persists an
//! index; the `IndexSpec` is handed over as-is.
//!
//! # Kinds
//!
//! | Builder | Kind | Notes |
//! |---------|------|-------|
//! | [`IndexSpec::ann`] | IVF_PQ / IVF_HNSW_PQ / IVF_HNSW_SQ | vector columns |
//! | [`IndexSpec::btree`] | BTREE | general scalar columns |
//! | [`IndexSpec::bitmap`] | BITMAP | low-cardinality columns |
//! | [`IndexSpec::label_list`] | LABEL_LIST | list columns, "contains any/all" |
//! | [`IndexSpec::fts`] | FTS | tokenized text columns |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_core::{Error, Result};

use crate::types::DistanceType;

// ============================================================================
// Spec types
// ============================================================================

/// ANN index algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnAlgorithm {
    /// IVF partitions with product quantization.
    #[default]
    IvfPq,
    /// IVF partitions with HNSW graphs over PQ codes.
    IvfHnswPq,
    /// IVF partitions with HNSW graphs over scalar-quantized vectors.
    IvfHnswSq,
}

/// ANN index parameters. `None` leaves the choice to the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnParams {
    /// Index algorithm.
    pub algorithm: AnnAlgorithm,
    /// Distance metric.
    pub metric: DistanceType,
    /// Number of IVF partitions.
    pub num_partitions: Option<u32>,
    /// Number of PQ sub-vectors.
    pub num_sub_vectors: Option<u32>,
    /// Bits per PQ code (4 or 8); IVF_PQ only.
    pub num_bits: Option<u32>,
    /// k-means iterations.
    pub max_iterations: Option<u32>,
    /// Training sample rate.
    pub sample_rate: Option<u32>,
    /// HNSW edges per node.
    pub m: Option<u32>,
    /// HNSW construction beam width.
    pub ef_construction: Option<u32>,
}

/// Full-text index tokenizer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FtsParams {
    /// Store token positions (needed for phrase queries).
    pub with_position: bool,
    /// Base tokenizer: "simple", "whitespace" or "raw".
    pub base_tokenizer: String,
    /// Stemming / stop-word language.
    pub language: String,
    /// Drop tokens longer than this.
    pub max_token_length: Option<usize>,
    /// Lower-case tokens.
    pub lower_case: bool,
    /// Apply stemming.
    pub stem: bool,
    /// Remove stop words.
    pub remove_stop_words: bool,
    /// Fold non-ASCII characters.
    pub ascii_folding: bool,
}

impl Default for FtsParams {
    fn default() -> Self {
        Self {
            with_position: true,
            base_tokenizer: "simple".to_string(),
            language: "English".to_string(),
            max_token_length: Some(40),
            lower_case: true,
            stem: false,
            remove_stop_words: false,
            ascii_folding: false,
        }
    }
}

/// The kind of index and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum IndexKind {
    /// Approximate nearest-neighbor vector index.
    Ann(AnnParams),
    /// B-tree scalar index.
    BTree,
    /// Bitmap scalar index.
    Bitmap,
    /// Label-list index over list-valued columns.
    LabelList,
    /// Full-text index.
    Fts(FtsParams),
}

impl IndexKind {
    /// Upper-case type label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ann(p) => match p.algorithm {
                AnnAlgorithm::IvfPq => "IVF_PQ",
                AnnAlgorithm::IvfHnswPq => "IVF_HNSW_PQ",
                AnnAlgorithm::IvfHnswSq => "IVF_HNSW_SQ",
            },
            Self::BTree => "BTREE",
            Self::Bitmap => "BITMAP",
            Self::LabelList => "LABEL_LIST",
            Self::Fts(_) => "FTS",
        }
    }
}

/// A validated index-creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Indexed columns; exactly one except for FTS.
    pub columns: Vec<String>,
    /// Kind and parameters.
    pub kind: IndexKind,
    /// Index name.
    pub name: String,
    /// Drop and rebuild an existing index of the same name.
    pub replace: bool,
}

impl IndexSpec {
    /// Start an ANN index on `column`.
    pub fn ann(column: impl Into<String>) -> AnnIndexBuilder {
        AnnIndexBuilder {
            common: Common::new(vec![column.into()]),
            params: AnnParams::default(),
        }
    }

    /// Start a BTREE index on `column`.
    pub fn btree(column: impl Into<String>) -> ScalarIndexBuilder {
        ScalarIndexBuilder::new(column.into(), IndexKind::BTree)
    }

    /// Start a BITMAP index on `column`.
    pub fn bitmap(column: impl Into<String>) -> ScalarIndexBuilder {
        ScalarIndexBuilder::new(column.into(), IndexKind::Bitmap)
    }

    /// Start a LABEL_LIST index on `column`.
    pub fn label_list(column: impl Into<String>) -> ScalarIndexBuilder {
        ScalarIndexBuilder::new(column.into(), IndexKind::LabelList)
    }

    /// Start a full-text index over `columns`.
    pub fn fts<I, S>(columns: I) -> FtsIndexBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FtsIndexBuilder {
            common: Common::new(columns.into_iter().map(Into::into).collect()),
            params: FtsParams::default(),
        }
    }
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Index({}, columns={:?}, name=\"{}\")",
            self.kind.label(),
            self.columns,
            self.name
        )
    }
}

// ============================================================================
// Builders
// ============================================================================

#[derive(Debug, Clone)]
struct Common {
    columns: Vec<String>,
    name: Option<String>,
    replace: bool,
}

impl Common {
    fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            name: None,
            replace: false,
        }
    }

    fn finish(self, kind: IndexKind) -> Result<IndexSpec> {
        if self.columns.is_empty() {
            return Err(Error::validation("index requires at least one column"));
        }
        if self.columns.iter().any(|c| c.trim().is_empty()) {
            return Err(Error::validation("index column names must not be empty"));
        }
        if !matches!(kind, IndexKind::Fts(_)) && self.columns.len() != 1 {
            return Err(Error::validation(format!(
                "{} index takes exactly one column, got {}",
                kind.label(),
                self.columns.len()
            )));
        }
        let name = match self.name {
            Some(name) if name.trim().is_empty() => {
                return Err(Error::validation("index name must not be empty"));
            }
            Some(name) => name,
            None => format!("{}_idx", self.columns.join("_")),
        };
        Ok(IndexSpec {
            columns: self.columns,
            kind,
            name,
            replace: self.replace,
        })
    }
}

macro_rules! common_setters {
    () => {
        /// Set the index name (default `<column>_idx`).
        pub fn name(mut self, name: impl Into<String>) -> Self {
            self.common.name = Some(name.into());
            self
        }

        /// Drop and rebuild an existing index of the same name.
        pub fn replace(mut self, replace: bool) -> Self {
            self.common.replace = replace;
            self
        }
    };
}

/// Builder for ANN indices.
#[derive(Debug, Clone)]
pub struct AnnIndexBuilder {
    common: Common,
    params: AnnParams,
}

impl AnnIndexBuilder {
    common_setters!();

    /// Choose the ANN algorithm (default IVF_PQ).
    pub fn algorithm(mut self, algorithm: AnnAlgorithm) -> Self {
        self.params.algorithm = algorithm;
        self
    }

    /// Distance metric (default L2).
    pub fn metric(mut self, metric: DistanceType) -> Self {
        self.params.metric = metric;
        self
    }

    /// Number of IVF partitions.
    pub fn num_partitions(mut self, n: u32) -> Self {
        self.params.num_partitions = Some(n);
        self
    }

    /// Number of PQ sub-vectors.
    pub fn num_sub_vectors(mut self, n: u32) -> Self {
        self.params.num_sub_vectors = Some(n);
        self
    }

    /// Bits per PQ code; IVF_PQ only.
    pub fn num_bits(mut self, n: u32) -> Self {
        self.params.num_bits = Some(n);
        self
    }

    /// k-means iterations.
    pub fn max_iterations(mut self, n: u32) -> Self {
        self.params.max_iterations = Some(n);
        self
    }

    /// Training sample rate.
    pub fn sample_rate(mut self, n: u32) -> Self {
        self.params.sample_rate = Some(n);
        self
    }

    /// HNSW edges per node.
    pub fn m(mut self, n: u32) -> Self {
        self.params.m = Some(n);
        self
    }

    /// HNSW construction beam width.
    pub fn ef_construction(mut self, n: u32) -> Self {
        self.params.ef_construction = Some(n);
        self
    }

    /// Validate and produce the spec.
    pub fn build(self) -> Result<IndexSpec> {
        let p = &self.params;
        for (label, value) in [
            ("num_partitions", p.num_partitions),
            ("num_sub_vectors", p.num_sub_vectors),
            ("max_iterations", p.max_iterations),
            ("sample_rate", p.sample_rate),
            ("m", p.m),
            ("ef_construction", p.ef_construction),
        ] {
            if value == Some(0) {
                return Err(Error::validation(format!("{label} must be greater than 0")));
            }
        }
        if let Some(bits) = p.num_bits {
            if bits != 4 && bits != 8 {
                return Err(Error::validation(format!("num_bits must be 4 or 8, got {bits}")));
            }
        }
        match p.algorithm {
            AnnAlgorithm::IvfPq if p.m.is_some() || p.ef_construction.is_some() => {
                return Err(Error::validation(
                    "m and ef_construction apply only to HNSW indices",
                ));
            }
            AnnAlgorithm::IvfHnswPq if p.num_bits.is_some() => {
                return Err(Error::validation("num_bits applies only to IVF_PQ indices"));
            }
            AnnAlgorithm::IvfHnswSq if p.num_sub_vectors.is_some() || p.num_bits.is_some() => {
                return Err(Error::validation(
                    "num_sub_vectors and num_bits do not apply to IVF_HNSW_SQ",
                ));
            }
            _ => {}
        }
        self.common.finish(IndexKind::Ann(self.params))
    }
}

/// Builder for BTREE, BITMAP and LABEL_LIST indices.
#[derive(Debug, Clone)]
pub struct ScalarIndexBuilder {
    common: Common,
    kind: IndexKind,
}

impl ScalarIndexBuilder {
    fn new(column: String, kind: IndexKind) -> Self {
        Self {
            common: Common::new(vec![column]),
            kind,
        }
    }

    common_setters!();

    /// Validate and produce the spec.
    pub fn build(self) -> Result<IndexSpec> {
        self.common.finish(self.kind)
    }
}

/// Builder for full-text indices.
#[derive(Debug, Clone)]
pub struct FtsIndexBuilder {
    common: Common,
    params: FtsParams,
}

impl FtsIndexBuilder {
    common_setters!();

    /// Store token positions.
    pub fn with_position(mut self, enabled: bool) -> Self {
        self.params.with_position = enabled;
        self
    }

    /// Base tokenizer name.
    pub fn base_tokenizer(mut self, tokenizer: impl Into<String>) -> Self {
        self.params.base_tokenizer = tokenizer.into();
        self
    }

    /// Tokenizer language.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.params.language = language.into();
        self
    }

    /// Maximum token length; `None` keeps every token.
    pub fn max_token_length(mut self, len: Option<usize>) -> Self {
        self.params.max_token_length = len;
        self
    }

    /// Lower-case tokens.
    pub fn lower_case(mut self, enabled: bool) -> Self {
        self.params.lower_case = enabled;
        self
    }

    /// Apply stemming.
    pub fn stem(mut self, enabled: bool) -> Self {
        self.params.stem = enabled;
        self
    }

    /// Remove stop words.
    pub fn remove_stop_words(mut self, enabled: bool) -> Self {
        self.params.remove_stop_words = enabled;
        self
    }

    /// Fold to ASCII.
    pub fn ascii_folding(mut self, enabled: bool) -> Self {
        self.params.ascii_folding = enabled;
        self
    }

    /// Validate and produce the spec.
    pub fn build(self) -> Result<IndexSpec> {
        if !matches!(
            self.params.base_tokenizer.as_str(),
            "simple" | "whitespace" | "raw"
        ) {
            return Err(Error::validation(format!(
                "unknown base tokenizer '{}'",
                self.params.base_tokenizer
            )));
        }
        if self.params.max_token_length == Some(0) {
            return Err(Error::validation("max_token_length must be greater than 0"));
        }
        self.common.finish(IndexKind::Fts(self.params))
    }
}

// ============================================================================
// Collaborator
// ============================================================================

/// An index currently configured on a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Type label (e.g. "IVF_PQ", "FTS").
    pub index_type: String,
    /// Indexed columns.
    pub columns: Vec<String>,
}

impl From<&IndexSpec> for IndexInfo {
    fn from(spec: &IndexSpec) -> Self {
        Self {
            name: spec.name.clone(),
            index_type: spec.kind.label().to_string(),
            columns: spec.columns.clone(),
        }
    }
}

/// The native index-build collaborator.
#[async_trait]
pub trait IndexCatalog: Send + Sync {
    /// Indices that currently exist.
    async fn list_indices(&self) -> Result<Vec<IndexInfo>>;

    /// Build (or, with `spec.replace`, rebuild) an index.
    async fn build_index(&self, spec: &IndexSpec) -> Result<()>;
}

/// Check `spec` against existing indices and hand it to `catalog`.
///
/// Fails with a validation error when an index with the same name exists and
/// `spec.replace` is false.
pub async fn create_index(catalog: &dyn IndexCatalog, spec: &IndexSpec) -> Result<()> {
    if !spec.replace {
        let existing = catalog.list_indices().await?;
        if existing.iter().any(|info| info.name == spec.name) {
            return Err(Error::validation(format!("index exists: {}", spec.name)));
        }
    }
    log::debug!("building {spec} (replace={})", spec.replace);
    catalog.build_index(spec).await
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;

    #[test]
    fn test_ann_defaults() {
        let spec = IndexSpec::ann("vector").build().unwrap();
        assert_eq!(spec.columns, vec!["vector"]);
        assert_eq!(spec.name, "vector_idx");
        assert!(!spec.replace);
        match spec.kind {
            IndexKind::Ann(p) => {
                assert_eq!(p.algorithm, AnnAlgorithm::IvfPq);
                assert_eq!(p.metric, DistanceType::L2);
                assert!(p.num_partitions.is_none());
                assert!(p.num_bits.is_none());
            }
            other => panic!("expected ANN, got {other:?}"),
        }
    }

    #[test]
    fn test_ann_full_params() {
        let spec = IndexSpec::ann("vector")
            .metric(DistanceType::Cosine)
            .num_partitions(256)
            .num_sub_vectors(16)
            .num_bits(8)
            .max_iterations(50)
            .sample_rate(256)
            .name("vec_ivfpq")
            .replace(true)
            .build()
            .unwrap();
        assert_eq!(spec.name, "vec_ivfpq");
        assert!(spec.replace);
        assert_eq!(spec.kind.label(), "IVF_PQ");
        let IndexKind::Ann(p) = spec.kind else {
            panic!("expected ANN");
        };
        assert_eq!(p.num_partitions, Some(256));
        assert_eq!(p.num_sub_vectors, Some(16));
        assert_eq!(p.metric, DistanceType::Cosine);
    }

    #[test]
    fn test_ann_rejects_bad_params() {
        assert!(IndexSpec::ann("v").num_partitions(0).build().unwrap_err().is_validation());
        assert!(IndexSpec::ann("v").num_bits(6).build().unwrap_err().is_validation());
        assert!(IndexSpec::ann("v").m(16).build().unwrap_err().is_validation());
        assert!(
            IndexSpec::ann("v")
                .algorithm(AnnAlgorithm::IvfHnswSq)
                .num_sub_vectors(8)
                .build()
                .unwrap_err()
                .is_validation()
        );
    }

    #[test]
    fn test_hnsw_params_accepted() {
        let spec = IndexSpec::ann("v")
            .algorithm(AnnAlgorithm::IvfHnswPq)
            .m(20)
            .ef_construction(300)
            .build()
            .unwrap();
        assert_eq!(spec.kind.label(), "IVF_HNSW_PQ");

        let err = IndexSpec::ann("v")
            .algorithm(AnnAlgorithm::IvfHnswPq)
            .num_bits(8)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("num_bits applies only to IVF_PQ"));
    }

    #[test]
    fn test_scalar_kinds() {
        assert_eq!(IndexSpec::btree("id").build().unwrap().kind, IndexKind::BTree);
        assert_eq!(IndexSpec::bitmap("color").build().unwrap().kind, IndexKind::Bitmap);
        let labels = IndexSpec::label_list("tags").build().unwrap();
        assert_eq!(labels.kind, IndexKind::LabelList);
        assert_eq!(labels.name, "tags_idx");
    }

    #[test]
    fn test_empty_column_rejected() {
        assert!(IndexSpec::btree("").build().unwrap_err().is_validation());
        let none: Vec<String> = vec![];
        assert!(IndexSpec::fts(none).build().unwrap_err().is_validation());
        assert!(IndexSpec::btree("id").name(" ").build().unwrap_err().is_validation());
    }

    #[test]
    fn test_fts_multi_column() {
        let spec = IndexSpec::fts(["title", "body"])
            .with_position(false)
            .stem(true)
            .language("French")
            .build()
            .unwrap();
        assert_eq!(spec.name, "title_body_idx");
        let IndexKind::Fts(p) = &spec.kind else {
            panic!("expected FTS");
        };
        assert!(!p.with_position);
        assert!(p.stem);
        assert_eq!(p.language, "French");
        assert_eq!(
            spec.to_string(),
            "Index(FTS, columns=[\"title\", \"body\"], name=\"title_body_idx\")"
        );
    }

    #[test]
    fn test_fts_rejects_unknown_tokenizer() {
        let err = IndexSpec::fts(["text"]).base_tokenizer("ngram9").build().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_spec_serialization() {
        let spec = IndexSpec::bitmap("category").build().unwrap();
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"type\":\"bitmap\""));
        let parsed: IndexSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, spec);
    }

    #[tokio::test]
    async fn test_create_index_duplicate_without_replace() {
        let engine = MemoryEngine::new(vec![]);
        let spec = IndexSpec::btree("id").build().unwrap();
        create_index(&engine, &spec).await.unwrap();

        let err = create_index(&engine, &spec).await.unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("index exists: id_idx"));
    }

    #[tokio::test]
    async fn test_create_index_replace() {
        let engine = MemoryEngine::new(vec![]);
        let spec = IndexSpec::btree("id").build().unwrap();
        create_index(&engine, &spec).await.unwrap();

        let replacement = IndexSpec::bitmap("id").name("id_idx").replace(true).build().unwrap();
        create_index(&engine, &replacement).await.unwrap();

        let indices = engine.list_indices().await.unwrap();
        assert_eq!(indices.len(), 1);
        assert_eq!(indices[0].index_type, "BITMAP");
    }
}
