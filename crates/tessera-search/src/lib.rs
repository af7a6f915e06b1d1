//! Hybrid vector and full-text query pipeline for Tessera.
//!
//! This crate builds search requests, resolves query embeddings through a
//! TTL cache, runs vector and keyword searches against a native engine,
//! fuses and reranks the results, and streams the ranked rows back. It
//! includes LanceDB and fastembed bindings (feature-gated), plus in-memory
//! implementations for testing and small data sets.
//!
//! # Features
//!
//! - `engine-lancedb`: Enable the LanceDB search engine and index catalog
//! - `embed-fastembed`: Enable local embedding generation via fastembed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     tessera-search                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  QueryBuilder ──build()──► SearchRequest                    │
//! │        │                                                    │
//! │        └─execute()──► HybridExecutor ──► RankedRowStream    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EmbeddingResolver (TtlCache + EmbeddingRegistry)           │
//! │  ├── MockEmbeddingFunction (always available)               │
//! │  └── FastEmbedFunction (feature: embed-fastembed)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SearchEngine + IndexCatalog traits                         │
//! │  ├── MemoryEngine (always available)                        │
//! │  └── LancedbEngine (feature: engine-lancedb)                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Reranker trait                                             │
//! │  ├── RrfReranker, LinearCombinationReranker                 │
//! │  └── PassThroughReranker, custom implementations            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  IndexSpec builders + create_index                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tessera_core::TesseraConfig;
//! use tessera_search::{
//!     EmbeddingRegistry, EmbeddingResolver, HybridExecutor, MemoryEngine,
//!     MockEmbeddingFunction, RerankStrategy, RowIdentity, shared_cache,
//! };
//! use std::sync::Arc;
//!
//! let config = TesseraConfig::load(None)?;
//! let registry = EmbeddingRegistry::new()
//!     .with("mock", Arc::new(MockEmbeddingFunction::new(384)));
//! let resolver = EmbeddingResolver::new(registry, shared_cache(&config.cache));
//! let executor = Arc::new(
//!     HybridExecutor::new(Arc::new(MemoryEngine::new(rows)), resolver, config)
//!         .with_identity(RowIdentity::primary_key(["id"])),
//! );
//!
//! let rows = executor
//!     .query()
//!     .nearest_to_text("semantic query", "mock")
//!     .full_text_search("keywords")
//!     .limit(10)
//!     .rerank(RerankStrategy::rrf())
//!     .execute()?
//!     .try_collect_rows()
//!     .await?;
//! for row in rows {
//!     println!("{:?}: {:.4}", row.get("id"), row.relevance_score);
//! }
//! ```

// Core modules (always available)
pub mod embedding;
pub mod engine;
pub mod filter;
pub mod types;

// Pipeline modules (always available)
pub mod executor;
pub mod index;
pub mod query;
pub mod rerank;
pub mod resolver;

// Feature-gated binding modules
#[cfg(feature = "embed-fastembed")]
pub mod fastembed;

#[cfg(feature = "engine-lancedb")]
pub mod lancedb;

// Re-exports — core types
pub use types::{
    DISTANCE_COLUMN, DistanceType, NativeScore, RELEVANCE_COLUMN, RankedRow, RawResult, Row,
    RowIdentity, SCORE_COLUMN,
};

// Re-exports — traits and collaborators
pub use embedding::{EmbeddingFunction, EmbeddingRegistry, MockEmbeddingFunction};
pub use engine::{FtsSearchRequest, MemoryEngine, SearchEngine, VectorSearchRequest};
pub use index::{
    AnnAlgorithm, AnnParams, FtsParams, IndexCatalog, IndexInfo, IndexKind, IndexSpec,
    create_index,
};

// Re-exports — pipeline
pub use executor::{HybridExecutor, RankedRowStream};
pub use query::{QueryBuilder, SearchRequest, VectorQuery};
pub use rerank::{
    Capabilities, LinearCombinationReranker, Normalization, PassThroughReranker, RerankContext,
    RerankStrategy, Reranker, RrfReranker, SearchMode,
};
pub use resolver::{EmbeddingResolver, SharedEmbeddingCache, shared_cache, shared_cache_with_clock};

// Feature-gated re-exports
#[cfg(feature = "embed-fastembed")]
pub use fastembed::FastEmbedFunction;

#[cfg(feature = "engine-lancedb")]
pub use lancedb::{LancedbEngine, TableRecord};
