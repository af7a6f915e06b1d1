//! Embedding function trait, registry and mock implementation.
//!
//! This module defines the `EmbeddingFunction` trait that abstracts over
//! embedding backends (local models, remote APIs), and the
//! `EmbeddingRegistry` the resolver looks functions up in.
//!
//! # Functions
//!
//! - `MockEmbeddingFunction`: Deterministic fixed-dimension vectors for testing
//! - `FastEmbedFunction`: Local embedding via fastembed (requires `embed-fastembed` feature)

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tessera_core::{Error, Result};

/// Trait for turning query input into a vector.
///
/// Implementations report failures as [`Error::Provider`]. No retry contract
/// is implied; callers decide whether to try again.
///
/// # Thread Safety
///
/// Implementations should handle internal synchronization (e.g., `Arc<Mutex<>>`)
/// for thread-unsafe underlying libraries.
#[async_trait]
pub trait EmbeddingFunction: Send + Sync {
    /// Compute the embedding for a single input.
    async fn compute(&self, input: &str) -> Result<Vec<f32>>;

    /// Compute embeddings for a batch of inputs.
    ///
    /// Default implementation calls `compute` for each input sequentially.
    async fn compute_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            results.push(self.compute(input).await?);
        }
        Ok(results)
    }

    /// The embedding dimension.
    fn dimension(&self) -> usize;

    /// The function name for diagnostics.
    fn name(&self) -> &str;
}

// ============================================================================
// Registry
// ============================================================================

/// Named embedding functions available to the resolver.
#[derive(Default, Clone)]
pub struct EmbeddingRegistry {
    functions: HashMap<String, Arc<dyn EmbeddingFunction>>,
}

impl EmbeddingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `function` under `id`, replacing any previous entry.
    pub fn register(&mut self, id: impl Into<String>, function: Arc<dyn EmbeddingFunction>) {
        let id = id.into();
        log::debug!("registering embedding function '{}' ({})", id, function.name());
        self.functions.insert(id, function);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, id: impl Into<String>, function: Arc<dyn EmbeddingFunction>) -> Self {
        self.register(id, function);
        self
    }

    /// Look up a function by id.
    pub fn get(&self, id: &str) -> Result<Arc<dyn EmbeddingFunction>> {
        self.functions.get(id).cloned().ok_or_else(|| {
            Error::validation(format!("no embedding function registered as '{id}'"))
        })
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether no functions are registered.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for EmbeddingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingRegistry")
            .field("functions", &self.ids())
            .finish()
    }
}

// ============================================================================
// Mock
// ============================================================================

/// A mock embedding function for testing.
///
/// Generates deterministic unit vectors derived from the input bytes.
pub struct MockEmbeddingFunction {
    dimension: usize,
}

impl MockEmbeddingFunction {
    /// Create a new mock function with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn deterministic_embedding(&self, input: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        let bytes = input.as_bytes();

        if bytes.is_empty() {
            return embedding;
        }

        for (i, val) in embedding.iter_mut().enumerate() {
            let byte_val = bytes[i % bytes.len()];
            *val = ((byte_val as f32 + i as f32) % 256.0) / 256.0;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut embedding {
                *val /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingFunction for MockEmbeddingFunction {
    async fn compute(&self, input: &str) -> Result<Vec<f32>> {
        Ok(self.deterministic_embedding(input))
    }

    async fn compute_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(inputs
            .iter()
            .map(|t| self.deterministic_embedding(t))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Tests
// ============================================================================
