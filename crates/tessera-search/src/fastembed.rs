//! FastEmbed embedding function.
//!
//! Wraps the `fastembed` crate so query text can be embedded by a local
//! pre-trained model (BGE, MiniLM) instead of a remote API.
//!
//! # Thread Safety
//!
//! `fastembed::TextEmbedding` is not `Sync`, so it lives behind
//! `Arc<Mutex<>>` and every call runs inside `tokio::task::spawn_blocking`.
//!
//! # Feature Gate
//!
//! This module requires the `embed-fastembed` feature.

use crate::embedding::EmbeddingFunction;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tessera_core::{Error, Result};

const PROVIDER: &str = "fastembed";

/// Map a model name string to a fastembed `EmbeddingModel` enum variant.
fn resolve_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "bge-small-en-v1.5" | "BGESmallENV15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "all-minilm-l6-v2" | "AllMiniLML6V2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-base-en-v1.5" | "BGEBaseENV15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" | "BGELargeENV15" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        other => Err(Error::config(format!(
            "Unknown embedding model: '{other}'. Supported: bge-small-en-v1.5, all-minilm-l6-v2, bge-base-en-v1.5, bge-large-en-v1.5"
        ))),
    }
}

/// Local embedding function backed by a fastembed model.
///
/// | Name | Dimension |
/// |------|-----------|
/// | `bge-small-en-v1.5` | 384 |
/// | `all-minilm-l6-v2` | 384 |
/// | `bge-base-en-v1.5` | 768 |
/// | `bge-large-en-v1.5` | 1024 |
pub struct FastEmbedFunction {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
    dimension: usize,
    model_name: String,
}

impl FastEmbedFunction {
    /// Load `model_name`, downloading it into `cache_path` if needed.
    pub fn new(model_name: &str, cache_path: Option<&str>) -> Result<Self> {
        let model_enum = resolve_model(model_name)?;

        let mut init = fastembed::InitOptions::new(model_enum);
        if let Some(path) = cache_path {
            init = init.with_cache_dir(std::path::PathBuf::from(path));
        }

        let mut text_embedding = fastembed::TextEmbedding::try_new(init)
            .map_err(|e| Error::provider(PROVIDER, format!("model init failed: {e}")))?;

        let probe = text_embedding
            .embed(vec!["dimension probe"], None)
            .map_err(|e| Error::provider(PROVIDER, format!("dimension probe failed: {e}")))?;

        let dimension = probe
            .first()
            .map(|v| v.len())
            .ok_or_else(|| Error::provider(PROVIDER, "empty probe embedding"))?;

        log::debug!("loaded fastembed model {model_name} (dimension {dimension})");

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            dimension,
            model_name: model_name.to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingFunction for FastEmbedFunction {
    async fn compute(&self, input: &str) -> Result<Vec<f32>> {
        let mut batch = self.compute_batch(&[input]).await?;
        batch
            .pop()
            .ok_or_else(|| Error::provider(PROVIDER, "no embedding returned"))
    }

    async fn compute_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        let inputs: Vec<String> = inputs.iter().map(|t| t.to_string()).collect();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| Error::provider(PROVIDER, format!("mutex poisoned: {e}")))?;
            model
                .embed(inputs, None)
                .map_err(|e| Error::provider(PROVIDER, format!("embedding failed: {e}")))
        })
        .await
        .map_err(|e| Error::provider(PROVIDER, format!("spawn_blocking failed: {e}")))?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

impl std::fmt::Debug for FastEmbedFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedFunction")
            .field("model", &self.model_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_model_known_and_aliases() {
        assert!(resolve_model("bge-small-en-v1.5").is_ok());
        assert!(resolve_model("all-minilm-l6-v2").is_ok());
        assert!(resolve_model("BGEBaseENV15").is_ok());
        assert!(resolve_model("BGELargeENV15").is_ok());
    }

    #[test]
    fn test_resolve_model_unknown() {
        let err = resolve_model("nonexistent-model").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding model"));
    }

    #[tokio::test]
    #[ignore = "requires model download (~50MB)"]
    async fn test_fastembed_compute() {
        let function = FastEmbedFunction::new("bge-small-en-v1.5", None).unwrap();
        assert_eq!(function.dimension(), 384);

        let embedding = function.compute("Hello world").await.unwrap();
        assert_eq!(embedding.len(), 384);
        assert_eq!(embedding, function.compute("Hello world").await.unwrap());
    }
}
