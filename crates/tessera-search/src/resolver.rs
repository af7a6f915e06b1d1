//! Query embedding resolution with a TTL cache in front of the provider.
//!
//! The cache key is a blake3 digest over the function id and the serialized
//! input, so the same text embedded by two different functions never
//! collides.
//!
//! Two concurrent misses on the same key may both reach the provider; there
//! is no in-flight request collapsing.

use std::sync::{Arc, Mutex, MutexGuard};
use tessera_core::{CacheConfig, Clock, Error, Result, TtlCache};

use crate::embedding::EmbeddingRegistry;

/// Cache shared by every resolver in a process.
pub type SharedEmbeddingCache = Arc<Mutex<TtlCache<String, Arc<Vec<f32>>>>>;

/// Create a shared cache using the monotonic OS clock.
pub fn shared_cache(config: &CacheConfig) -> SharedEmbeddingCache {
    Arc::new(Mutex::new(TtlCache::new(config.ttl())))
}

/// Create a shared cache driven by `clock`.
pub fn shared_cache_with_clock(
    config: &CacheConfig,
    clock: Arc<dyn Clock>,
) -> SharedEmbeddingCache {
    Arc::new(Mutex::new(TtlCache::with_clock(config.ttl(), clock)))
}

/// Converts raw query input into vectors.
#[derive(Debug, Clone)]
pub struct EmbeddingResolver {
    registry: EmbeddingRegistry,
    cache: SharedEmbeddingCache,
}

impl EmbeddingResolver {
    /// Create a resolver over `registry` backed by `cache`.
    pub fn new(registry: EmbeddingRegistry, cache: SharedEmbeddingCache) -> Self {
        Self { registry, cache }
    }

    /// The registry functions are looked up in.
    pub fn registry(&self) -> &EmbeddingRegistry {
        &self.registry
    }

    /// The shared cache.
    pub fn cache(&self) -> &SharedEmbeddingCache {
        &self.cache
    }

    /// Compute the cache key for `input` under `function_id`.
    pub fn cache_key(function_id: &str, input: &str) -> String {
        let serialized = serde_json::Value::from(input).to_string();
        let mut hasher = blake3::Hasher::new();
        hasher.update(function_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(serialized.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Resolve `input` to a vector using the function registered as `function_id`.
    ///
    /// Provider failures are returned unchanged and leave the cache untouched.
    pub async fn resolve(&self, input: &str, function_id: &str) -> Result<Vec<f32>> {
        let key = Self::cache_key(function_id, input);

        if let Some(hit) = self.lock_cache().get(&key) {
            log::trace!("embedding cache hit for '{function_id}'");
            return Ok(hit.as_ref().clone());
        }

        let function = self.registry.get(function_id)?;
        log::debug!(
            "embedding cache miss for '{}', computing with {}",
            function_id,
            function.name()
        );
        let vector = function.compute(input).await?;

        let expected = function.dimension();
        if expected != 0 && vector.len() != expected {
            return Err(Error::schema(format!(
                "embedding function '{function_id}' returned dimension {}, expected {expected}",
                vector.len()
            )));
        }

        self.lock_cache().set(key, Arc::new(vector.clone()));
        Ok(vector)
    }

    /// Drop the cached vector for `input`, if any.
    pub fn invalidate(&self, input: &str, function_id: &str) -> bool {
        self.lock_cache()
            .delete(&Self::cache_key(function_id, input))
    }

    fn lock_cache(&self) -> MutexGuard<'_, TtlCache<String, Arc<Vec<f32>>>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Tests
// ============================================================================
