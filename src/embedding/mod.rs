//! Text embedding capability and similarity math.
//!
//! - [`Embedder`]: what the rest of the crate depends on.
//! - [`EmbeddingProvider`]: one raw request to a remote embedding service.
//! - [`CachedEmbedder`]: an [`Embedder`] over a provider with a bounded LRU
//!   cache and a request timeout.

pub mod similarity;

pub use similarity::{
    compute_trajectory_embedding, cosine_similarity, decay_weights, semantic_tension,
    TRAJECTORY_DECAY,
};

use async_trait::async_trait;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{EmbeddingError, EmbeddingResult};

/// Turns text into fixed-dimension vectors.
///
/// Vectors from one implementation can be compared with each other;
/// comparing vectors across implementations is meaningless.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f64>>;
    /// Embed several texts, returning vectors in input order.
    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f64>>>;
    /// Dimensionality of every returned vector.
    fn dimensions(&self) -> usize;
}

/// A remote text-embedding endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Send one request for `texts`; must return one vector per input, in order.
    async fn embed_texts(&self, model: &str, texts: &[String]) -> EmbeddingResult<Vec<Vec<f64>>>;
}

/// [`Embedder`] that fronts a provider with an exact-text LRU cache.
pub struct CachedEmbedder<P> {
    provider: P,
    model: String,
    dimensions: usize,
    timeout_ms: u64,
    cache: Option<Mutex<LruCache<String, Vec<f64>>>>,
}

impl<P: EmbeddingProvider> CachedEmbedder<P> {
    /// Create an embedder; a `cache_size` of 0 disables caching.
    pub fn new(provider: P, config: &EmbeddingConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            dimensions: config.dimensions,
            timeout_ms: config.timeout_ms,
            cache: NonZeroUsize::new(config.cache_size).map(|n| Mutex::new(LruCache::new(n))),
        }
    }

    /// Model identifier sent with every request
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Number of cached texts
    pub fn cached_len(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| {
            cache.lock().unwrap_or_else(PoisonError::into_inner).len()
        })
    }

    fn cache_get(&self, text: &str) -> Option<Vec<f64>> {
        let cache = self.cache.as_ref()?;
        let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(text).cloned()
    }

    fn cache_put(&self, text: &str, embedding: &[f64]) {
        if let Some(cache) = &self.cache {
            let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
            cache.put(text.to_string(), embedding.to_vec());
        }
    }

    /// One provider round-trip, bounded by the configured timeout.
    async fn fetch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f64>>> {
        debug!(model = %self.model, count = texts.len(), "Requesting embeddings");

        let request = self.provider.embed_texts(&self.model, texts);
        let vectors = tokio::time::timeout(Duration::from_millis(self.timeout_ms), request)
            .await
            .map_err(|_| {
                warn!(timeout_ms = self.timeout_ms, "Embedding request timed out");
                EmbeddingError::Timeout {
                    timeout_ms: self.timeout_ms,
                }
            })??;

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::MalformedResponse {
                message: format!("expected {} vectors, got {}", texts.len(), vectors.len()),
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(EmbeddingError::MalformedResponse {
                message: format!(
                    "expected {} dimensions, got {}",
                    self.dimensions,
                    bad.len()
                ),
            });
        }

        Ok(vectors)
    }
}

#[async_trait]
impl<P: EmbeddingProvider> Embedder for CachedEmbedder<P> {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f64>> {
        if let Some(hit) = self.cache_get(text) {
            debug!("Embedding cache hit");
            return Ok(hit);
        }

        let mut vectors = self.fetch(&[text.to_string()]).await?;
        let embedding = vectors.pop().ok_or_else(|| EmbeddingError::MalformedResponse {
            message: "empty response".to_string(),
        })?;
        self.cache_put(text, &embedding);
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f64>>> {
        // Phase 1: split into cached results and texts still to fetch
        let mut results: Vec<Option<Vec<f64>>> = Vec::with_capacity(texts.len());
        let mut pending: Vec<String> = Vec::new();
        let mut pending_index: HashMap<&str, usize> = HashMap::new();
        for text in texts {
            let hit = self.cache_get(text);
            if hit.is_none() && !pending_index.contains_key(text.as_str()) {
                pending_index.insert(text.as_str(), pending.len());
                pending.push(text.clone());
            }
            results.push(hit);
        }

        debug!(
            total = texts.len(),
            uncached = pending.len(),
            "Embedding batch partitioned"
        );

        // Phase 2: fetch all misses in one request
        let fetched = if pending.is_empty() {
            Vec::new()
        } else {
            self.fetch(&pending).await?
        };
        for (text, embedding) in pending.iter().zip(&fetched) {
            self.cache_put(text, embedding);
        }

        // Phase 3: merge, preserving input order
        for (slot, text) in results.iter_mut().zip(texts) {
            if slot.is_none() {
                *slot = pending_index
                    .get(text.as_str())
                    .and_then(|&i| fetched.get(i))
                    .cloned();
            }
        }
        results
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| EmbeddingError::MalformedResponse {
                message: "batch response missing an input".to_string(),
            })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(cache_size: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            model: "test-model".to_string(),
            dimensions: 2,
            cache_size,
            timeout_ms: 200,
        }
    }

    fn vector_for(text: &str) -> Vec<f64> {
        vec![text.len() as f64, 1.0]
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_embed_caches_result() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed_texts()
            .withf(|model, texts| model == "test-model" && texts == ["hello".to_string()])
            .times(1)
            .returning(|_, texts| Ok(texts.iter().map(|t| vector_for(t)).collect()));

        let embedder = CachedEmbedder::new(provider, &config(10));
        let first = embedder.embed("hello").await.unwrap();
        let second = embedder.embed("hello").await.unwrap();

        assert_eq!(first, vec![5.0, 1.0]);
        assert_eq!(first, second);
        assert_eq!(embedder.cached_len(), 1);
    }

    #[tokio::test]
    async fn test_embed_without_cache_always_fetches() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed_texts()
            .times(2)
            .returning(|_, texts| Ok(texts.iter().map(|t| vector_for(t)).collect()));

        let embedder = CachedEmbedder::new(provider, &config(0));
        embedder.embed("hello").await.unwrap();
        embedder.embed("hello").await.unwrap();
        assert_eq!(embedder.cached_len(), 0);
    }

    #[tokio::test]
    async fn test_cache_evicts_least_recently_used() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed_texts()
            .times(4)
            .returning(|_, texts| Ok(texts.iter().map(|t| vector_for(t)).collect()));

        let embedder = CachedEmbedder::new(provider, &config(2));
        embedder.embed("a").await.unwrap(); // fetch
        embedder.embed("bb").await.unwrap(); // fetch
        embedder.embed("a").await.unwrap(); // hit, "bb" now least recent
        embedder.embed("ccc").await.unwrap(); // fetch, evicts "bb"
        embedder.embed("a").await.unwrap(); // hit
        embedder.embed("bb").await.unwrap(); // fetch again
    }

    #[tokio::test]
    async fn test_batch_fetches_only_uncached_in_one_request() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed_texts()
            .withf(|_, texts| texts == ["cached".to_string()])
            .times(1)
            .returning(|_, texts| Ok(texts.iter().map(|t| vector_for(t)).collect()));
        provider
            .expect_embed_texts()
            .withf(|_, texts| texts == ["x".to_string(), "yyy".to_string()])
            .times(1)
            .returning(|_, texts| Ok(texts.iter().map(|t| vector_for(t)).collect()));

        let embedder = CachedEmbedder::new(provider, &config(10));
        embedder.embed("cached").await.unwrap();

        let result = embedder
            .embed_batch(&texts(&["x", "cached", "yyy", "x"]))
            .await
            .unwrap();

        assert_eq!(
            result,
            vec![vec![1.0, 1.0], vec![6.0, 1.0], vec![3.0, 1.0], vec![1.0, 1.0]]
        );
        assert_eq!(embedder.cached_len(), 3);
    }

    #[tokio::test]
    async fn test_batch_fully_cached_skips_provider() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed_texts()
            .times(1)
            .returning(|_, texts| Ok(texts.iter().map(|t| vector_for(t)).collect()));

        let embedder = CachedEmbedder::new(provider, &config(10));
        let first = embedder.embed_batch(&texts(&["a", "bb"])).await.unwrap();
        let second = embedder.embed_batch(&texts(&["bb", "a"])).await.unwrap();

        assert_eq!(first, vec![vec![1.0, 1.0], vec![2.0, 1.0]]);
        assert_eq!(second, vec![vec![2.0, 1.0], vec![1.0, 1.0]]);
        assert!(embedder.embed_batch(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_embed_texts().returning(|_, _| {
            Err(EmbeddingError::Provider {
                message: "connection refused".to_string(),
            })
        });

        let embedder = CachedEmbedder::new(provider, &config(10));
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Provider { .. }));
        assert_eq!(embedder.cached_len(), 0);
    }

    #[tokio::test]
    async fn test_malformed_response_count() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed_texts()
            .returning(|_, _| Ok(vec![vec![1.0, 1.0]]));

        let embedder = CachedEmbedder::new(provider, &config(10));
        let err = embedder.embed_batch(&texts(&["a", "b"])).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_malformed_response_dimensions() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed_texts()
            .returning(|_, _| Ok(vec![vec![1.0, 1.0, 1.0]]));

        let embedder = CachedEmbedder::new(provider, &config(10));
        let err = embedder.embed("a").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::MalformedResponse { .. }));
    }

    struct SlowProvider;

    #[async_trait]
    impl EmbeddingProvider for SlowProvider {
        async fn embed_texts(
            &self,
            _model: &str,
            texts: &[String],
        ) -> EmbeddingResult<Vec<Vec<f64>>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(texts.iter().map(|t| vector_for(t)).collect())
        }
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_error() {
        let embedder = CachedEmbedder::new(SlowProvider, &config(10));
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Timeout { timeout_ms: 200 }));
    }
}
