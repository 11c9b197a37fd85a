//! Embedding service with pluggable back-ends and content-hash caching.
//!
//! Four back-ends are supported: an in-process model (feature
//! `fastembed-embeddings`), a local HTTP embedding server, remote provider
//! APIs, and a deterministic pseudo-random fallback. The service NEVER
//! surfaces a backend failure to its caller: retrieval must always get
//! *some* ranking, so failures log and fall back to the random backend for
//! that call.
//!
//! # Architecture
//!
//! ```text
//! Embedder (trait)
//!   └── EmbeddingService
//!         ├── cache: content-hash → vector, persisted every 100 inserts
//!         └── backends::{in-process | local HTTP | remote API | random}
//! ```

pub mod backends;
pub mod cache;
pub mod service;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use service::EmbeddingService;

/// Whether a text is being embedded as stored content or as a query.
///
/// Asymmetric models (the designated `nomic-ai/*` family) embed passages
/// and queries with different prefixes; symmetric models ignore this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    /// Stored content.
    Passage,
    /// Retrieval query.
    Query,
}

impl PromptKind {
    /// Returns the prefix word used by asymmetric models.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passage => "passage",
            Self::Query => "query",
        }
    }
}

/// Descriptor of the active embedding model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Backend name (`in-process`, `local`, `api`, `random`).
    pub backend: String,
    /// Model identifier.
    pub model_name: String,
    /// Vector dimension.
    pub dim: usize,
    /// Device hint, when the backend has one.
    pub device: Option<String>,
    /// Number of cached vectors.
    pub cache_size: usize,
}

impl ModelInfo {
    /// Returns the version string used for migration tracking,
    /// `"<backend>:<model>:<dim>"`.
    #[must_use]
    pub fn version(&self) -> String {
        format!("{}:{}:{}", self.backend, self.model_name, self.dim)
    }
}

/// Text-to-vector interface shared by all memory tiers.
///
/// Implementations must be infallible: a failed backend call yields a
/// deterministic fallback vector, never an error. This keeps every
/// retrieval path total.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds one text into a vector of the model's dimension.
    async fn embed(&self, text: &str, kind: PromptKind) -> Vec<f32>;

    /// Embeds a batch of texts, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>>;

    /// Returns the active model descriptor.
    fn model_info(&self) -> ModelInfo;
}

/// Cosine similarity between two vectors.
///
/// Returns `0.0` for empty or length-mismatched inputs and for zero-norm
/// vectors, matching the scoring semantics of the stores (a degenerate
/// vector simply never ranks).
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_self_is_one() {
        let v = vec![0.3, -0.4, 0.5, 0.1];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_negation_is_minus_one() {
        let v = vec![0.3, -0.4, 0.5, 0.1];
        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&v, &neg) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert!((cosine_similarity(&[], &[]) - 0.0).abs() < f32::EPSILON);
        assert!((cosine_similarity(&[1.0], &[1.0, 2.0]) - 0.0).abs() < f32::EPSILON);
        assert!((cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]) - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_model_info_version() {
        let info = ModelInfo {
            backend: "random".to_string(),
            model_name: "m".to_string(),
            dim: 8,
            device: None,
            cache_size: 0,
        };
        assert_eq!(info.version(), "random:m:8");
    }
}
