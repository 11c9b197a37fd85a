//! Shared test fixtures: deterministic embedders and config builders.

// Not every test binary uses every fixture.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use mnemo_rs::Config;
use mnemo_rs::config::{MemoryConfig, ServerConfig};
use mnemo_rs::embedding::{Embedder, ModelInfo, PromptKind, backends::random_embedding};

/// Keyword-axis embedder: texts sharing a keyword land on the same axis,
/// so similarity scores are exactly 0.0 or 1.0.
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str, _kind: PromptKind) -> Vec<f32> {
        let lower = text.to_lowercase();
        if lower.contains("scheduler") {
            vec![1.0, 0.0, 0.0]
        } else if lower.contains("parser") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0]
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut out = Vec::new();
        for text in texts {
            out.push(self.embed(text, PromptKind::Passage).await);
        }
        out
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            backend: "stub".to_string(),
            model_name: "keyword".to_string(),
            dim: 3,
            device: None,
            cache_size: 0,
        }
    }
}

/// Deterministic embedder with a fixed model name and dimension.
pub struct FixedDimEmbedder {
    pub name: String,
    pub dim: usize,
}

#[async_trait]
impl Embedder for FixedDimEmbedder {
    async fn embed(&self, text: &str, _kind: PromptKind) -> Vec<f32> {
        random_embedding(text, self.dim)
    }

    async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut out = Vec::new();
        for text in texts {
            out.push(self.embed(text, PromptKind::Passage).await);
        }
        out
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            backend: "stub".to_string(),
            model_name: self.name.clone(),
            dim: self.dim,
            device: None,
            cache_size: 0,
        }
    }
}

/// A test config rooted at `dir` with the given working-memory cap.
pub fn test_config(dir: &Path, working_max_tokens: usize) -> Config {
    Config {
        data_dir: dir.to_path_buf(),
        memory: MemoryConfig {
            working_memory_max_tokens: working_max_tokens,
            ..MemoryConfig::default()
        },
        server: ServerConfig {
            require_auth: false,
            ..ServerConfig::default()
        },
        ..Config::default()
    }
}

/// Arc-wrapped keyword embedder.
pub fn keyword_embedder() -> Arc<dyn Embedder> {
    Arc::new(KeywordEmbedder)
}
