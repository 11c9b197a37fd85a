//! Archival memory: the unbounded append-only vector store.
//!
//! Two parallel ordered sequences (items and vectors) indexed by position.
//! Search is a linear cosine scan parallelised with rayon; persistence is a
//! single JSON blob rewritten every tenth insertion. Items are never
//! mutated or evicted.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info};
use uuid::Uuid;

use crate::embedding::{Embedder, PromptKind, cosine_similarity};
use crate::error::MemoryError;
use crate::persist;

/// Persist the collection every this many insertions.
const SAVE_INTERVAL: usize = 10;

/// One stored memory. Append-only; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedItem {
    /// Opaque unique identifier.
    pub id: String,
    /// Stored text.
    pub text: String,
    /// Caller-supplied metadata.
    pub metadata: Value,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A ranked search hit.
#[derive(Debug, Clone, Serialize)]
pub struct ArchivalHit {
    /// Item identifier.
    pub id: String,
    /// Item text.
    pub text: String,
    /// Item metadata.
    pub metadata: Value,
    /// Cosine relevance clamped into `[0, 1]`.
    pub relevance_score: f32,
}

/// On-disk collection shape: `{memories, vectors, updated_at}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Collection {
    memories: Vec<ArchivedItem>,
    vectors: Vec<Vec<f32>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Unbounded append-only vector store with cosine search.
pub struct ArchivalMemory {
    embedder: Arc<dyn Embedder>,
    path: PathBuf,
    inner: Mutex<Collection>,
}

impl std::fmt::Debug for ArchivalMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchivalMemory")
            .field("path", &self.path)
            .field("items", &self.len())
            .finish_non_exhaustive()
    }
}

impl ArchivalMemory {
    /// Opens (or creates) the named collection under `data_dir`.
    ///
    /// A corrupt or positionally misaligned collection file is logged and
    /// replaced by an empty collection; the store keeps serving.
    #[must_use]
    pub fn open(embedder: Arc<dyn Embedder>, data_dir: &Path, collection_name: &str) -> Self {
        let path = data_dir.join(format!("{collection_name}.json"));
        let mut collection: Collection = persist::load_json_or_default(&path);

        if collection.memories.len() != collection.vectors.len() {
            error!(
                path = %path.display(),
                memories = collection.memories.len(),
                vectors = collection.vectors.len(),
                "archival collection misaligned, truncating to empty"
            );
            collection = Collection::default();
        } else if !collection.memories.is_empty() {
            info!(count = collection.memories.len(), "loaded archival memory");
        }

        Self {
            embedder,
            path,
            inner: Mutex::new(collection),
        }
    }

    /// Stores a text with metadata, returning the new item's ID.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Persist`] when the periodic flush fails; the
    /// item itself is still held in memory.
    pub async fn store(&self, text: &str, metadata: Value) -> Result<String, MemoryError> {
        let vector = self.embedder.embed(text, PromptKind::Passage).await;
        let item = ArchivedItem {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            metadata,
            created_at: Utc::now(),
        };
        let id = item.id.clone();

        let needs_save = {
            let mut inner = self.inner.lock().map_err(|_| MemoryError::Persist {
                path: self.path.clone(),
                message: "archival lock poisoned".to_string(),
            })?;
            inner.memories.push(item);
            inner.vectors.push(vector);
            inner.memories.len() % SAVE_INTERVAL == 0
        };

        if needs_save {
            self.persist()?;
        }
        Ok(id)
    }

    /// Archives a page, deriving its text and propagating page metadata.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Persist`] when the periodic flush fails.
    pub async fn store_page(&self, page: &super::page::Page) -> Result<String, MemoryError> {
        let text = page.content.as_text();
        let metadata = json!({
            "page_id": page.id,
            "page_type": page.kind.as_str(),
            "created_at": page.created_at,
            "access_count": page.access_count,
            "archived_at": Utc::now(),
        });
        self.store(&text, metadata).await
    }

    /// Top-`limit` cosine matches for the query.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<ArchivalHit> {
        if self.is_empty() {
            return Vec::new();
        }
        let query_vector = self.embedder.embed(query, PromptKind::Query).await;
        self.search_with_vector(&query_vector, limit)
    }

    /// Top-`limit` cosine matches against a precomputed query vector.
    #[must_use]
    pub fn search_with_vector(&self, query_vector: &[f32], limit: usize) -> Vec<ArchivalHit> {
        let Ok(inner) = self.inner.lock() else {
            return Vec::new();
        };

        let mut scored: Vec<(usize, f32)> = inner
            .vectors
            .par_iter()
            .enumerate()
            .map(|(i, vector)| (i, cosine_similarity(query_vector, vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(limit)
            .filter_map(|(i, score)| {
                inner.memories.get(i).map(|item| ArchivalHit {
                    id: item.id.clone(),
                    text: item.text.clone(),
                    metadata: item.metadata.clone(),
                    relevance_score: score.clamp(0.0, 1.0),
                })
            })
            .collect()
    }

    /// Writes the collection to disk atomically.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Persist`] on serialisation or I/O failure.
    pub fn persist(&self) -> Result<(), MemoryError> {
        let mut inner = self.inner.lock().map_err(|_| MemoryError::Persist {
            path: self.path.clone(),
            message: "archival lock poisoned".to_string(),
        })?;
        inner.updated_at = Some(Utc::now());
        persist::write_json_atomic(&self.path, &*inner).map_err(|e| MemoryError::Persist {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    /// Number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map_or(0, |inner| inner.memories.len())
    }

    /// Whether the store holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::ModelInfo;
    use async_trait::async_trait;

    /// Embeds texts onto fixed axes by keyword so scores are predictable.
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
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
                model_name: "stub".to_string(),
                dim: 3,
                device: None,
                cache_size: 0,
            }
        }
    }

    fn open_store(dir: &Path) -> ArchivalMemory {
        ArchivalMemory::open(Arc::new(StubEmbedder), dir, "memory")
    }

    #[tokio::test]
    async fn test_store_and_search_ranks_by_similarity() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let store = open_store(dir.path());

        store
            .store("The scheduler uses priority queues", json!({"type": "doc"}))
            .await
            .unwrap_or_else(|_| unreachable!());
        store
            .store("The parser builds a tree", json!({"type": "doc"}))
            .await
            .unwrap_or_else(|_| unreachable!());

        let hits = store.search("how does the scheduler work", 5).await;
        assert_eq!(hits.len(), 2);
        assert!(hits[0].text.contains("scheduler"));
        assert!(hits[0].relevance_score > 0.99);
        assert!(hits[1].relevance_score < 0.01);
    }

    #[tokio::test]
    async fn test_limit_respected() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let store = open_store(dir.path());
        for i in 0..5 {
            store
                .store(&format!("scheduler note {i}"), json!({}))
                .await
                .unwrap_or_else(|_| unreachable!());
        }
        assert_eq!(store.search("scheduler", 3).await.len(), 3);
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let store = open_store(dir.path());
        store
            .store("scheduler facts", json!({"k": 1}))
            .await
            .unwrap_or_else(|_| unreachable!());
        store.persist().unwrap_or_else(|_| unreachable!());

        let reloaded = open_store(dir.path());
        assert_eq!(reloaded.len(), 1);
        let hits = reloaded.search("scheduler", 1).await;
        assert_eq!(hits[0].text, "scheduler facts");
    }

    #[tokio::test]
    async fn test_misaligned_collection_truncates() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let path = dir.path().join("memory.json");
        std::fs::write(
            &path,
            r#"{"memories": [{"id": "1", "text": "t", "metadata": {}, "created_at": "2026-01-01T00:00:00Z"}], "vectors": []}"#,
        )
        .unwrap_or_else(|_| unreachable!());

        let store = open_store(dir.path());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_store_page_propagates_metadata() {
        use crate::memory::page::{Page, PageContent, PageKind};

        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let store = open_store(dir.path());

        let page = Page::new(
            PageContent::Text {
                body: "scheduler history".to_string(),
            },
            PageKind::Conversation,
        );
        let page_id = page.id.clone();
        store.store_page(&page).await.unwrap_or_else(|_| unreachable!());

        let hits = store.search("scheduler", 1).await;
        assert_eq!(hits[0].metadata["page_id"], page_id);
        assert_eq!(hits[0].metadata["page_type"], "conversation");
    }
}
