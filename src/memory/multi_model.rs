//! Multi-model embedding storage.
//!
//! Stores the same text enriched with vectors from several embedding
//! models, keyed `"<model_name>:<dim>"`. Text is always preserved verbatim;
//! embeddings are an auxiliary index. `backfill` computes missing vectors
//! for newly registered models, migrating stored content in place without
//! data loss. Searching uses exactly one model key's vectors at a time;
//! cross-model fusion belongs to the orchestrator.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::embedding::{Embedder, PromptKind, cosine_similarity};
use crate::error::MemoryError;
use crate::persist;

use super::message::Role;

/// Conversations store filename under the data dir.
const CONVERSATIONS_FILE: &str = "conversations_multi_model.json";
/// Documents store filename under the data dir.
const DOCUMENTS_FILE: &str = "knowledge_multi_model.json";

/// Parses the dimension out of a `"<model>:<dim>"` key.
#[must_use]
pub fn key_dim(model_key: &str) -> Option<usize> {
    model_key.rsplit(':').next()?.parse().ok()
}

/// Entry metadata: creation time plus per-model version tracking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Model version string per model key.
    #[serde(default)]
    pub model_versions: BTreeMap<String, String>,
    /// Keys for which this entry has vectors.
    #[serde(default)]
    pub available_models: Vec<String>,
    /// Caller metadata (documents only).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub user_metadata: Value,
}

/// One stored text with vectors from several models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiModelEntry {
    /// Entry identifier (`msg_*` or `doc_*`).
    pub id: String,
    /// Original text, preserved verbatim across migrations.
    pub text: String,
    /// Message role, set for conversation entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Vectors keyed by `"<model>:<dim>"`.
    #[serde(default)]
    pub embeddings: BTreeMap<String, Vec<f32>>,
    /// Version and availability metadata.
    #[serde(default)]
    pub metadata: EntryMetadata,
}

/// A ranked hit from one model key's vector space.
#[derive(Debug, Clone, Serialize)]
pub struct MultiModelHit {
    /// Entry identifier.
    pub id: String,
    /// Entry text.
    pub text: String,
    /// Role, for conversation hits.
    pub role: Option<Role>,
    /// Cosine similarity under the chosen model.
    pub similarity: f32,
    /// `"conversation"` or `"knowledge_base"`.
    pub source: &'static str,
    /// The model key that produced the score.
    pub model_used: String,
}

/// Preview row for management listings.
#[derive(Debug, Clone, Serialize)]
pub struct EntryPreview {
    /// Entry identifier.
    pub id: String,
    /// Role, for conversation entries.
    pub role: Option<Role>,
    /// First 100 characters of the text.
    pub text_preview: String,
    /// Creation time.
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
    conversations: Vec<MultiModelEntry>,
    documents: Vec<MultiModelEntry>,
}

/// The registered embedders used by store and backfill operations.
pub type ModelMap = BTreeMap<String, Arc<dyn Embedder>>;

/// Parallel store holding text plus per-model embeddings.
pub struct MultiModelStorage {
    conversations_path: PathBuf,
    documents_path: PathBuf,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for MultiModelStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiModelStorage")
            .field("conversations_path", &self.conversations_path)
            .field("documents_path", &self.documents_path)
            .finish_non_exhaustive()
    }
}

impl MultiModelStorage {
    /// Opens (or creates) the store under `data_dir`.
    #[must_use]
    pub fn open(data_dir: &Path) -> Self {
        let conversations_path = data_dir.join(CONVERSATIONS_FILE);
        let documents_path = data_dir.join(DOCUMENTS_FILE);
        let inner = Inner {
            conversations: persist::load_json_or_default(&conversations_path),
            documents: persist::load_json_or_default(&documents_path),
        };
        if !inner.conversations.is_empty() || !inner.documents.is_empty() {
            info!(
                conversations = inner.conversations.len(),
                documents = inner.documents.len(),
                "loaded multi-model storage"
            );
        }
        Self {
            conversations_path,
            documents_path,
            inner: Mutex::new(inner),
        }
    }

    /// Embeds `text` with every model whose vector length matches its key's
    /// declared dimension. Mismatches are logged and skipped so a
    /// misdeclared model can never corrupt the index.
    async fn embed_all(
        text: &str,
        models: &ModelMap,
    ) -> (BTreeMap<String, Vec<f32>>, BTreeMap<String, String>) {
        let mut embeddings = BTreeMap::new();
        let mut versions = BTreeMap::new();
        for (key, embedder) in models {
            let vector = embedder.embed(text, PromptKind::Passage).await;
            match key_dim(key) {
                Some(dim) if vector.len() == dim => {
                    versions.insert(key.clone(), embedder.model_info().version());
                    embeddings.insert(key.clone(), vector);
                }
                Some(dim) => {
                    warn!(
                        model_key = %key,
                        expected = dim,
                        actual = vector.len(),
                        "embedding dimension mismatch, skipping model"
                    );
                }
                None => {
                    warn!(model_key = %key, "model key has no parseable dimension, skipping");
                }
            }
        }
        (embeddings, versions)
    }

    /// Stores a conversation message with vectors from all `models`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Persist`] if the store cannot be written.
    pub async fn store_conversation(
        &self,
        text: &str,
        role: Role,
        models: &ModelMap,
    ) -> Result<String, MemoryError> {
        let (embeddings, model_versions) = Self::embed_all(text, models).await;
        let available_models: Vec<String> = embeddings.keys().cloned().collect();

        let id = {
            let mut inner = self.lock()?;
            let id = format!(
                "msg_{}_{}",
                Utc::now().format("%Y%m%d_%H%M%S"),
                inner.conversations.len()
            );
            inner.conversations.push(MultiModelEntry {
                id: id.clone(),
                text: text.to_string(),
                role: Some(role),
                embeddings,
                metadata: EntryMetadata {
                    created_at: Some(Utc::now()),
                    model_versions,
                    available_models,
                    user_metadata: Value::Null,
                },
            });
            id
        };
        self.persist_conversations()?;
        Ok(id)
    }

    /// Stores a document with vectors from all `models`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Persist`] if the store cannot be written.
    pub async fn store_document(
        &self,
        text: &str,
        metadata: Value,
        models: &ModelMap,
    ) -> Result<String, MemoryError> {
        let (embeddings, model_versions) = Self::embed_all(text, models).await;
        let available_models: Vec<String> = embeddings.keys().cloned().collect();

        let id = {
            let mut inner = self.lock()?;
            let id = format!(
                "doc_{}_{}",
                Utc::now().format("%Y%m%d_%H%M%S"),
                inner.documents.len()
            );
            inner.documents.push(MultiModelEntry {
                id: id.clone(),
                text: text.to_string(),
                role: None,
                embeddings,
                metadata: EntryMetadata {
                    created_at: Some(Utc::now()),
                    model_versions,
                    available_models,
                    user_metadata: metadata,
                },
            });
            id
        };
        self.persist_documents()?;
        Ok(id)
    }

    /// Ranked conversation hits under one model key's vectors.
    #[must_use]
    pub fn search_conversations(
        &self,
        query_vector: &[f32],
        model_key: &str,
        max_results: usize,
        threshold: f32,
    ) -> Vec<MultiModelHit> {
        self.search_entries(query_vector, model_key, max_results, threshold, "conversation")
    }

    /// Ranked document hits under one model key's vectors.
    #[must_use]
    pub fn search_documents(
        &self,
        query_vector: &[f32],
        model_key: &str,
        max_results: usize,
        threshold: f32,
    ) -> Vec<MultiModelHit> {
        self.search_entries(query_vector, model_key, max_results, threshold, "knowledge_base")
    }

    fn search_entries(
        &self,
        query_vector: &[f32],
        model_key: &str,
        max_results: usize,
        threshold: f32,
        source: &'static str,
    ) -> Vec<MultiModelHit> {
        let Ok(inner) = self.inner.lock() else {
            return Vec::new();
        };
        let entries = if source == "conversation" {
            &inner.conversations
        } else {
            &inner.documents
        };

        let mut hits: Vec<MultiModelHit> = entries
            .iter()
            .filter_map(|entry| {
                let vector = entry.embeddings.get(model_key)?;
                let similarity = cosine_similarity(query_vector, vector);
                (similarity >= threshold).then(|| MultiModelHit {
                    id: entry.id.clone(),
                    text: entry.text.clone(),
                    role: entry.role,
                    similarity,
                    source,
                    model_used: model_key.to_string(),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(max_results);
        hits
    }

    /// Adds vectors from `models` to every stored entry that lacks them,
    /// leaving the text untouched. This is the in-place migration path for
    /// new embedding models.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Persist`] if either store cannot be written.
    pub async fn backfill(&self, models: &ModelMap) -> Result<usize, MemoryError> {
        let mut added = 0;

        // Work out what is missing first so embedding happens outside the lock.
        let missing: Vec<(bool, usize, String, String)> = {
            let inner = self.lock()?;
            let mut out = Vec::new();
            for (is_conversation, entries) in
                [(true, &inner.conversations), (false, &inner.documents)]
            {
                for (index, entry) in entries.iter().enumerate() {
                    for key in models.keys() {
                        if !entry.embeddings.contains_key(key) {
                            out.push((is_conversation, index, key.clone(), entry.text.clone()));
                        }
                    }
                }
            }
            out
        };

        for (is_conversation, index, key, text) in missing {
            let Some(embedder) = models.get(&key) else {
                continue;
            };
            let vector = embedder.embed(&text, PromptKind::Passage).await;
            let Some(dim) = key_dim(&key) else { continue };
            if vector.len() != dim {
                warn!(model_key = %key, "backfill dimension mismatch, skipping");
                continue;
            }
            let version = embedder.model_info().version();

            let mut inner = self.lock()?;
            let entries = if is_conversation {
                &mut inner.conversations
            } else {
                &mut inner.documents
            };
            if let Some(entry) = entries.get_mut(index) {
                entry.embeddings.insert(key.clone(), vector);
                entry.metadata.model_versions.insert(key.clone(), version);
                entry.metadata.available_models = entry.embeddings.keys().cloned().collect();
                added += 1;
            }
        }

        if added > 0 {
            info!(added, "backfilled multi-model embeddings");
            self.persist_conversations()?;
            self.persist_documents()?;
        }
        Ok(added)
    }

    /// Count of entries carrying each model key's vectors.
    #[must_use]
    pub fn available_models(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        if let Ok(inner) = self.inner.lock() {
            for entry in inner.conversations.iter().chain(inner.documents.iter()) {
                for key in entry.embeddings.keys() {
                    *counts.entry(key.clone()).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    /// Most recent conversation messages, newest first, with previews.
    #[must_use]
    pub fn list_recent_conversations(&self, limit: usize) -> Vec<EntryPreview> {
        self.list_recent(true, limit)
    }

    /// Most recent documents, newest first, with previews.
    #[must_use]
    pub fn list_recent_documents(&self, limit: usize) -> Vec<EntryPreview> {
        self.list_recent(false, limit)
    }

    fn list_recent(&self, conversations: bool, limit: usize) -> Vec<EntryPreview> {
        let Ok(inner) = self.inner.lock() else {
            return Vec::new();
        };
        let entries = if conversations {
            &inner.conversations
        } else {
            &inner.documents
        };
        entries
            .iter()
            .rev()
            .take(limit)
            .map(|entry| EntryPreview {
                id: entry.id.clone(),
                role: entry.role,
                text_preview: preview(&entry.text),
                created_at: entry.metadata.created_at,
            })
            .collect()
    }

    /// Removes one conversation message by ID. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Persist`] if the store cannot be written.
    pub fn remove_conversation_message(&self, message_id: &str) -> Result<bool, MemoryError> {
        let removed = {
            let mut inner = self.lock()?;
            let before = inner.conversations.len();
            inner.conversations.retain(|entry| entry.id != message_id);
            inner.conversations.len() < before
        };
        if removed {
            self.persist_conversations()?;
        }
        Ok(removed)
    }

    /// Removes the most recent `count` conversation messages, returning how
    /// many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Persist`] if the store cannot be written.
    pub fn remove_recent_conversations(&self, count: usize) -> Result<usize, MemoryError> {
        let removed = {
            let mut inner = self.lock()?;
            let len = inner.conversations.len();
            let removed = count.min(len);
            inner.conversations.truncate(len - removed);
            removed
        };
        self.persist_conversations()?;
        Ok(removed)
    }

    /// Removes one document by ID. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Persist`] if the store cannot be written.
    pub fn remove_document(&self, document_id: &str) -> Result<bool, MemoryError> {
        let removed = {
            let mut inner = self.lock()?;
            let before = inner.documents.len();
            inner.documents.retain(|entry| entry.id != document_id);
            inner.documents.len() < before
        };
        if removed {
            self.persist_documents()?;
        }
        Ok(removed)
    }

    /// Returns a stored conversation entry by ID (used by tests and stats).
    #[must_use]
    pub fn get_conversation(&self, id: &str) -> Option<MultiModelEntry> {
        self.inner
            .lock()
            .ok()?
            .conversations
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
    }

    /// Entry counts as `(conversations, documents)`.
    #[must_use]
    pub fn counts(&self) -> (usize, usize) {
        self.inner
            .lock()
            .map_or((0, 0), |inner| (inner.conversations.len(), inner.documents.len()))
    }

    fn persist_conversations(&self) -> Result<(), MemoryError> {
        let inner = self.lock()?;
        persist::write_json_atomic(&self.conversations_path, &inner.conversations).map_err(|e| {
            MemoryError::Persist {
                path: self.conversations_path.clone(),
                message: e.to_string(),
            }
        })
    }

    fn persist_documents(&self) -> Result<(), MemoryError> {
        let inner = self.lock()?;
        persist::write_json_atomic(&self.documents_path, &inner.documents).map_err(|e| {
            MemoryError::Persist {
                path: self.documents_path.clone(),
                message: e.to_string(),
            }
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, MemoryError> {
        self.inner.lock().map_err(|_| MemoryError::Persist {
            path: self.conversations_path.clone(),
            message: "multi-model lock poisoned".to_string(),
        })
    }
}

/// First 100 characters of a text, with an ellipsis when truncated.
fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(100).collect();
    if text.chars().count() > 100 {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::ModelInfo;
    use async_trait::async_trait;

    /// Deterministic embedder producing vectors of a fixed dimension.
    struct DimEmbedder {
        name: &'static str,
        dim: usize,
    }

    #[async_trait]
    impl Embedder for DimEmbedder {
        async fn embed(&self, text: &str, _kind: PromptKind) -> Vec<f32> {
            crate::embedding::backends::random_embedding(text, self.dim)
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
                model_name: self.name.to_string(),
                dim: self.dim,
                device: None,
                cache_size: 0,
            }
        }
    }

    fn model_map(entries: &[(&str, usize)]) -> ModelMap {
        entries
            .iter()
            .map(|&(name, dim)| {
                let key = format!("{name}:{dim}");
                let embedder: Arc<dyn Embedder> = Arc::new(DimEmbedder {
                    name: Box::leak(name.to_string().into_boxed_str()),
                    dim,
                });
                (key, embedder)
            })
            .collect()
    }

    #[test]
    fn test_key_dim() {
        assert_eq!(key_dim("bge-m3:1024"), Some(1024));
        assert_eq!(key_dim("gemma:768"), Some(768));
        assert_eq!(key_dim("nodim"), None);
    }

    #[tokio::test]
    async fn test_store_records_all_models() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let storage = MultiModelStorage::open(dir.path());
        let models = model_map(&[("alpha", 8), ("beta", 16)]);

        let id = storage
            .store_conversation("hello multi model", Role::User, &models)
            .await
            .unwrap_or_else(|_| unreachable!());

        let entry = storage.get_conversation(&id).unwrap_or_else(|| unreachable!());
        assert_eq!(entry.embeddings["alpha:8"].len(), 8);
        assert_eq!(entry.embeddings["beta:16"].len(), 16);
        assert_eq!(entry.metadata.available_models, vec!["alpha:8", "beta:16"]);
    }

    #[tokio::test]
    async fn test_backfill_adds_missing_models_preserving_text() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let storage = MultiModelStorage::open(dir.path());

        let first = model_map(&[("alpha", 8)]);
        let id = storage
            .store_conversation("migrate me", Role::User, &first)
            .await
            .unwrap_or_else(|_| unreachable!());

        let both = model_map(&[("alpha", 8), ("beta", 16)]);
        let added = storage.backfill(&both).await.unwrap_or_else(|_| unreachable!());
        assert_eq!(added, 1);

        let entry = storage.get_conversation(&id).unwrap_or_else(|| unreachable!());
        assert_eq!(entry.text, "migrate me");
        assert_eq!(entry.embeddings["alpha:8"].len(), 8);
        assert_eq!(entry.embeddings["beta:16"].len(), 16);
        assert_eq!(entry.metadata.available_models, vec!["alpha:8", "beta:16"]);
    }

    #[tokio::test]
    async fn test_search_uses_one_model_space() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let storage = MultiModelStorage::open(dir.path());
        let models = model_map(&[("alpha", 8)]);

        storage
            .store_conversation("the target text", Role::User, &models)
            .await
            .unwrap_or_else(|_| unreachable!());

        let query = crate::embedding::backends::random_embedding("the target text", 8);
        let hits = storage.search_conversations(&query, "alpha:8", 5, 0.9);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].similarity > 0.99);

        // No vectors under an unknown key.
        assert!(storage.search_conversations(&query, "gamma:8", 5, 0.0).is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_skipped() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let storage = MultiModelStorage::open(dir.path());

        // Key declares 32 dims but the embedder emits 8.
        let mut models: ModelMap = BTreeMap::new();
        models.insert(
            "alpha:32".to_string(),
            Arc::new(DimEmbedder { name: "alpha", dim: 8 }) as Arc<dyn Embedder>,
        );

        let id = storage
            .store_conversation("mismatch", Role::User, &models)
            .await
            .unwrap_or_else(|_| unreachable!());
        let entry = storage.get_conversation(&id).unwrap_or_else(|| unreachable!());
        assert!(entry.embeddings.is_empty());
    }

    #[tokio::test]
    async fn test_management_operations() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let storage = MultiModelStorage::open(dir.path());
        let models = model_map(&[("alpha", 8)]);

        let long_text = "x".repeat(150);
        let id1 = storage
            .store_conversation(&long_text, Role::User, &models)
            .await
            .unwrap_or_else(|_| unreachable!());
        let _id2 = storage
            .store_conversation("short", Role::Assistant, &models)
            .await
            .unwrap_or_else(|_| unreachable!());

        let listed = storage.list_recent_conversations(10);
        assert_eq!(listed.len(), 2);
        // Newest first.
        assert_eq!(listed[0].text_preview, "short");
        assert!(listed[1].text_preview.ends_with("..."));
        assert_eq!(listed[1].text_preview.chars().count(), 103);

        assert!(storage
            .remove_conversation_message(&id1)
            .unwrap_or_else(|_| unreachable!()));
        assert_eq!(storage.counts().0, 1);

        let removed = storage
            .remove_recent_conversations(5)
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(removed, 1);
        assert_eq!(storage.counts().0, 0);
    }
}
