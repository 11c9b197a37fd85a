//! Knowledge base: the document tier.
//!
//! Documents are chunked deterministically, each chunk embedded, and
//! queries return at most one chunk per document so results stay diverse
//! across sources. Documents sourced from a repository get deterministic
//! SHA-256-derived IDs so re-ingestion is idempotent.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{error, info};
use uuid::Uuid;

use crate::embedding::{Embedder, PromptKind, cosine_similarity};
use crate::error::MemoryError;
use crate::persist;

use super::chunker::chunk_text_default;

/// Where a document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Conversation-derived content.
    Chat,
    /// Source code.
    Code,
    /// Web content.
    Web,
    /// Manually curated content.
    Manual,
}

impl SourceType {
    /// Returns the lowercase string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Code => "code",
            Self::Web => "web",
            Self::Manual => "manual",
        }
    }

    /// Parses a source type; unknown values map to `Chat`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "code" => Self::Code,
            "web" => Self::Web,
            "manual" => Self::Manual,
            _ => Self::Chat,
        }
    }
}

/// Repository provenance for code documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitContext {
    /// Repository URL.
    pub repo_url: String,
    /// Path within the repository.
    pub file_path: String,
    /// Commit hash, when pinned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    /// Branch name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// A stored document with its chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Document ID (deterministic for repo-sourced code, opaque otherwise).
    pub id: String,
    /// Full original text.
    pub text: String,
    /// Ordered chunks covering the text.
    pub chunks: Vec<String>,
    /// Caller-supplied metadata.
    pub metadata: Value,
    /// Provenance class.
    pub source_type: SourceType,
    /// Repository provenance, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_context: Option<GitContext>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub last_updated: DateTime<Utc>,
}

/// One chunk's embedding, aligned with its document's chunk list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkEmbedding {
    /// Owning document ID.
    pub doc_id: String,
    /// Index into the document's chunk list.
    pub chunk_index: usize,
    /// The chunk vector.
    pub embedding: Vec<f32>,
    /// Denormalised source type for filtered queries.
    pub source_type: SourceType,
}

/// Input for [`KnowledgeBase::add`].
#[derive(Debug, Clone)]
pub struct NewDocument {
    /// Document text.
    pub text: String,
    /// Metadata to attach.
    pub metadata: Value,
    /// Provenance class.
    pub source_type: SourceType,
    /// Repository provenance, when known.
    pub git_context: Option<GitContext>,
}

impl NewDocument {
    /// A chat-sourced document with the given text and metadata.
    #[must_use]
    pub fn chat(text: impl Into<String>, metadata: Value) -> Self {
        Self {
            text: text.into(),
            metadata,
            source_type: SourceType::Chat,
            git_context: None,
        }
    }
}

/// On-disk collection shape: `{documents, embeddings, updated_at}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Collection {
    documents: Vec<Document>,
    embeddings: Vec<ChunkEmbedding>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Derives the deterministic document ID for repository-sourced content:
/// first 16 hex chars of `SHA256(repo_url ":" file_path [":" commit])`.
#[must_use]
pub fn repo_based_id(repo_url: &str, file_path: &str, commit_hash: Option<&str>) -> String {
    let mut content = format!("{repo_url}:{file_path}");
    if let Some(commit) = commit_hash {
        content.push(':');
        content.push_str(commit);
    }
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Document store with chunk-level semantic search.
pub struct KnowledgeBase {
    embedder: Arc<dyn Embedder>,
    path: PathBuf,
    inner: Mutex<Collection>,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("path", &self.path)
            .field("documents", &self.document_count())
            .finish_non_exhaustive()
    }
}

impl KnowledgeBase {
    /// Opens (or creates) the named collection under `data_dir`.
    #[must_use]
    pub fn open(embedder: Arc<dyn Embedder>, data_dir: &Path, collection_name: &str) -> Self {
        let path = data_dir.join(format!("{collection_name}.json"));
        let collection: Collection = persist::load_json_or_default(&path);
        if !collection.documents.is_empty() {
            info!(count = collection.documents.len(), "loaded knowledge base");
        }
        Self {
            embedder,
            path,
            inner: Mutex::new(collection),
        }
    }

    /// Adds documents, chunking and embedding each. Returns the document IDs.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Persist`] when the post-add flush fails.
    pub async fn add(&self, documents: Vec<NewDocument>) -> Result<Vec<String>, MemoryError> {
        let mut ids = Vec::with_capacity(documents.len());

        for doc in documents {
            let id = match (&doc.source_type, &doc.git_context) {
                (SourceType::Code, Some(git)) if !git.repo_url.is_empty() && !git.file_path.is_empty() => {
                    repo_based_id(&git.repo_url, &git.file_path, git.commit_hash.as_deref())
                }
                _ => Uuid::new_v4().to_string(),
            };

            let chunks = chunk_text_default(&doc.text);
            let vectors = self.embedder.embed_batch(&chunks).await;
            let now = Utc::now();

            let document = Document {
                id: id.clone(),
                text: doc.text,
                chunks,
                metadata: doc.metadata,
                source_type: doc.source_type,
                git_context: doc.git_context,
                created_at: now,
                last_updated: now,
            };

            {
                let mut inner = self.lock()?;
                for (chunk_index, embedding) in vectors.into_iter().enumerate() {
                    inner.embeddings.push(ChunkEmbedding {
                        doc_id: id.clone(),
                        chunk_index,
                        embedding,
                        source_type: document.source_type,
                    });
                }
                inner.documents.push(document);
            }
            ids.push(id);
        }

        self.persist()?;
        Ok(ids)
    }

    /// Top-`top_k` chunks for a query, at most one chunk per document.
    pub async fn query(&self, query_text: &str, top_k: usize) -> Vec<(String, f32)> {
        self.query_filtered(query_text, None, top_k).await
    }

    /// Like [`Self::query`] but restricted to one source type
    /// (`None` means all).
    pub async fn query_by_source_type(
        &self,
        query_text: &str,
        source_type: Option<SourceType>,
        top_k: usize,
    ) -> Vec<(String, f32)> {
        self.query_filtered(query_text, source_type, top_k).await
    }

    async fn query_filtered(
        &self,
        query_text: &str,
        source_type: Option<SourceType>,
        top_k: usize,
    ) -> Vec<(String, f32)> {
        if top_k == 0 {
            return Vec::new();
        }
        let query_vector = self.embedder.embed(query_text, PromptKind::Query).await;

        let Ok(inner) = self.inner.lock() else {
            return Vec::new();
        };

        let mut scored: Vec<(usize, f32)> = inner
            .embeddings
            .par_iter()
            .enumerate()
            .filter(|(_, chunk)| source_type.is_none_or(|s| chunk.source_type == s))
            .map(|(i, chunk)| (i, cosine_similarity(&query_vector, &chunk.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        // One chunk per document keeps results diverse across sources.
        let mut results = Vec::new();
        let mut seen_docs: HashSet<&str> = HashSet::new();
        for (i, score) in scored {
            if results.len() >= top_k {
                break;
            }
            let chunk = &inner.embeddings[i];
            if !seen_docs.insert(chunk.doc_id.as_str()) {
                continue;
            }
            let Some(document) = inner.documents.iter().find(|d| d.id == chunk.doc_id) else {
                continue;
            };
            if let Some(text) = document.chunks.get(chunk.chunk_index) {
                results.push((text.clone(), score));
            }
        }
        results
    }

    /// All documents from the given repository.
    #[must_use]
    pub fn get_by_repository(&self, repo_url: &str) -> Vec<Document> {
        self.inner.lock().map_or_else(
            |_| Vec::new(),
            |inner| {
                inner
                    .documents
                    .iter()
                    .filter(|d| {
                        d.git_context
                            .as_ref()
                            .is_some_and(|git| git.repo_url == repo_url)
                    })
                    .cloned()
                    .collect()
            },
        )
    }

    /// Removes a document and its chunk embeddings. Returns whether it
    /// existed.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Persist`] when the post-remove flush fails.
    pub fn remove(&self, document_id: &str) -> Result<bool, MemoryError> {
        let removed = {
            let mut inner = self.lock()?;
            let before = inner.documents.len();
            inner.documents.retain(|d| d.id != document_id);
            inner.embeddings.retain(|c| c.doc_id != document_id);
            inner.documents.len() < before
        };
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Number of stored documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.inner.lock().map_or(0, |inner| inner.documents.len())
    }

    /// Number of stored chunk embeddings.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.inner.lock().map_or(0, |inner| inner.embeddings.len())
    }

    /// Writes the collection to disk atomically.
    fn persist(&self) -> Result<(), MemoryError> {
        let mut inner = self.lock()?;
        inner.updated_at = Some(Utc::now());
        persist::write_json_atomic(&self.path, &*inner).map_err(|e| {
            error!(path = %self.path.display(), error = %e, "knowledge base persist failed");
            MemoryError::Persist {
                path: self.path.clone(),
                message: e.to_string(),
            }
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Collection>, MemoryError> {
        self.inner.lock().map_err(|_| MemoryError::Persist {
            path: self.path.clone(),
            message: "knowledge base lock poisoned".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::ModelInfo;
    use async_trait::async_trait;
    use serde_json::json;

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str, _kind: PromptKind) -> Vec<f32> {
            let lower = text.to_lowercase();
            if lower.contains("rust") {
                vec![1.0, 0.0]
            } else {
                vec![0.0, 1.0]
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
                dim: 2,
                device: None,
                cache_size: 0,
            }
        }
    }

    fn open_kb(dir: &Path) -> KnowledgeBase {
        KnowledgeBase::open(Arc::new(StubEmbedder), dir, "knowledge")
    }

    #[test]
    fn test_repo_based_id_is_deterministic() {
        let a = repo_based_id("https://example.com/repo.git", "src/lib.rs", None);
        let b = repo_based_id("https://example.com/repo.git", "src/lib.rs", None);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);

        let pinned = repo_based_id("https://example.com/repo.git", "src/lib.rs", Some("abc123"));
        assert_ne!(a, pinned);
    }

    #[tokio::test]
    async fn test_add_assigns_repo_id_for_code() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let kb = open_kb(dir.path());

        let ids = kb
            .add(vec![NewDocument {
                text: "fn main() {}".to_string(),
                metadata: json!({}),
                source_type: SourceType::Code,
                git_context: Some(GitContext {
                    repo_url: "https://example.com/r.git".to_string(),
                    file_path: "src/main.rs".to_string(),
                    commit_hash: None,
                    branch: None,
                }),
            }])
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(
            ids[0],
            repo_based_id("https://example.com/r.git", "src/main.rs", None)
        );
    }

    #[tokio::test]
    async fn test_query_one_chunk_per_document() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let kb = open_kb(dir.path());

        // One long rust document (multiple chunks) plus an unrelated one.
        let long_rust = "rust ownership and borrowing. ".repeat(60);
        kb.add(vec![
            NewDocument::chat(long_rust, json!({})),
            NewDocument::chat("gardening tips for spring", json!({})),
        ])
        .await
        .unwrap_or_else(|_| unreachable!());
        assert!(kb.chunk_count() > 2);

        let results = kb.query("rust language", 2).await;
        assert_eq!(results.len(), 2);
        // Highest-scoring chunk is from the rust doc; the second result must
        // come from the other document even though more rust chunks scored
        // higher.
        assert!(results[0].0.contains("rust"));
        assert!(results[1].0.contains("gardening"));
    }

    #[tokio::test]
    async fn test_query_by_source_type_filters() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let kb = open_kb(dir.path());

        kb.add(vec![
            NewDocument {
                text: "rust code sample".to_string(),
                metadata: json!({}),
                source_type: SourceType::Code,
                git_context: None,
            },
            NewDocument::chat("rust chat discussion", json!({})),
        ])
        .await
        .unwrap_or_else(|_| unreachable!());

        let results = kb
            .query_by_source_type("rust", Some(SourceType::Code), 5)
            .await;
        assert_eq!(results.len(), 1);
        assert!(results[0].0.contains("code sample"));
    }

    #[tokio::test]
    async fn test_remove_deletes_chunks_too() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let kb = open_kb(dir.path());

        let ids = kb
            .add(vec![NewDocument::chat("rust document", json!({}))])
            .await
            .unwrap_or_else(|_| unreachable!());

        assert!(kb.remove(&ids[0]).unwrap_or_else(|_| unreachable!()));
        assert_eq!(kb.document_count(), 0);
        assert_eq!(kb.chunk_count(), 0);
        assert!(!kb.remove(&ids[0]).unwrap_or_else(|_| unreachable!()));
    }

    #[tokio::test]
    async fn test_get_by_repository() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let kb = open_kb(dir.path());

        kb.add(vec![
            NewDocument {
                text: "repo file".to_string(),
                metadata: json!({}),
                source_type: SourceType::Code,
                git_context: Some(GitContext {
                    repo_url: "https://example.com/a.git".to_string(),
                    file_path: "a.rs".to_string(),
                    commit_hash: None,
                    branch: Some("main".to_string()),
                }),
            },
            NewDocument::chat("other", json!({})),
        ])
        .await
        .unwrap_or_else(|_| unreachable!());

        let docs = kb.get_by_repository("https://example.com/a.git");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "repo file");
    }

    #[tokio::test]
    async fn test_chunks_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        {
            let kb = open_kb(dir.path());
            kb.add(vec![NewDocument::chat("rust persisted", json!({}))])
                .await
                .unwrap_or_else(|_| unreachable!());
        }
        let kb = open_kb(dir.path());
        assert_eq!(kb.document_count(), 1);
        let results = kb.query("rust", 1).await;
        assert_eq!(results.len(), 1);
    }
}
