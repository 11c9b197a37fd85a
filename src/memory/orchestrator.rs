//! Memory orchestrator: composes the four tiers behind one interface.
//!
//! Enforces tier transitions (paging-out at 80% of the working cap,
//! eviction-to-archival via a channel-drained sink, promotion of highly
//! relevant archival hits back into active memory) and fans retrieval out
//! across all tiers in parallel.
//!
//! # Architecture
//!
//! ```text
//! add_user / add_assistant → WorkingMemory
//!   └── is_full → page_out_oldest(10) → ActiveMemory
//!         └── LRU eviction → channel → archival drain task
//! get_context_for_query → embed(query)
//!   ├── working search   (threshold 0.3)
//!   ├── active search    (threshold 0.3, marks access)
//!   ├── archival search  (score > 0.8 → promote to active)
//!   └── knowledge search
//!   → merge: score desc, then working > active > archival > knowledge
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{Config, MemoryConfig, PriorityModel};
use crate::embedding::{Embedder, EmbeddingService, ModelInfo, PromptKind, cosine_similarity};
use crate::error::MemoryError;

use super::active::{ActiveMemory, EvictionSink};
use super::archival::ArchivalMemory;
use super::knowledge::{KnowledgeBase, NewDocument};
use super::message::{Message, Role};
use super::multi_model::{ModelMap, MultiModelStorage};
use super::page::{Page, PageContent, PageKind, PageMessage};
use super::working::WorkingMemory;

/// Similarity gate for working- and active-tier matches.
const TIER_MATCH_THRESHOLD: f32 = 0.3;
/// Eager-promotion score used by the retrieval loop. Stricter than the
/// configured `promotion_threshold` field, which gates the promotion call
/// itself; both values are part of the default policy.
const PROMOTION_SCORE: f32 = 0.8;
/// Messages per page-out batch.
const PAGE_OUT_BATCH: usize = 10;
/// Default number of context items returned.
pub const DEFAULT_CONTEXT_ITEMS: usize = 10;
/// Content-prefix length for multi-model result deduplication.
const DEDUP_PREFIX_CHARS: usize = 100;

/// Which tier produced a context item. Priority breaks score ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    /// Working memory message.
    WorkingMemory,
    /// Active memory page.
    ActiveMemory,
    /// Archival memory item.
    ArchivalMemory,
    /// Knowledge base chunk.
    KnowledgeBase,
    /// Multi-model store entry.
    MultiModel,
}

impl ContextSource {
    /// Tie-break priority: lower wins on equal score.
    const fn priority(self) -> u8 {
        match self {
            Self::WorkingMemory => 0,
            Self::ActiveMemory | Self::MultiModel => 1,
            Self::ArchivalMemory => 2,
            Self::KnowledgeBase => 3,
        }
    }
}

/// One ranked context item from any tier.
#[derive(Debug, Clone, Serialize)]
pub struct ContextItem {
    /// Producing tier.
    pub source: ContextSource,
    /// Item text.
    pub content: String,
    /// Relevance score.
    pub relevance: f32,
    /// Page ID, for active-tier items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    /// Item metadata, for archival items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Model key that scored the item, in multi-model mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
}

/// Result of ending a conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    /// Active-memory page holding the full conversation.
    pub page_id: String,
    /// Archival item linked to the page.
    pub archival_id: String,
    /// Generated topic summary.
    pub summary: String,
    /// Number of messages archived.
    pub message_count: usize,
}

/// Forwards evicted pages into the archival drain channel.
struct ArchiveSink {
    tx: mpsc::UnboundedSender<Page>,
}

impl EvictionSink for ArchiveSink {
    fn on_evict(&self, page: Page) {
        if self.tx.send(page).is_err() {
            warn!("archival drain closed; evicted page dropped");
        }
    }
}

/// Saved state snapshot shape for `save_state`/`load_state`.
#[derive(Debug, Serialize, Deserialize)]
struct StateSnapshot {
    working_memory: WorkingMemory,
    active_pages: Vec<Page>,
    current_conversation: Vec<PageMessage>,
    embedding_info: ModelInfo,
    timestamp: chrono::DateTime<Utc>,
}

/// Unified memory system across working, active, archival, and knowledge
/// tiers, with optional multi-model retrieval.
pub struct MemoryOrchestrator {
    embedder: Arc<dyn Embedder>,
    service: Option<Arc<EmbeddingService>>,
    working: Mutex<WorkingMemory>,
    active: Mutex<ActiveMemory>,
    archival: Arc<ArchivalMemory>,
    knowledge: Arc<KnowledgeBase>,
    multi_model: Arc<MultiModelStorage>,
    multi_model_enabled: AtomicBool,
    models: Mutex<ModelMap>,
    priority_models: Vec<PriorityModel>,
    current_conversation: Mutex<Vec<PageMessage>>,
    memory_config: MemoryConfig,
    embedding_config: crate::config::EmbeddingConfig,
    data_dir: std::path::PathBuf,
}

impl std::fmt::Debug for MemoryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryOrchestrator")
            .field("multi_model_enabled", &self.multi_model_enabled())
            .finish_non_exhaustive()
    }
}

impl MemoryOrchestrator {
    /// Builds the full tier stack from configuration.
    ///
    /// Must be called within a tokio runtime: the archival drain task for
    /// evicted pages is spawned here.
    #[must_use]
    pub fn from_config(config: &Config) -> Arc<Self> {
        let cache_dir = config.data_dir.join("embedding_cache");
        let service = Arc::new(EmbeddingService::new(&config.embedding, &cache_dir));
        Self::build(service.clone() as Arc<dyn Embedder>, Some(service), config)
    }

    /// Builds the tier stack with an injected embedder (tests, embedded use).
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, config: &Config) -> Arc<Self> {
        Self::build(embedder, None, config)
    }

    fn build(
        embedder: Arc<dyn Embedder>,
        service: Option<Arc<EmbeddingService>>,
        config: &Config,
    ) -> Arc<Self> {
        let archival = Arc::new(ArchivalMemory::open(
            embedder.clone(),
            &config.data_dir.join("archival"),
            "memory",
        ));
        let knowledge = Arc::new(KnowledgeBase::open(
            embedder.clone(),
            &config.data_dir.join("knowledge"),
            "knowledge",
        ));
        let multi_model = Arc::new(MultiModelStorage::open(&config.data_dir));

        let (tx, mut rx) = mpsc::unbounded_channel::<Page>();
        let mut active = ActiveMemory::new(config.memory.active_memory_max_pages);
        active.set_sink(Arc::new(ArchiveSink { tx }));

        // Drain evicted pages into archival memory off the hot path.
        let drain_archival = archival.clone();
        tokio::spawn(async move {
            while let Some(page) = rx.recv().await {
                if let Err(e) = drain_archival.store_page(&page).await {
                    error!(page_id = %page.id, error = %e, "failed to archive evicted page");
                }
            }
        });

        let orchestrator = Arc::new(Self {
            embedder,
            service,
            working: Mutex::new(WorkingMemory::new(config.memory.working_memory_max_tokens)),
            active: Mutex::new(active),
            archival,
            knowledge,
            multi_model,
            multi_model_enabled: AtomicBool::new(config.multi_model.enabled),
            models: Mutex::new(ModelMap::new()),
            priority_models: config.multi_model.priority_models.clone(),
            current_conversation: Mutex::new(Vec::new()),
            memory_config: config.memory.clone(),
            embedding_config: config.embedding.clone(),
            data_dir: config.data_dir.clone(),
        });

        info!(
            backend = %orchestrator.embedder.model_info().backend,
            model = %orchestrator.embedder.model_info().model_name,
            "memory orchestrator initialised"
        );
        orchestrator
    }

    // -----------------------------------------------------------------------
    // Message ingestion and paging
    // -----------------------------------------------------------------------

    /// Adds a user message, paging out when working memory fills.
    pub async fn add_user(&self, message: &str) {
        self.add_message(Role::User, message).await;
    }

    /// Adds an assistant message, paging out when working memory fills.
    pub async fn add_assistant(&self, message: &str) {
        self.add_message(Role::Assistant, message).await;
    }

    async fn add_message(&self, role: Role, message: &str) {
        let is_full = {
            let mut working = match self.working.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            working.add(role, message);
            working.is_full()
        };

        if let Ok(mut conversation) = self.current_conversation.lock() {
            conversation.push(PageMessage {
                role,
                content: message.to_string(),
            });
        }

        if self.multi_model_enabled() {
            let models = self.models_snapshot();
            if !models.is_empty()
                && let Err(e) = self
                    .multi_model
                    .store_conversation(message, role, &models)
                    .await
            {
                warn!(error = %e, "multi-model conversation store failed");
            }
        }

        if is_full {
            self.page_out_oldest(PAGE_OUT_BATCH).await;
        }
    }

    /// Moves the oldest `n` working-memory messages into a new active page.
    pub async fn page_out_oldest(&self, n: usize) {
        let removed: Vec<Message> = self
            .working
            .lock()
            .map(|mut working| working.remove_oldest(n))
            .unwrap_or_default();
        if removed.is_empty() {
            return;
        }

        let messages: Vec<PageMessage> = removed
            .into_iter()
            .map(|m| PageMessage {
                role: m.role,
                content: m.content,
            })
            .collect();

        let page_id = self.active.lock().map(|mut active| {
            active.add_page(
                PageContent::Conversation {
                    messages,
                    timestamp: Utc::now(),
                    summary: None,
                },
                PageKind::Conversation,
            )
        });
        if let Ok(page_id) = page_id {
            debug!(page_id = %page_id, count = n, "paged out oldest messages");
        }
    }

    /// Ends the current conversation: summarises it, stores it as an
    /// active page AND an archival item linked to the page, then clears
    /// working memory and the conversation buffer.
    ///
    /// Returns `None` when there is no conversation to end.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Persist`] if archival persistence fails.
    pub async fn end_conversation(&self) -> Result<Option<ConversationSummary>, MemoryError> {
        let conversation: Vec<PageMessage> = self
            .current_conversation
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default();
        if conversation.is_empty() {
            return Ok(None);
        }

        let summary = summarise_conversation(&conversation);
        let message_count = conversation.len();

        let conversation_text = conversation
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let page_id = self
            .active
            .lock()
            .map(|mut active| {
                active.add_page(
                    PageContent::Conversation {
                        messages: conversation,
                        timestamp: Utc::now(),
                        summary: Some(summary.clone()),
                    },
                    PageKind::ConversationComplete,
                )
            })
            .unwrap_or_default();

        let archival_id = self
            .archival
            .store(
                &conversation_text,
                json!({
                    "type": "conversation",
                    "timestamp": Utc::now(),
                    "message_count": message_count,
                    "summary": summary,
                    "page_id": page_id,
                }),
            )
            .await?;

        if let Ok(mut working) = self.working.lock() {
            working.clear();
        }
        if let Ok(mut conversation) = self.current_conversation.lock() {
            conversation.clear();
        }

        info!(page_id = %page_id, archival_id = %archival_id, "conversation ended and archived");
        Ok(Some(ConversationSummary {
            page_id,
            archival_id,
            summary,
            message_count,
        }))
    }

    // -----------------------------------------------------------------------
    // Retrieval
    // -----------------------------------------------------------------------

    /// Retrieves ranked context from all tiers in parallel.
    ///
    /// Results are merged by descending score with ties broken by source
    /// priority (working > active > archival > knowledge) and truncated to
    /// `max_items`. A failing sub-search contributes nothing; the other
    /// tiers still answer.
    pub async fn get_context_for_query(&self, query: &str, max_items: usize) -> Vec<ContextItem> {
        let mut items = if self.multi_model_enabled() && !self.models_snapshot().is_empty() {
            let (multi, archival, knowledge) = tokio::join!(
                self.search_multi_model(query, max_items),
                self.search_archival(query, max_items),
                self.search_knowledge(query, max_items),
            );
            let mut items = dedup_by_prefix(multi);
            items.extend(archival);
            items.extend(knowledge);
            items
        } else {
            let query_embedding = self.embedder.embed(query, PromptKind::Query).await;
            let (working, active, archival, knowledge) = tokio::join!(
                self.search_working(&query_embedding),
                self.search_active(&query_embedding),
                self.search_archival(query, max_items),
                self.search_knowledge(query, max_items),
            );
            let mut items = working;
            items.extend(active);
            items.extend(archival);
            items.extend(knowledge);
            items
        };

        items.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source.priority().cmp(&b.source.priority()))
        });
        items.truncate(max_items);
        items
    }

    /// Working-memory sub-search: embeds each message concurrently, keeps
    /// similarity above the tier threshold.
    async fn search_working(&self, query_embedding: &[f32]) -> Vec<ContextItem> {
        let messages: Vec<Message> = self
            .working
            .lock()
            .map(|working| working.messages().to_vec())
            .unwrap_or_default();

        let embeddings = join_all(
            messages
                .iter()
                .map(|m| self.embedder.embed(&m.content, PromptKind::Passage)),
        )
        .await;

        messages
            .into_iter()
            .zip(embeddings)
            .filter_map(|(message, embedding)| {
                let similarity = cosine_similarity(query_embedding, &embedding);
                (similarity > TIER_MATCH_THRESHOLD).then(|| ContextItem {
                    source: ContextSource::WorkingMemory,
                    content: message.content,
                    relevance: similarity,
                    page_id: None,
                    metadata: None,
                    model_used: None,
                })
            })
            .collect()
    }

    /// Active-memory sub-search: embeds the JSON-serialised page content,
    /// keeps similarity above the tier threshold, and marks matched pages
    /// as accessed.
    async fn search_active(&self, query_embedding: &[f32]) -> Vec<ContextItem> {
        let pages: Vec<(String, String, String)> = self
            .active
            .lock()
            .map(|active| {
                active
                    .pages()
                    .iter()
                    .map(|p| (p.id.clone(), p.content_json(), p.content.as_text()))
                    .collect()
            })
            .unwrap_or_default();

        let embeddings = join_all(
            pages
                .iter()
                .map(|(_, content_json, _)| self.embedder.embed(content_json, PromptKind::Passage)),
        )
        .await;

        let mut items = Vec::new();
        for ((page_id, _, content_text), embedding) in pages.into_iter().zip(embeddings) {
            let similarity = cosine_similarity(query_embedding, &embedding);
            if similarity > TIER_MATCH_THRESHOLD {
                if let Ok(mut active) = self.active.lock() {
                    active.mark_accessed(&page_id);
                }
                items.push(ContextItem {
                    source: ContextSource::ActiveMemory,
                    content: content_text,
                    relevance: similarity,
                    page_id: Some(page_id),
                    metadata: None,
                    model_used: None,
                });
            }
        }
        items
    }

    /// Archival sub-search with eager promotion of high-relevance hits.
    async fn search_archival(&self, query: &str, max_items: usize) -> Vec<ContextItem> {
        let hits = self.archival.search(query, max_items).await;

        let mut items = Vec::new();
        for hit in hits {
            let mut metadata = hit.metadata.clone();
            if hit.relevance_score > PROMOTION_SCORE
                && let Some(promoted_id) = self.promote_archival_to_active(
                    &hit.id,
                    &hit.text,
                    &hit.metadata,
                    hit.relevance_score,
                )
                && (metadata.is_object() || metadata.is_null())
            {
                metadata["promoted_to_active"] = json!(promoted_id);
            }
            items.push(ContextItem {
                source: ContextSource::ArchivalMemory,
                content: hit.text,
                relevance: hit.relevance_score,
                page_id: None,
                metadata: Some(metadata),
                model_used: None,
            });
        }
        items
    }

    /// Knowledge sub-search.
    async fn search_knowledge(&self, query: &str, max_items: usize) -> Vec<ContextItem> {
        self.knowledge
            .query(query, max_items)
            .await
            .into_iter()
            .map(|(content, score)| ContextItem {
                source: ContextSource::KnowledgeBase,
                content,
                relevance: score,
                page_id: None,
                metadata: None,
                model_used: None,
            })
            .collect()
    }

    /// Multi-model sub-search replacing the working/active embedding path:
    /// each priority key with a registered embedder searches its own vector
    /// space over the conversation and document stores.
    async fn search_multi_model(&self, query: &str, max_items: usize) -> Vec<ContextItem> {
        let models = self.models_snapshot();
        let mut items = Vec::new();

        for model in &self.priority_models {
            let Some(embedder) = models.get(&model.key) else {
                continue;
            };
            let query_vector = embedder.embed(query, PromptKind::Query).await;

            let conversations = self.multi_model.search_conversations(
                &query_vector,
                &model.key,
                max_items,
                TIER_MATCH_THRESHOLD,
            );
            let documents = self.multi_model.search_documents(
                &query_vector,
                &model.key,
                max_items,
                TIER_MATCH_THRESHOLD,
            );

            for hit in conversations.into_iter().chain(documents) {
                items.push(ContextItem {
                    source: ContextSource::MultiModel,
                    content: hit.text,
                    relevance: hit.similarity,
                    page_id: None,
                    metadata: None,
                    model_used: Some(hit.model_used),
                });
            }
        }
        items
    }

    /// Promotes an archival hit back into active memory as a `promoted`
    /// page. Never duplicates: when the hit's originating page is still
    /// resident, its access metadata is refreshed instead.
    fn promote_archival_to_active(
        &self,
        archival_id: &str,
        text: &str,
        metadata: &Value,
        relevance_score: f32,
    ) -> Option<String> {
        if relevance_score < self.memory_config.promotion_threshold {
            return None;
        }

        let original_page_id = metadata.get("page_id").and_then(Value::as_str);

        let mut active = self.active.lock().ok()?;
        if let Some(page_id) = original_page_id
            && active.contains(page_id)
        {
            active.mark_accessed(page_id);
            return Some(page_id.to_string());
        }

        let page_id = active.add_page(
            PageContent::Promoted {
                source_ref: archival_id.to_string(),
                body: text.to_string(),
            },
            PageKind::Promoted,
        );
        debug!(archival_id = %archival_id, page_id = %page_id, score = relevance_score, "promoted archival item");
        Some(page_id)
    }

    // -----------------------------------------------------------------------
    // Knowledge and multi-model surface
    // -----------------------------------------------------------------------

    /// Adds documents to the knowledge base (and, when multi-model mode is
    /// on, to the multi-model document store).
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Persist`] if persistence fails.
    pub async fn add_documents(&self, documents: Vec<NewDocument>) -> Result<Vec<String>, MemoryError> {
        if self.multi_model_enabled() {
            let models = self.models_snapshot();
            if !models.is_empty() {
                for doc in &documents {
                    self.multi_model
                        .store_document(&doc.text, doc.metadata.clone(), &models)
                        .await?;
                }
            }
        }
        self.knowledge.add(documents).await
    }

    /// Registers an embedder under a model key for multi-model operation.
    pub fn register_model(&self, key: impl Into<String>, embedder: Arc<dyn Embedder>) {
        if let Ok(mut models) = self.models.lock() {
            models.insert(key.into(), embedder);
        }
    }

    /// Enables multi-model mode, loading the configured priority models
    /// when none are registered yet. Returns whether the mode is active.
    pub fn enable_multi_model(&self) -> bool {
        let mut loaded = false;
        if let Ok(mut models) = self.models.lock() {
            if models.is_empty() {
                for model in &self.priority_models {
                    let cache_dir = self
                        .data_dir
                        .join("embedding_cache")
                        .join(model.key.replace(':', "_"));
                    let config = crate::config::EmbeddingConfig {
                        model_name: model.model_name.clone(),
                        embedding_dim: model.dim,
                        ..self.embedding_config.clone()
                    };
                    let service = EmbeddingService::new(&config, &cache_dir);
                    models.insert(model.key.clone(), Arc::new(service) as Arc<dyn Embedder>);
                    loaded = true;
                }
            } else {
                loaded = true;
            }
        }
        if loaded {
            self.multi_model_enabled.store(true, Ordering::SeqCst);
        }
        loaded
    }

    /// Disables multi-model mode.
    pub fn disable_multi_model(&self) {
        self.multi_model_enabled.store(false, Ordering::SeqCst);
    }

    /// Whether multi-model mode is active.
    #[must_use]
    pub fn multi_model_enabled(&self) -> bool {
        self.multi_model_enabled.load(Ordering::SeqCst)
    }

    /// Backfills missing model vectors across stored multi-model entries.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Persist`] if the stores cannot be written.
    pub async fn backfill_multi_model(&self) -> Result<usize, MemoryError> {
        let models = self.models_snapshot();
        self.multi_model.backfill(&models).await
    }

    /// Registered model keys, priority order first.
    #[must_use]
    pub fn registered_model_keys(&self) -> Vec<String> {
        self.models
            .lock()
            .map(|models| models.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn models_snapshot(&self) -> ModelMap {
        self.models.lock().map(|models| models.clone()).unwrap_or_default()
    }

    /// The multi-model store (management operations).
    #[must_use]
    pub fn multi_model_store(&self) -> &Arc<MultiModelStorage> {
        &self.multi_model
    }

    /// The knowledge base.
    #[must_use]
    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    /// The archival store.
    #[must_use]
    pub fn archival_memory(&self) -> &Arc<ArchivalMemory> {
        &self.archival
    }

    // -----------------------------------------------------------------------
    // Model management and stats
    // -----------------------------------------------------------------------

    /// Changes the active embedding model. Only available when the
    /// orchestrator owns a concrete [`EmbeddingService`].
    pub fn set_embedding_model(&self, model_name: &str, backend: Option<crate::config::BackendKind>) -> bool {
        self.service
            .as_ref()
            .is_some_and(|service| service.change_model(model_name, backend))
    }

    /// Current embedding model descriptor.
    #[must_use]
    pub fn embedding_info(&self) -> ModelInfo {
        self.embedder.model_info()
    }

    /// Per-tier statistics.
    #[must_use]
    pub fn memory_stats(&self) -> Value {
        let (working_messages, token_count, max_tokens) = self
            .working
            .lock()
            .map(|w| (w.len(), w.token_count(), w.max_tokens()))
            .unwrap_or((0, 0, 0));
        let active_pages = self.active.lock().map(|a| a.len()).unwrap_or(0);
        let (mm_conversations, mm_documents) = self.multi_model.counts();

        json!({
            "working_memory": {
                "messages": working_messages,
                "token_count": token_count,
                "max_tokens": max_tokens,
            },
            "active_memory": {
                "pages": active_pages,
                "max_pages": self.memory_config.active_memory_max_pages,
            },
            "archival_memory": {
                "items": self.archival.len(),
            },
            "knowledge_base": {
                "documents": self.knowledge.document_count(),
                "chunks": self.knowledge.chunk_count(),
            },
            "multi_model": {
                "enabled": self.multi_model_enabled(),
                "conversations": mm_conversations,
                "documents": mm_documents,
                "models": self.multi_model.available_models(),
            },
            "embedding": self.embedding_info(),
        })
    }

    /// Number of pages currently in active memory.
    #[must_use]
    pub fn active_page_count(&self) -> usize {
        self.active.lock().map(|a| a.len()).unwrap_or(0)
    }

    /// Snapshot of active pages (read-only view for tools and tests).
    #[must_use]
    pub fn active_pages(&self) -> Vec<Page> {
        self.active
            .lock()
            .map(|a| a.pages().to_vec())
            .unwrap_or_default()
    }

    /// Working-memory messages (read-only view).
    #[must_use]
    pub fn working_messages(&self) -> Vec<Message> {
        self.working
            .lock()
            .map(|w| w.messages().to_vec())
            .unwrap_or_default()
    }

    /// Current working-memory token count.
    #[must_use]
    pub fn working_token_count(&self) -> usize {
        self.working.lock().map(|w| w.token_count()).unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // State persistence
    // -----------------------------------------------------------------------

    /// Writes a snapshot of working memory, active pages, and the current
    /// conversation buffer (plus the embedding descriptor) to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Persist`] on I/O failure.
    pub fn save_state(&self, path: &Path) -> Result<(), MemoryError> {
        let snapshot = StateSnapshot {
            working_memory: self
                .working
                .lock()
                .map(|w| w.clone())
                .unwrap_or_else(|_| WorkingMemory::new(self.memory_config.working_memory_max_tokens)),
            active_pages: self.active_pages(),
            current_conversation: self
                .current_conversation
                .lock()
                .map(|c| c.clone())
                .unwrap_or_default(),
            embedding_info: self.embedding_info(),
            timestamp: Utc::now(),
        };

        crate::persist::write_json_atomic(path, &snapshot).map_err(|e| MemoryError::Persist {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Restores a snapshot written by [`Self::save_state`].
    ///
    /// A snapshot produced under a different embedding model loads anyway;
    /// the mismatch is logged as a warning.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::StateLoad`] when the file is missing or
    /// malformed.
    pub fn load_state(&self, path: &Path) -> Result<(), MemoryError> {
        let bytes = std::fs::read(path).map_err(|e| MemoryError::StateLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let snapshot: StateSnapshot =
            serde_json::from_slice(&bytes).map_err(|e| MemoryError::StateLoad {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let live = self.embedding_info();
        if snapshot.embedding_info.model_name != live.model_name
            || snapshot.embedding_info.backend != live.backend
        {
            warn!(
                saved_model = %snapshot.embedding_info.model_name,
                live_model = %live.model_name,
                "snapshot was created under a different embedding model"
            );
        }

        if let Ok(mut working) = self.working.lock() {
            *working = snapshot.working_memory;
        }
        if let Ok(mut active) = self.active.lock() {
            // The existing tier keeps its eviction sink; only pages change.
            active.replace_pages(snapshot.active_pages);
        }
        if let Ok(mut conversation) = self.current_conversation.lock() {
            *conversation = snapshot.current_conversation;
        }

        info!(path = %path.display(), "memory state restored");
        Ok(())
    }
}

/// Removes multi-model duplicates by the first 100 characters of content.
fn dedup_by_prefix(items: Vec<ContextItem>) -> Vec<ContextItem> {
    let mut seen: HashSet<String> = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.content.chars().take(DEDUP_PREFIX_CHARS).collect()))
        .collect()
}

/// Builds the brief topic summary for an ended conversation: the top
/// stop-word-filtered words of length >= 4 appearing at least twice in the
/// user's messages.
fn summarise_conversation(conversation: &[PageMessage]) -> String {
    if conversation.len() <= 2 {
        return "Brief conversation with insufficient content for summarization".to_string();
    }

    let user_messages: Vec<&str> = conversation
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect();
    if user_messages.is_empty() {
        return "No user messages found in conversation".to_string();
    }

    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for message in &user_messages {
        for raw in message.split(|c: char| !c.is_ascii_alphabetic()) {
            let word = raw.to_lowercase();
            if word.len() >= 4 && !STOP_WORDS.contains(&word.as_str()) {
                *counts.entry(word).or_insert(0) += 1;
            }
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let topics: Vec<String> = ranked
        .into_iter()
        .take(5)
        .filter(|(_, count)| *count >= 2)
        .map(|(word, _)| word)
        .collect();

    if topics.is_empty() {
        "General conversation without specific focus".to_string()
    } else {
        format!("Conversation about {}", topics.join(", "))
    }
}

/// Stop words excluded from topic extraction.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "then", "else", "when", "at", "from", "by",
    "with", "about", "against", "between", "into", "through", "during", "before", "after",
    "above", "below", "to", "of", "in", "out", "on", "off", "over", "under", "again",
    "further", "once", "here", "there", "where", "why", "how", "all", "any", "both", "each",
    "few", "more", "most", "other", "some", "such", "no", "nor", "not", "only", "own",
    "same", "so", "than", "too", "very", "can", "will", "just", "dont", "should", "now",
    "am", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "having",
    "do", "does", "did", "doing", "would", "could", "shall", "might", "may", "must", "for",
    "that", "what", "which", "who", "whom", "this", "these", "those", "i", "me", "my",
    "mine", "myself", "you", "your", "yours", "yourself",
];
