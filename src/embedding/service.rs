//! The embedding service: backend dispatch, caching, and fallback.
//!
//! Failure policy: any backend failure (network, model load, bad response)
//! logs and falls back to the deterministic random backend FOR THAT CALL.
//! The service never returns an error from `embed`/`embed_batch` - retrieval
//! callers always get a usable (if degraded) vector.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::{BackendKind, EmbeddingConfig};
use crate::error::EmbeddingError;

use super::backends::{LocalHttpBackend, RemoteApiBackend, random_embedding};
use super::cache::EmbeddingCache;
use super::{Embedder, ModelInfo, PromptKind};

/// Flush the cache after a batch this large of fresh embeddings.
const BATCH_FLUSH_THRESHOLD: usize = 50;

/// Active model descriptor, swappable at runtime via `change_model`.
#[derive(Debug, Clone)]
struct ModelState {
    backend: BackendKind,
    model_name: String,
    dim: usize,
    device: Option<String>,
}

/// Embedding service over the four back-ends with content-hash caching.
pub struct EmbeddingService {
    state: RwLock<ModelState>,
    cache: Mutex<EmbeddingCache>,
    cache_dir: PathBuf,
    server_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
    #[cfg(feature = "fastembed-embeddings")]
    in_process: RwLock<Option<std::sync::Arc<super::backends::in_process::InProcessModel>>>,
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("model_info", &self.model_info())
            .finish_non_exhaustive()
    }
}

impl EmbeddingService {
    /// Creates the service from configuration, loading any persisted cache
    /// for the configured model.
    ///
    /// An in-process model that fails to load is logged; subsequent embeds
    /// fall back to the random backend rather than failing construction.
    #[must_use]
    pub fn new(config: &EmbeddingConfig, cache_dir: &Path) -> Self {
        let service = Self {
            state: RwLock::new(ModelState {
                backend: config.backend,
                model_name: config.model_name.clone(),
                dim: config.embedding_dim,
                device: config.device.clone(),
            }),
            cache: Mutex::new(EmbeddingCache::open(cache_dir, &config.model_name)),
            cache_dir: cache_dir.to_path_buf(),
            server_url: config.server_url.clone(),
            api_key: config.api_key.clone(),
            http: reqwest::Client::new(),
            #[cfg(feature = "fastembed-embeddings")]
            in_process: RwLock::new(None),
        };

        if config.backend == BackendKind::InProcess {
            service.load_in_process_model(&config.model_name);
        }

        info!(
            backend = %config.backend,
            model = %config.model_name,
            "embedding service initialised"
        );
        service
    }

    /// Swaps the active model (and optionally backend), re-initialising the
    /// cache for the new model.
    ///
    /// Returns `false` when an in-process model fails to load; other
    /// back-ends cannot fail at switch time.
    pub fn change_model(&self, model_name: &str, backend: Option<BackendKind>) -> bool {
        let old_name;
        {
            let mut state = match self.state.write() {
                Ok(guard) => guard,
                Err(_) => return false,
            };
            old_name = state.model_name.clone();
            state.model_name = model_name.to_string();
            if let Some(kind) = backend {
                state.backend = kind;
            }
        }

        let active_backend = self.snapshot().backend;
        if active_backend == BackendKind::InProcess && !self.load_in_process_model(model_name) {
            return false;
        }

        // Each model gets its own cache file.
        if let Ok(mut cache) = self.cache.lock() {
            *cache = EmbeddingCache::open(&self.cache_dir, model_name);
        }

        info!(from = %old_name, to = %model_name, "changed embedding model");
        true
    }

    /// Writes the in-memory cache to disk now.
    pub fn flush_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.flush();
        }
    }

    fn snapshot(&self) -> ModelState {
        self.state.read().map_or_else(
            |_| ModelState {
                backend: BackendKind::Random,
                model_name: String::new(),
                dim: 768,
                device: None,
            },
            |guard| guard.clone(),
        )
    }

    /// Attempts to load the in-process model; logs on failure.
    #[cfg(feature = "fastembed-embeddings")]
    fn load_in_process_model(&self, model_name: &str) -> bool {
        match super::backends::in_process::InProcessModel::load(model_name) {
            Ok(model) => {
                let dim = model.dim();
                if let Ok(mut state) = self.state.write() {
                    state.dim = dim;
                }
                if let Ok(mut slot) = self.in_process.write() {
                    *slot = Some(std::sync::Arc::new(model));
                }
                info!(model = %model_name, dim, "loaded in-process embedding model");
                true
            }
            Err(e) => {
                error!(model = %model_name, error = %e, "failed to load in-process model");
                false
            }
        }
    }

    #[cfg(not(feature = "fastembed-embeddings"))]
    #[allow(clippy::unused_self)]
    fn load_in_process_model(&self, model_name: &str) -> bool {
        warn!(
            model = %model_name,
            "in-process backend requested but the fastembed-embeddings feature is disabled; \
             calls will use the random fallback"
        );
        false
    }

    /// Applies the asymmetric prompt prefix for the designated model family.
    fn apply_prompt(model_name: &str, text: &str, kind: PromptKind) -> String {
        if model_name.starts_with("nomic-ai/") {
            format!("{}: {text}", kind.as_str())
        } else {
            text.to_string()
        }
    }

    /// Runs the backend for a batch of (possibly prefixed) texts.
    async fn backend_embed(
        &self,
        state: &ModelState,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        match state.backend {
            BackendKind::InProcess => self.in_process_embed(texts).await,
            BackendKind::Local => {
                let backend = LocalHttpBackend::new(self.http.clone(), self.server_url.clone());
                backend.embed_many(&texts).await
            }
            BackendKind::Api => {
                let backend = RemoteApiBackend::new(
                    self.http.clone(),
                    state.model_name.clone(),
                    self.api_key.clone(),
                    self.server_url.clone(),
                );
                backend.embed_many(&texts).await
            }
            BackendKind::Random => Ok(texts
                .iter()
                .map(|text| random_embedding(text, state.dim))
                .collect()),
        }
    }

    #[cfg(feature = "fastembed-embeddings")]
    async fn in_process_embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = self
            .in_process
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or_else(|| EmbeddingError::Backend {
                backend: "in-process".to_string(),
                message: "model not loaded".to_string(),
            })?;

        tokio::task::spawn_blocking(move || model.embed(texts))
            .await
            .map_err(|e| EmbeddingError::Backend {
                backend: "in-process".to_string(),
                message: format!("join error: {e}"),
            })?
    }

    #[cfg(not(feature = "fastembed-embeddings"))]
    #[allow(clippy::unused_self, clippy::unused_async)]
    async fn in_process_embed(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Backend {
            backend: "in-process".to_string(),
            message: "fastembed-embeddings feature disabled".to_string(),
        })
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    async fn embed(&self, text: &str, kind: PromptKind) -> Vec<f32> {
        if let Ok(cache) = self.cache.lock()
            && let Some(vector) = cache.get(text)
        {
            return vector;
        }

        let state = self.snapshot();
        let prefixed = Self::apply_prompt(&state.model_name, text, kind);

        let vector = match self.backend_embed(&state, vec![prefixed]).await {
            Ok(mut vectors) if !vectors.is_empty() => vectors.remove(0),
            Ok(_) => {
                warn!(backend = %state.backend, "backend returned no vectors, using fallback");
                random_embedding(text, state.dim)
            }
            Err(e) => {
                error!(backend = %state.backend, error = %e, "embedding failed, using fallback");
                random_embedding(text, state.dim)
            }
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(text, vector.clone());
        }
        vector
    }

    async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut uncached_indices = Vec::new();

        if let Ok(cache) = self.cache.lock() {
            for (i, text) in texts.iter().enumerate() {
                if let Some(vector) = cache.get(text) {
                    results[i] = Some(vector);
                } else {
                    uncached_indices.push(i);
                }
            }
        } else {
            uncached_indices = (0..texts.len()).collect();
        }

        if !uncached_indices.is_empty() {
            let state = self.snapshot();
            let prefixed: Vec<String> = uncached_indices
                .iter()
                .map(|&i| Self::apply_prompt(&state.model_name, &texts[i], PromptKind::Passage))
                .collect();

            let vectors = match self.backend_embed(&state, prefixed).await {
                Ok(vectors) if vectors.len() == uncached_indices.len() => vectors,
                Ok(_) | Err(_) => {
                    warn!(backend = %state.backend, "batch embedding failed, using fallback");
                    uncached_indices
                        .iter()
                        .map(|&i| random_embedding(&texts[i], state.dim))
                        .collect()
                }
            };

            if let Ok(mut cache) = self.cache.lock() {
                for (&i, vector) in uncached_indices.iter().zip(vectors.into_iter()) {
                    cache.insert(&texts[i], vector.clone());
                    results[i] = Some(vector);
                }
                if uncached_indices.len() > BATCH_FLUSH_THRESHOLD {
                    cache.flush();
                }
            } else {
                for (&i, vector) in uncached_indices.iter().zip(vectors.into_iter()) {
                    results[i] = Some(vector);
                }
            }
        }

        let fallback_dim = self.snapshot().dim;
        results
            .into_iter()
            .enumerate()
            .map(|(i, slot)| slot.unwrap_or_else(|| random_embedding(&texts[i], fallback_dim)))
            .collect()
    }

    fn model_info(&self) -> ModelInfo {
        let state = self.snapshot();
        let cache_size = self.cache.lock().map_or(0, |cache| cache.len());
        ModelInfo {
            backend: state.backend.as_str().to_string(),
            model_name: state.model_name,
            dim: state.dim,
            device: state.device,
            cache_size,
        }
    }
}
