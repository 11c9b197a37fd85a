//! Content-addressable embedding cache.
//!
//! Maps SHA-256 hex digests of the exact input text to vectors. The cache
//! is lazily persisted: every [`SAVE_INTERVAL`] insertions the whole map is
//! rewritten atomically under a filename derived from the active model, so
//! switching models switches cache files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, error};

use crate::persist;

/// Persist the cache every this many insertions.
const SAVE_INTERVAL: usize = 100;

/// Returns the SHA-256 hex digest used as a cache key.
#[must_use]
pub fn content_key(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Returns the on-disk cache filename for a model name.
///
/// Path separators in model names (`org/model`) are flattened so the file
/// lands directly in the cache directory.
#[must_use]
pub fn cache_file_name(model_name: &str) -> String {
    let sanitised: String = model_name
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == ':' { '_' } else { c })
        .collect();
    format!("{sanitised}_cache.json")
}

/// In-memory cache with lazy disk persistence.
#[derive(Debug)]
pub struct EmbeddingCache {
    map: HashMap<String, Vec<f32>>,
    path: PathBuf,
    inserts_since_save: usize,
}

impl EmbeddingCache {
    /// Opens (or creates empty) the cache for `model_name` under `cache_dir`.
    #[must_use]
    pub fn open(cache_dir: &Path, model_name: &str) -> Self {
        let path = cache_dir.join(cache_file_name(model_name));
        let map: HashMap<String, Vec<f32>> = persist::load_json_or_default(&path);
        if !map.is_empty() {
            debug!(count = map.len(), path = %path.display(), "loaded embedding cache");
        }
        Self {
            map,
            path,
            inserts_since_save: 0,
        }
    }

    /// Looks up a vector by raw text.
    #[must_use]
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        self.map.get(&content_key(text)).cloned()
    }

    /// Inserts a vector, persisting to disk on every [`SAVE_INTERVAL`]th
    /// insertion. Persistence failures log and keep serving.
    pub fn insert(&mut self, text: &str, vector: Vec<f32>) {
        self.map.insert(content_key(text), vector);
        self.inserts_since_save += 1;
        if self.inserts_since_save >= SAVE_INTERVAL {
            self.flush();
        }
    }

    /// Writes the cache to disk immediately.
    pub fn flush(&mut self) {
        self.inserts_since_save = 0;
        if let Err(e) = persist::write_json_atomic(&self.path, &self.map) {
            error!(path = %self.path.display(), error = %e, "failed to persist embedding cache");
        }
    }

    /// Number of cached vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
