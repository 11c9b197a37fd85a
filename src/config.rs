//! Configuration loading and validation.
//!
//! Settings come from a JSON config file, overridden by environment
//! variables, falling back to compiled-in defaults. Validation runs at load
//! time so a misconfigured backend fails fast instead of at first embed.
//!
//! Environment overrides: `MNEMO_DATA_DIR`, `MNEMO_EMBEDDING_BACKEND`,
//! `MNEMO_EMBEDDING_MODEL`, `MNEMO_EMBEDDING_API_KEY`, `MNEMO_DEVICE`,
//! `MCP_REQUIRE_AUTH`, `MCP_API_KEY`, `GOOGLE_API_KEY`,
//! `GOOGLE_SEARCH_ENGINE_ID`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default working-memory soft token cap.
const DEFAULT_WORKING_MAX_TOKENS: usize = 4000;
/// Default active-memory page cap.
const DEFAULT_ACTIVE_MAX_PAGES: usize = 20;
/// Default archival promotion threshold (the orchestrator field; the
/// retrieval loop applies its own stricter eager-promotion score).
const DEFAULT_PROMOTION_THRESHOLD: f32 = 0.6;
/// Default embedding dimension for back-ends that cannot report one.
const DEFAULT_EMBEDDING_DIM: usize = 768;
/// Default local embedding server URL.
const DEFAULT_LOCAL_SERVER_URL: &str = "http://localhost:8080/embed";
/// Default HTTP bind address.
const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
/// Default HTTP port.
const DEFAULT_HTTP_PORT: u16 = 8000;

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// In-process sentence-transformer model (feature-gated).
    InProcess,
    /// Local HTTP embedding server.
    Local,
    /// Remote provider API (OpenAI / Cohere / generic).
    Api,
    /// Deterministic pseudo-random fallback.
    Random,
}

impl BackendKind {
    /// Returns the canonical string name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProcess => "in-process",
            Self::Local => "local",
            Self::Api => "api",
            Self::Random => "random",
        }
    }

    /// Parses a backend name (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "in-process" | "inprocess" | "huggingface" => Some(Self::InProcess),
            "local" => Some(Self::Local),
            "api" => Some(Self::Api),
            "random" => Some(Self::Random),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embedding backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Which backend to use.
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    /// Model identifier (HuggingFace repo, provider model name).
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Expected vector dimension. Back-ends that report their own dimension
    /// override this at load time.
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    /// URL for the local embedding server (or generic API endpoint).
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Bearer token for remote API back-ends.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Device hint for the in-process backend ("cpu", "cuda").
    #[serde(default)]
    pub device: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model_name: default_model_name(),
            embedding_dim: default_embedding_dim(),
            server_url: default_server_url(),
            api_key: None,
            device: None,
        }
    }
}

/// Memory tier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Working-memory soft token cap.
    #[serde(default = "default_working_max_tokens")]
    pub working_memory_max_tokens: usize,
    /// Active-memory page cap.
    #[serde(default = "default_active_max_pages")]
    pub active_memory_max_pages: usize,
    /// Archival promotion threshold (score gate for promotion into active).
    #[serde(default = "default_promotion_threshold")]
    pub promotion_threshold: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            working_memory_max_tokens: default_working_max_tokens(),
            active_memory_max_pages: default_active_max_pages(),
            promotion_threshold: default_promotion_threshold(),
        }
    }
}

/// One entry in the multi-model priority list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityModel {
    /// Model key, `"<model_name>:<dim>"`.
    pub key: String,
    /// Model identifier to load for this key.
    pub model_name: String,
    /// Vector dimension for this key.
    pub dim: usize,
}

/// Multi-model embedding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiModelConfig {
    /// Whether multi-model mode starts enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Priority-ordered model keys used for query embedding and search.
    #[serde(default = "default_priority_models")]
    pub priority_models: Vec<PriorityModel>,
}

impl Default for MultiModelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            priority_models: default_priority_models(),
        }
    }
}

/// MCP server policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Whether HTTP requests must carry an API key.
    #[serde(default = "default_require_auth")]
    pub require_auth: bool,
    /// The accepted API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// HTTP bind host.
    #[serde(default = "default_http_host")]
    pub host: String,
    /// HTTP bind port.
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: default_require_auth(),
            api_key: None,
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

/// Web-search (Google Custom Search) credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSearchConfig {
    /// Google API key.
    #[serde(default)]
    pub google_api_key: Option<String>,
    /// Google Custom Search engine ID.
    #[serde(default)]
    pub search_engine_id: Option<String>,
}

/// Dreaming pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DreamingConfig {
    /// Target quality level (`basic`, `good`, `premium`).
    #[serde(default = "default_quality")]
    pub quality_level: String,
}

impl Default for DreamingConfig {
    fn default() -> Self {
        Self {
            quality_level: default_quality(),
        }
    }
}

/// Full server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory holding all persisted state.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Embedding backend settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Memory tier settings.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Multi-model settings.
    #[serde(default)]
    pub multi_model: MultiModelConfig,
    /// MCP server policy.
    #[serde(default)]
    pub server: ServerConfig,
    /// Web search credentials.
    #[serde(default)]
    pub web_search: WebSearchConfig,
    /// Dreaming pipeline settings.
    #[serde(default)]
    pub dreaming: DreamingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            embedding: EmbeddingConfig::default(),
            memory: MemoryConfig::default(),
            multi_model: MultiModelConfig::default(),
            server: ServerConfig::default(),
            web_search: WebSearchConfig::default(),
            dreaming: DreamingConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from an optional JSON file, applies environment
    /// overrides, and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or
    /// parsed, or if validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let bytes = std::fs::read(p).map_err(|source| ConfigError::Read {
                    path: p.to_path_buf(),
                    source,
                })?;
                serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
                    path: p.to_path_buf(),
                    source,
                })?
            }
            _ => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Applies environment-variable overrides onto the loaded values.
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("MNEMO_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(backend) = std::env::var("MNEMO_EMBEDDING_BACKEND")
            && let Some(kind) = BackendKind::parse(&backend)
        {
            self.embedding.backend = kind;
        }
        if let Ok(model) = std::env::var("MNEMO_EMBEDDING_MODEL") {
            self.embedding.model_name = model;
        }
        if let Ok(key) = std::env::var("MNEMO_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(key);
        }
        if let Ok(device) = std::env::var("MNEMO_DEVICE") {
            self.embedding.device = Some(device);
        }
        if let Ok(required) = std::env::var("MCP_REQUIRE_AUTH") {
            self.server.require_auth = required.to_lowercase() == "true";
        }
        if let Ok(key) = std::env::var("MCP_API_KEY") {
            self.server.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            self.web_search.google_api_key = Some(key);
        }
        if let Ok(id) = std::env::var("GOOGLE_SEARCH_ENGINE_ID") {
            self.web_search.search_engine_id = Some(id);
        }
    }

    /// Validates required fields per backend and numeric ranges.
    fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        match self.embedding.backend {
            BackendKind::InProcess | BackendKind::Api => {
                if self.embedding.model_name.trim().is_empty() {
                    errors.push(format!(
                        "embedding.model_name is required for the {} backend",
                        self.embedding.backend
                    ));
                }
                if self.embedding.backend == BackendKind::Api
                    && self.embedding.api_key.as_deref().is_none_or(str::is_empty)
                {
                    errors.push("embedding.api_key is required for the api backend".to_string());
                }
            }
            BackendKind::Local => {
                if self.embedding.server_url.trim().is_empty() {
                    errors.push("embedding.server_url is required for the local backend".to_string());
                }
            }
            BackendKind::Random => {
                if self.embedding.embedding_dim == 0 {
                    errors.push(
                        "embedding.embedding_dim must be positive for the random backend"
                            .to_string(),
                    );
                }
            }
        }

        if self.memory.working_memory_max_tokens == 0 {
            errors.push("memory.working_memory_max_tokens must be positive".to_string());
        }
        if self.memory.active_memory_max_pages == 0 {
            errors.push("memory.active_memory_max_pages must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.memory.promotion_threshold) {
            errors.push("memory.promotion_threshold must be within [0.0, 1.0]".to_string());
        }
        for model in &self.multi_model.priority_models {
            if model.dim == 0 {
                errors.push(format!(
                    "multi_model priority model '{}' has zero dimension",
                    model.key
                ));
            }
            if !model.key.ends_with(&format!(":{}", model.dim)) {
                errors.push(format!(
                    "multi_model priority model key '{}' does not end with \":{}\"",
                    model.key, model.dim
                ));
            }
        }
        if !matches!(self.dreaming.quality_level.as_str(), "basic" | "good" | "premium") {
            errors.push(format!(
                "dreaming.quality_level must be basic|good|premium, got '{}'",
                self.dreaming.quality_level
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation { errors })
        }
    }
}

fn default_backend() -> BackendKind {
    BackendKind::Random
}

fn default_model_name() -> String {
    "BAAI/bge-m3".to_string()
}

const fn default_embedding_dim() -> usize {
    DEFAULT_EMBEDDING_DIM
}

fn default_server_url() -> String {
    DEFAULT_LOCAL_SERVER_URL.to_string()
}

const fn default_working_max_tokens() -> usize {
    DEFAULT_WORKING_MAX_TOKENS
}

const fn default_active_max_pages() -> usize {
    DEFAULT_ACTIVE_MAX_PAGES
}

const fn default_promotion_threshold() -> f32 {
    DEFAULT_PROMOTION_THRESHOLD
}

const fn default_require_auth() -> bool {
    true
}

fn default_http_host() -> String {
    DEFAULT_HTTP_HOST.to_string()
}

const fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

fn default_quality() -> String {
    "basic".to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir().map_or_else(|| PathBuf::from(".memory"), |home| home.join(".memory"))
}

fn default_priority_models() -> Vec<PriorityModel> {
    vec![
        PriorityModel {
            key: "bge-m3:1024".to_string(),
            model_name: "BAAI/bge-m3".to_string(),
            dim: 1024,
        },
        PriorityModel {
            key: "gemma:768".to_string(),
            model_name: "google/embeddinggemma-300m".to_string(),
            dim: 768,
        },
        PriorityModel {
            key: "gemma:256".to_string(),
            model_name: "google/embeddinggemma-300m".to_string(),
            dim: 256,
        },
    ]
}
