//! Error types for mnemo-rs.
//!
//! Each subsystem has its own `thiserror` enum; the top-level [`Error`]
//! composes them for callers that cross subsystem boundaries (CLI, server
//! bootstrap). Components never panic; everything propagates as `Result`.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type composing all subsystem errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading or validation failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Embedding subsystem error.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Memory tier error.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// Tool registry or execution error.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Transport layer error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Dreaming pipeline error.
    #[error(transparent)]
    Dream(#[from] DreamError),

    /// LLM client error.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Config file is not valid JSON.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Structural validation failed.
    #[error("invalid configuration:\n{}", .errors.join("\n"))]
    Validation {
        /// One message per failed check.
        errors: Vec<String>,
    },
}

/// Errors from the embedding service.
///
/// These are mostly internal; the service's public `embed` path never
/// surfaces them (it falls back to the deterministic random backend).
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// A backend call failed (network, model load, bad response shape).
    #[error("embedding backend '{backend}' failed: {message}")]
    Backend {
        /// Backend name.
        backend: String,
        /// What went wrong.
        message: String,
    },

    /// Cache persistence failed.
    #[error("embedding cache error: {message}")]
    Cache {
        /// What went wrong.
        message: String,
    },
}

/// Errors from the memory tiers and orchestrator.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// A persisted collection failed to write.
    #[error("failed to persist {path}: {message}")]
    Persist {
        /// Destination file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// A saved state snapshot failed to load.
    #[error("failed to load memory state from {path}: {message}")]
    StateLoad {
        /// Snapshot file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// A requested entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind (page, document, message).
        kind: &'static str,
        /// Entity ID.
        id: String,
    },
}

/// Errors from tool lookup and execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool name is not in the catalog.
    #[error("unknown tool: {name}")]
    Unknown {
        /// Requested tool name.
        name: String,
    },

    /// A required argument is missing or a value is out of range.
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments {
        /// Tool name.
        tool: String,
        /// What is wrong with the arguments.
        message: String,
        /// Concrete next step for the caller, when one is known.
        suggestion: Option<String>,
    },

    /// The tool handler itself failed.
    #[error("tool {tool} failed: {message}")]
    Execution {
        /// Tool name.
        tool: String,
        /// What went wrong.
        message: String,
    },
}

/// Errors from the JSON-RPC transports.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Binding the HTTP listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Reading or writing a framed message failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the dreaming consolidation pipeline.
///
/// Parse failures after the repair pass are fatal on purpose: the pipeline
/// refuses to archive artefacts it could not parse.
#[derive(Debug, Error)]
pub enum DreamError {
    /// The chunking LLM output could not be parsed, even after repair.
    #[error("chunker output unparseable after repair pass: {message}")]
    ChunkParse {
        /// Parser diagnostics.
        message: String,
    },

    /// The synthesis LLM output could not be parsed, even after repair.
    #[error("synthesis output unparseable after repair pass: {message}")]
    SynthesisParse {
        /// Parser diagnostics.
        message: String,
    },

    /// No archive exists for the conversation.
    #[error("no archive found for conversation: {conversation_id}")]
    ArchiveNotFound {
        /// Conversation identifier.
        conversation_id: String,
    },

    /// A quality upgrade was requested but the archive carries no source text.
    #[error("original conversation text not found in archive metadata for {conversation_id}")]
    MissingOriginalText {
        /// Conversation identifier.
        conversation_id: String,
    },

    /// Archive or manifest file I/O failed.
    #[error("dream storage error at {path}: {message}")]
    Storage {
        /// File involved.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// The underlying LLM call failed.
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Errors from the external LLM client.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The API request failed.
    #[error("LLM API request failed: {message}")]
    ApiRequest {
        /// Error detail from the SDK or transport.
        message: String,
        /// HTTP status, when one was received.
        status: Option<u16>,
    },

    /// No API key was configured.
    #[error("LLM API key not configured (set OPENAI_API_KEY or MNEMO_LLM_API_KEY)")]
    ApiKeyMissing,

    /// The model returned an empty response.
    #[error("LLM returned an empty response")]
    EmptyResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_display() {
        let err = ToolError::Unknown {
            name: "nope".to_string(),
        };
        assert_eq!(err.to_string(), "unknown tool: nope");
    }

    #[test]
    fn test_validation_error_joins_messages() {
        let err = ConfigError::Validation {
            errors: vec!["a".to_string(), "b".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains('a'));
        assert!(text.contains('b'));
    }

    #[test]
    fn test_top_level_from() {
        let err: Error = LlmError::ApiKeyMissing.into();
        assert!(matches!(err, Error::Llm(_)));
    }
}
