//! External LLM client.
//!
//! The dreaming pipeline talks to a single narrow contract:
//! `generate_response(query, context?) -> text`. The concrete
//! implementation speaks any OpenAI-compatible chat API; tests substitute
//! scripted clients.

pub mod openai;

use async_trait::async_trait;

use crate::error::LlmError;

pub use openai::{LlmConfig, OpenAiClient};

/// Text-generation contract used by the dreaming pipeline.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generates a response for `query`, optionally conditioned on a
    /// system `context`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on API failure or an empty completion.
    async fn generate_response(
        &self,
        query: &str,
        context: Option<&str>,
    ) -> Result<String, LlmError>;

    /// Model identifier, for artefact metadata.
    fn model_name(&self) -> String;
}
